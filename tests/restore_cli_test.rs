use filetime::FileTime;
use predicates::prelude::*;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

struct Fixture {
    _tmp: TempDir,
    base: PathBuf,
    storage: PathBuf,
    project: PathBuf,
}

fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).expect("set mtime");
}

fn make_hash(storage: &Path, hash: &str, descriptor: &str, db_secs: i64) -> PathBuf {
    let dir = storage.join(hash);
    fs::create_dir_all(dir.join("chatSessions")).expect("mkdir chatSessions");
    fs::write(dir.join("workspace.json"), descriptor).expect("write workspace.json");
    let db = dir.join("state.vscdb");
    Connection::open(&db)
        .expect("open db")
        .execute_batch("CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);")
        .expect("create table");
    set_mtime(&db, db_secs);
    dir
}

fn write_session(hash_dir: &Path, name: &str, body: &str, secs: i64) {
    let p = hash_dir.join("chatSessions").join(name);
    fs::write(&p, body).expect("write session");
    set_mtime(&p, secs);
}

/// Old single-folder hash with two sessions, new multi-root hash that already
/// has a stale copy of one of them.
fn fixture() -> Fixture {
    let tmp = tempdir().expect("tempdir");
    let base = tmp.path().canonicalize().expect("canonicalize");
    let storage = base.join("workspaceStorage");
    let project = base.join("my app (v2)");
    fs::create_dir_all(&project).expect("mkdir project");
    // Spelled the way VS Code writes it.
    let uri = format!("file://{}/my%20app%20%28v2%29", base.display());

    let old = make_hash(&storage, "1111aaaa", &format!(r#"{{"folder": "{uri}"}}"#), 1_600_000_000);
    write_session(
        &old,
        "alpha.json",
        r#"{"sessionId": "alpha", "customTitle": "Refactor parser", "requests": [{"message": {"text": "hi"}}]}"#,
        1_650_000_000,
    );
    write_session(&old, "beta.json", r#"{"sessionId": "beta", "requests": []}"#, 1_660_000_000);

    let new = make_hash(
        &storage,
        "2222bbbb",
        &format!(r#"{{"workspace": "file://{}/my-app.code-workspace", "folders": ["{uri}"]}}"#, base.display()),
        1_700_000_000,
    );
    write_session(&new, "beta.json", r#"{"sessionId": "beta", "requests": []}"#, 1_600_000_000);

    make_hash(&storage, "3333cccc", r#"{"folder": "file:///somewhere/else"}"#, 1_800_000_000);

    Fixture {
        _tmp: tmp,
        base,
        storage,
        project,
    }
}

fn cmd(fx: &Fixture) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chat-session-restore");
    cmd.current_dir(&fx.base)
        .env("XDG_CONFIG_HOME", fx.base.join("config"))
        .env_remove("RUST_LOG")
        .arg("--storage-root")
        .arg(&fx.storage)
        .arg("--yes")
        .arg("--quiet");
    cmd
}

#[test]
fn dry_run_lists_decisions_and_writes_nothing() {
    let fx = fixture();

    cmd(&fx)
        .arg(&fx.project)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Destination: 2222bbbb"))
        .stdout(predicate::str::contains("MissingInTarget"))
        .stdout(predicate::str::contains("NewerInSource"))
        .stdout(predicate::str::contains("Refactor parser"))
        .stdout(predicate::str::contains("Would copy 2 sessions"))
        .stdout(predicate::str::contains("3333cccc").not());

    assert!(!fx.storage.join("2222bbbb/chatSessions/alpha.json").exists());
    assert!(!fx.base.join("backups").exists());
}

#[test]
fn restore_copies_backs_up_and_reindexes() {
    let fx = fixture();

    cmd(&fx)
        .arg("--workspace")
        .arg(format!("\"{}\"", fx.project.display()))
        .arg("--reindex")
        .arg("--export-md")
        .arg("--export-dir")
        .arg(fx.base.join("exports"))
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: reindex wrote chat.ChatSessionStore.index (2 entries)"));

    let target = fx.storage.join("2222bbbb/chatSessions");
    assert!(target.join("alpha.json").is_file());
    let beta = fs::read_to_string(target.join("beta.json")).expect("read beta");
    assert!(beta.contains("beta"));

    let backups: Vec<String> = fs::read_dir(fx.base.join("backups"))
        .expect("backups dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(backups.len(), 2);
    assert!(backups.iter().any(|b| b.starts_with("workspaceStorage_2222bbbb_")));
    assert!(backups.iter().any(|b| b.starts_with("workspaceStorage_1111aaaa_")));

    assert!(fx.base.join("exports/alpha.recovered.md").is_file());

    let conn = Connection::open(fx.storage.join("2222bbbb/state.vscdb")).expect("open db");
    let value: String = conn
        .query_row(
            "SELECT value FROM ItemTable WHERE key = 'chat.ChatSessionStore.index'",
            [],
            |r| r.get(0),
        )
        .expect("index row");
    let index: serde_json::Value = serde_json::from_str(&value).expect("index json");
    assert_eq!(index["version"], 1);
    assert_eq!(index["entries"]["alpha"]["title"], "Refactor parser");
    assert_eq!(index["entries"]["beta"]["isEmpty"], true);
}

#[test]
fn second_run_has_nothing_left_to_copy() {
    let fx = fixture();

    cmd(&fx).arg(&fx.project).arg("--skip-backup").assert().success();

    cmd(&fx)
        .arg(&fx.project)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("AlreadyInTarget"))
        .stdout(predicate::str::contains("Nothing to copy"));
}

#[test]
fn explicit_target_overrides_ranking() {
    let fx = fixture();

    cmd(&fx)
        .arg(&fx.project)
        .args(["--target", "1111aaaa", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Destination: 1111aaaa"))
        .stdout(predicate::str::contains("AlreadyInTarget"))
        .stdout(predicate::str::contains("Nothing to copy"));
}

#[test]
fn needle_keyword_finds_unrelated_path() {
    let fx = fixture();

    cmd(&fx)
        .arg(fx.base.join("renamed-away"))
        .args(["--needle", "somewhere/else", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Destination: 3333cccc"));
}

#[test]
fn no_matching_hash_exits_with_2() {
    let fx = fixture();

    cmd(&fx)
        .arg(fx.base.join("does-not-exist"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No related hashes found"));
}

#[test]
fn missing_storage_root_exits_with_2() {
    let fx = fixture();

    assert_cmd::cargo::cargo_bin_cmd!("chat-session-restore")
        .current_dir(&fx.base)
        .env("XDG_CONFIG_HOME", fx.base.join("config"))
        .args(["--yes", "--storage-root"])
        .arg(fx.base.join("nope"))
        .arg(&fx.project)
        .assert()
        .code(2);
}

#[test]
fn config_file_supplies_storage_root() {
    let fx = fixture();
    let cfg = fx.base.join("restore.toml");
    fs::write(
        &cfg,
        format!("storage_root = {:?}\nskip_backup = true\n", fx.storage.display().to_string()),
    )
    .expect("write config");

    assert_cmd::cargo::cargo_bin_cmd!("chat-session-restore")
        .current_dir(&fx.base)
        .env("XDG_CONFIG_HOME", fx.base.join("config"))
        .arg("--config")
        .arg(&cfg)
        .args(["--yes", "--quiet"])
        .arg(&fx.project)
        .assert()
        .success();

    assert!(fx.storage.join("2222bbbb/chatSessions/alpha.json").is_file());
    assert!(!fx.base.join("backups").exists());
}
