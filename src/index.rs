use eyre::{Context, Result};
use rusqlite::{Connection, OpenFlags, backup::Backup, params};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::RestoreError;
use crate::inventory::{
    Extract, SESSION_ID_RULES, SessionFormat, TITLE_RULES, as_integer, first_field,
    read_session_object, session_files,
};
use crate::scanner::{CHAT_SESSIONS_DIR, STATE_DB};
use crate::utils::{file_mtime_ms, now_stamp};

/// VS Code lists only the sessions present under this key.
pub const CHAT_INDEX_KEY: &str = "chat.ChatSessionStore.index";
pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub session_id: String,
    pub title: String,
    pub last_message_date: i64,
    pub is_empty: bool,
    pub is_external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSessionIndex {
    pub version: u32,
    pub entries: BTreeMap<String, IndexEntry>,
}

const LAST_MESSAGE_RULES: &[(&str, Extract<i64>)] = &[
    ("lastMessageDate", as_integer),
    ("requests", latest_request_timestamp),
];

fn latest_request_timestamp(v: &Value) -> Option<i64> {
    v.as_array()?
        .iter()
        .filter_map(|r| r.get("timestamp").and_then(as_integer))
        .max()
}

fn json_entry(path: &Path, obj: Option<&Map<String, Value>>, fallback_id: String) -> IndexEntry {
    let mtime = file_mtime_ms(path);
    let Some(obj) = obj else {
        return IndexEntry {
            session_id: fallback_id,
            title: DEFAULT_TITLE.to_string(),
            last_message_date: mtime,
            is_empty: false,
            is_external: false,
        };
    };
    IndexEntry {
        session_id: first_field(obj, SESSION_ID_RULES).unwrap_or(fallback_id),
        title: first_field(obj, TITLE_RULES).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        last_message_date: first_field(obj, LAST_MESSAGE_RULES).unwrap_or(mtime),
        is_empty: obj
            .get("requests")
            .and_then(Value::as_array)
            .is_some_and(|r| r.is_empty()),
        is_external: false,
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Index entries for every session file in `chat_dir`.
/// `.json` files are indexed first; a `.jsonl` only fills an id still unclaimed.
pub fn build_index(chat_dir: &Path) -> ChatSessionIndex {
    let mut files = session_files(chat_dir);
    files.sort();
    let (json, jsonl): (Vec<PathBuf>, Vec<PathBuf>) = files
        .into_iter()
        .partition(|p| SessionFormat::from_path(p) == Some(SessionFormat::Json));

    let mut entries = BTreeMap::new();
    for p in &json {
        let obj = read_session_object(p);
        let entry = json_entry(p, obj.as_ref(), stem(p));
        entries.insert(entry.session_id.clone(), entry);
    }
    for p in &jsonl {
        let id = stem(p);
        entries.entry(id.clone()).or_insert_with(|| IndexEntry {
            session_id: id,
            title: DEFAULT_TITLE.to_string(),
            last_message_date: file_mtime_ms(p),
            is_empty: false,
            is_external: false,
        });
    }

    ChatSessionIndex {
        version: 1,
        entries,
    }
}

/// Copy `state.vscdb` to `state.vscdb.bak-<stamp>` with SQLite's online backup.
pub fn backup_state_db(db_path: &Path) -> Result<PathBuf> {
    let mut name = db_path.as_os_str().to_owned();
    name.push(format!(".bak-{}", now_stamp()));
    let dest = PathBuf::from(name);

    let src = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open source database: {}", db_path.display()))?;
    let mut dst = Connection::open(&dest)
        .wrap_err_with(|| format!("Failed to create backup database: {}", dest.display()))?;
    {
        let backup = Backup::new(&src, &mut dst).wrap_err("Failed to initialize backup")?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .wrap_err("Backup did not complete successfully")?;
    }
    Ok(dest)
}

/// Upsert the index value into `ItemTable`, creating the table if needed.
pub fn write_index(db_path: &Path, index: &ChatSessionIndex) -> Result<()> {
    let value = serde_json::to_string(index).wrap_err("Failed to serialize index")?;
    let conn = Connection::open(db_path)
        .wrap_err_with(|| format!("Failed to open database: {}", db_path.display()))?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ItemTable (key TEXT PRIMARY KEY, value TEXT)",
        [],
    )
    .wrap_err("Failed to create ItemTable")?;
    conn.execute(
        "INSERT INTO ItemTable(key, value) VALUES(?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![CHAT_INDEX_KEY, value],
    )
    .wrap_err_with(|| format!("Failed to write {CHAT_INDEX_KEY}"))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ReindexReport {
    pub db_backup: PathBuf,
    pub entries: usize,
}

/// Back up, rebuild, and write the index for `<storage>/<hash>`.
pub fn reindex_state_db(hash_dir: &Path) -> Result<ReindexReport> {
    let db_path = hash_dir.join(STATE_DB);
    let chat_dir = hash_dir.join(CHAT_SESSIONS_DIR);
    if !db_path.is_file() {
        return Err(RestoreError::MissingStateDb(db_path).into());
    }
    if !chat_dir.is_dir() {
        return Err(RestoreError::MissingChatSessions(chat_dir).into());
    }

    let db_backup = backup_state_db(&db_path)?;
    info!("state db backed up to {}", db_backup.display());

    let index = build_index(&chat_dir);
    write_index(&db_path, &index)?;
    Ok(ReindexReport {
        db_backup,
        entries: index.entries.len(),
    })
}
