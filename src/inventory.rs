use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::scanner::CHAT_SESSIONS_DIR;
use crate::utils::{local_from_millis, stat_created_updated};

/// Below this a `creationDate` is taken to be in seconds.
pub const SECONDS_THRESHOLD: i64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionFormat {
    Json,
    Jsonl,
}

impl SessionFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(SessionFormat::Json),
            "jsonl" => Some(SessionFormat::Jsonl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionFormat::Json => "json",
            SessionFormat::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionArtifact {
    pub hash: String,
    pub session_id: String,
    pub title: String,
    pub created: DateTime<Local>,
    pub updated: DateTime<Local>,
    pub format: SessionFormat,
    pub path: PathBuf,
}

// Field rules: tried in order, first successful extraction wins.
// Adjusting to a new session format is a table edit.

pub type Extract<T> = fn(&Value) -> Option<T>;

pub const SESSION_ID_RULES: &[(&str, Extract<String>)] = &[("sessionId", non_empty_string)];

pub const TITLE_RULES: &[(&str, Extract<String>)] = &[
    ("customTitle", trimmed_string),
    ("title", trimmed_string),
    ("computedTitle", trimmed_string),
];

pub const CREATED_RULES: &[(&str, Extract<DateTime<Local>>)] = &[("creationDate", epoch_timestamp)];

pub fn first_field<T>(obj: &Map<String, Value>, rules: &[(&str, Extract<T>)]) -> Option<T> {
    rules
        .iter()
        .find_map(|(key, extract)| obj.get(*key).and_then(extract))
}

fn non_empty_string(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn trimmed_string(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integral part of a JSON number, floats truncated.
pub fn as_integer(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

/// Seconds are scaled to milliseconds; millisecond values pass through.
pub fn normalize_epoch_millis(raw: i64) -> i64 {
    if raw < SECONDS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

fn epoch_timestamp(v: &Value) -> Option<DateTime<Local>> {
    let raw = as_integer(v).filter(|&n| n != 0)?;
    local_from_millis(normalize_epoch_millis(raw))
}

/// Whatever a `.json` session told us about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub created: Option<DateTime<Local>>,
}

/// Parse a session document as an object, or `None` for anything else.
pub fn read_session_object(path: &Path) -> Option<Map<String, Value>> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(obj)) => Some(obj),
        Ok(_) => None,
        Err(e) => {
            debug!("{}: not parseable ({})", path.display(), e);
            None
        }
    }
}

pub fn parse_session_meta(path: &Path) -> SessionMeta {
    let Some(obj) = read_session_object(path) else {
        return SessionMeta::default();
    };
    SessionMeta {
        session_id: first_field(&obj, SESSION_ID_RULES),
        title: first_field(&obj, TITLE_RULES),
        created: first_field(&obj, CREATED_RULES),
    }
}

/// Describe one session file, or `None` if it is not a session or cannot be stat'ed.
pub fn read_session_artifact(hash: &str, path: &Path) -> Option<SessionArtifact> {
    let format = SessionFormat::from_path(path)?;
    let (mut created, updated) = match stat_created_updated(path) {
        Ok(t) => t,
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };
    let mut session_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut title = String::new();

    if format == SessionFormat::Json {
        let meta = parse_session_meta(path);
        if let Some(id) = meta.session_id {
            session_id = id;
        }
        if let Some(t) = meta.title {
            title = t;
        }
        if let Some(c) = meta.created {
            created = c;
        }
    }

    Some(SessionArtifact {
        hash: hash.to_string(),
        session_id,
        title,
        created,
        updated,
        format,
        path: path.to_path_buf(),
    })
}

/// Session files directly inside `dir`; empty when the folder is missing.
pub fn session_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| SessionFormat::from_path(p).is_some())
        .collect()
}

pub fn chat_dir(storage_root: &Path, hash: &str) -> PathBuf {
    storage_root.join(hash).join(CHAT_SESSIONS_DIR)
}

/// All sessions of the given hashes, most recently updated first.
pub fn session_inventory(storage_root: &Path, hashes: &[String]) -> Vec<SessionArtifact> {
    let mut items: Vec<SessionArtifact> = hashes
        .iter()
        .flat_map(|h| {
            session_files(&chat_dir(storage_root, h))
                .into_iter()
                .filter_map(move |p| read_session_artifact(h, &p))
        })
        .collect();
    items.sort_by(|a, b| b.updated.cmp(&a.updated));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;

    fn write_session(root: &Path, hash: &str, name: &str, body: &str, mtime: i64) -> PathBuf {
        let dir = chat_dir(root, hash);
        fs::create_dir_all(&dir).unwrap();
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        filetime::set_file_mtime(&p, FileTime::from_unix_time(mtime, 0)).unwrap();
        p
    }

    #[test]
    fn test_normalize_epoch_millis() {
        assert_eq!(normalize_epoch_millis(1_700_000_000), 1_700_000_000_000);
        assert_eq!(normalize_epoch_millis(1_700_000_000_000), 1_700_000_000_000);
    }

    #[test]
    fn test_json_session_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_session(
            dir.path(),
            "h1",
            "file-stem.json",
            r#"{"sessionId": "abc", "title": "  ", "computedTitle": " Fix the build ", "creationDate": 1700000000}"#,
            1_710_000_000,
        );

        let item = read_session_artifact("h1", &p).unwrap();
        assert_eq!(item.session_id, "abc");
        assert_eq!(item.title, "Fix the build");
        assert_eq!(item.created.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(item.updated.timestamp(), 1_710_000_000);
        assert_eq!(item.format, SessionFormat::Json);
    }

    #[test]
    fn test_title_priority_and_millisecond_dates() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_session(
            dir.path(),
            "h1",
            "s.json",
            r#"{"computedTitle": "c", "title": "t", "customTitle": "mine", "creationDate": 1700000000123.0}"#,
            1_710_000_000,
        );
        let meta = parse_session_meta(&p);
        assert_eq!(meta.title.as_deref(), Some("mine"));
        assert_eq!(meta.created.unwrap().timestamp_millis(), 1_700_000_000_123);
        assert_eq!(meta.session_id, None);
    }

    #[test]
    fn test_bad_json_and_wrong_types_keep_filesystem_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write_session(dir.path(), "h", "broken.json", "{ nope", 1_700_000_000);
        let typed = write_session(
            dir.path(),
            "h",
            "typed.json",
            r#"{"sessionId": 42, "title": ["x"], "creationDate": "yesterday"}"#,
            1_700_000_000,
        );
        let empty_id = write_session(dir.path(), "h", "empty.json", r#"{"sessionId": ""}"#, 1_700_000_000);

        for (p, stem) in [(broken, "broken"), (typed, "typed"), (empty_id, "empty")] {
            let item = read_session_artifact("h", &p).unwrap();
            assert_eq!(item.session_id, stem);
            assert_eq!(item.title, "");
        }
    }

    #[test]
    fn test_jsonl_is_not_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_session(
            dir.path(),
            "h",
            "log-id.JSONL",
            r#"{"sessionId": "inside"}"#,
            1_700_000_000,
        );
        let item = read_session_artifact("h", &p).unwrap();
        assert_eq!(item.session_id, "log-id");
        assert_eq!(item.format, SessionFormat::Jsonl);
    }

    #[test]
    fn test_inventory_spans_hashes_sorted_by_updated_desc() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "a", "old.json", "{}", 1_600_000_000);
        write_session(dir.path(), "b", "newest.jsonl", "", 1_800_000_000);
        write_session(dir.path(), "a", "mid.json", "{}", 1_700_000_000);
        write_session(dir.path(), "a", "notes.txt", "", 1_900_000_000);

        let inv = session_inventory(
            dir.path(),
            &["a".to_string(), "b".to_string(), "missing".to_string()],
        );
        let ids: Vec<&str> = inv.iter().map(|i| i.session_id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "mid", "old"]);
        assert_eq!(inv[0].hash, "b");
    }
}
