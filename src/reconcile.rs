use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::inventory::{chat_dir, read_session_artifact, session_files, SessionArtifact};

/// Session id -> last update, for the sessions already in the destination.
pub type TargetMap = HashMap<String, DateTime<Local>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyDecision {
    MissingInTarget,
    NewerInSource,
    AlreadyInTarget,
}

impl CopyDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            CopyDecision::MissingInTarget => "MissingInTarget",
            CopyDecision::NewerInSource => "NewerInSource",
            CopyDecision::AlreadyInTarget => "AlreadyInTarget",
        }
    }

    /// Whether the row starts out selected for copying.
    pub fn selected_by_default(self) -> bool {
        !matches!(self, CopyDecision::AlreadyInTarget)
    }

    pub fn description(self) -> &'static str {
        match self {
            CopyDecision::MissingInTarget => "not in the destination (should be copied)",
            CopyDecision::NewerInSource => "in the destination, but the source is newer (should be copied)",
            CopyDecision::AlreadyInTarget => "in the destination and not older (nothing to do)",
        }
    }
}

impl fmt::Display for CopyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Sessions currently in the destination, keyed the same way as the inventory.
pub fn target_session_map(storage_root: &Path, target_hash: &str) -> TargetMap {
    session_files(&chat_dir(storage_root, target_hash))
        .into_iter()
        .filter_map(|p| read_session_artifact(target_hash, &p))
        .map(|item| (item.session_id, item.updated))
        .collect()
}

pub fn classify(item: &SessionArtifact, target: &TargetMap) -> CopyDecision {
    match target.get(&item.session_id) {
        None => CopyDecision::MissingInTarget,
        Some(existing) if item.updated > *existing => CopyDecision::NewerInSource,
        Some(_) => CopyDecision::AlreadyInTarget,
    }
}

/// A numbered inventory line as shown to the operator (numbers are 1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub number: usize,
    pub item: SessionArtifact,
    pub decision: CopyDecision,
}

pub fn reconcile(inventory: Vec<SessionArtifact>, target: &TargetMap) -> Vec<SessionRow> {
    inventory
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let decision = classify(&item, target);
            SessionRow {
                number: i + 1,
                item,
                decision,
            }
        })
        .collect()
}

/// Row numbers that start out selected.
pub fn default_selection(rows: &[SessionRow]) -> Vec<usize> {
    rows.iter()
        .filter(|r| r.decision.selected_by_default())
        .map(|r| r.number)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{session_inventory, SessionFormat};
    use crate::utils::local_from_millis;
    use filetime::FileTime;
    use std::fs;
    use std::path::PathBuf;

    const T0: i64 = 1_700_000_000_000;

    fn artifact(id: &str, updated_ms: i64) -> SessionArtifact {
        let t = local_from_millis(updated_ms).unwrap();
        SessionArtifact {
            hash: "src".into(),
            session_id: id.into(),
            title: String::new(),
            created: t,
            updated: t,
            format: SessionFormat::Json,
            path: PathBuf::from(format!("{id}.json")),
        }
    }

    fn target(entries: &[(&str, i64)]) -> TargetMap {
        entries
            .iter()
            .map(|(id, ms)| (id.to_string(), local_from_millis(*ms).unwrap()))
            .collect()
    }

    #[test]
    fn test_newer_in_source() {
        let map = target(&[("abc", T0)]);
        assert_eq!(classify(&artifact("abc", T0 + 1000), &map), CopyDecision::NewerInSource);
    }

    #[test]
    fn test_missing_in_target() {
        assert_eq!(
            classify(&artifact("xyz", T0), &TargetMap::new()),
            CopyDecision::MissingInTarget
        );
    }

    #[test]
    fn test_equal_or_older_is_already_in_target() {
        let map = target(&[("abc", T0)]);
        assert_eq!(classify(&artifact("abc", T0), &map), CopyDecision::AlreadyInTarget);
        assert_eq!(classify(&artifact("abc", T0 - 1), &map), CopyDecision::AlreadyInTarget);
    }

    #[test]
    fn test_default_selection_excludes_already_in_target() {
        let map = target(&[("same", T0), ("stale", T0)]);
        let rows = reconcile(
            vec![artifact("new", T0), artifact("same", T0), artifact("stale", T0 + 5)],
            &map,
        );
        assert_eq!(rows.iter().map(|r| r.number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(default_selection(&rows), vec![1, 3]);
    }

    #[test]
    fn test_target_map_uses_embedded_ids_and_reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let put = |hash: &str, name: &str, body: &str, secs: i64| {
            let d = chat_dir(root, hash);
            fs::create_dir_all(&d).unwrap();
            let p = d.join(name);
            fs::write(&p, body).unwrap();
            filetime::set_file_mtime(&p, FileTime::from_unix_time(secs, 0)).unwrap();
        };
        put("dst", "renamed.json", r#"{"sessionId": "abc"}"#, 1_700_000_000);
        put("dst", "log.jsonl", "", 1_700_000_000);
        put("src", "abc.json", r#"{"sessionId": "abc"}"#, 1_700_000_001);
        put("src", "log.jsonl", "", 1_600_000_000);
        put("src", "fresh.json", "{}", 1_650_000_000);

        let map = target_session_map(root, "dst");
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("abc"));
        assert!(map.contains_key("log"));

        let run = || {
            let inv = session_inventory(root, &["src".to_string()]);
            reconcile(inv, &target_session_map(root, "dst"))
                .into_iter()
                .map(|r| (r.item.session_id, r.decision))
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(
            first,
            vec![
                ("abc".to_string(), CopyDecision::NewerInSource),
                ("fresh".to_string(), CopyDecision::MissingInTarget),
                ("log".to_string(), CopyDecision::AlreadyInTarget),
            ]
        );
        assert_eq!(run(), first);
    }
}
