use chrono::{DateTime, Local};
use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::RestoreError;
use crate::utils::{local_from_system, read_text_best_effort};

pub const WORKSPACE_JSON: &str = "workspace.json";
pub const STATE_DB: &str = "state.vscdb";
pub const CHAT_SESSIONS_DIR: &str = "chatSessions";

/// One `workspaceStorage/<hash>` directory whose descriptor matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashInfo {
    pub hash: String,
    pub path: PathBuf,
    pub workspace_json: PathBuf,
    pub state_db: PathBuf,
    /// `None` when `state.vscdb` is absent.
    pub state_db_mtime: Option<DateTime<Local>>,
    pub chat_dir: PathBuf,
    /// Files directly inside `chatSessions`, 0 when missing or unreadable.
    pub chat_files: usize,
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|d| {
            d.flatten()
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .count()
        })
        .unwrap_or(0)
}

fn describe(dir: &Path, hash: String) -> HashInfo {
    let state_db = dir.join(STATE_DB);
    let state_db_mtime = fs::metadata(&state_db)
        .and_then(|m| m.modified())
        .ok()
        .map(local_from_system);
    let chat_dir = dir.join(CHAT_SESSIONS_DIR);
    HashInfo {
        hash,
        path: dir.to_path_buf(),
        workspace_json: dir.join(WORKSPACE_JSON),
        state_db,
        state_db_mtime,
        chat_files: count_files(&chat_dir),
        chat_dir,
    }
}

/// Every hash directory under `storage_root` whose `workspace.json` contains at
/// least one needle (case-insensitive substring), in directory iteration order.
/// Directories without a descriptor are skipped.
pub fn find_hashes_by_needles(storage_root: &Path, needles: &[String]) -> Result<Vec<HashInfo>> {
    let lowered: Vec<String> = needles
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.to_lowercase())
        .collect();
    if lowered.is_empty() {
        return Err(RestoreError::NoNeedles.into());
    }

    let entries = fs::read_dir(storage_root)
        .wrap_err_with(|| format!("Failed to list {}", storage_root.display()))?;

    let mut hits = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let descriptor = dir.join(WORKSPACE_JSON);
        if !descriptor.is_file() {
            continue;
        }
        let content = match read_text_best_effort(&descriptor) {
            Ok(c) => c.to_lowercase(),
            Err(e) => {
                warn!("Skipping unreadable {}: {}", descriptor.display(), e);
                continue;
            }
        };
        if !lowered.iter().any(|n| content.contains(n.as_str())) {
            continue;
        }
        let hash = entry.file_name().to_string_lossy().into_owned();
        debug!("matched hash {}", hash);
        hits.push(describe(&dir, hash));
    }
    Ok(hits)
}

/// Most recently used first, by `state.vscdb` mtime. Hashes without a
/// database sort last; ties keep scan order.
pub fn rank_hashes(hashes: &mut [HashInfo]) {
    hashes.sort_by(|a, b| b.state_db_mtime.cmp(&a.state_db_mtime));
}

/// Scan and rank in one go; the first element is the suggested destination.
pub fn discover_hashes(storage_root: &Path, needles: &[String]) -> Result<Vec<HashInfo>> {
    let mut hashes = find_hashes_by_needles(storage_root, needles)?;
    rank_hashes(&mut hashes);
    Ok(hashes)
}
