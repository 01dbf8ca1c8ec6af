use chrono::{DateTime, Local, TimeZone};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::channels::Channel;

/// Everything a single run needs to know.
/// This decouples the logic from how the arguments were parsed (CLI/Config file),
/// and replaces ambient toggles with one value passed down by reference.
#[derive(Clone, Debug, Default)]
pub struct RestoreConfig {
    /// Explicit workspaceStorage root. Skips channel discovery when set.
    pub storage_root: Option<PathBuf>,
    pub channel: Option<Channel>,
    /// Raw workspace argument as typed or pasted by the operator.
    pub workspace: Option<String>,
    pub extra_needles: Vec<String>,
    /// Destination hash chosen up front instead of prompting.
    pub target: Option<String>,
    pub backup_dir: PathBuf,
    pub export_dir: PathBuf,
    pub skip_backup: bool,
    pub export_md: bool,
    /// `Some(true)` forces a reindex, `None` asks.
    pub reindex: Option<bool>,
    pub dry_run: bool,
    /// Accept every default without reading stdin.
    pub assume_yes: bool,
    pub quiet: bool,
}

/// Timestamp used to suffix backups: `YYYYmmdd-HHMMSS`.
pub fn now_stamp() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

pub fn fmt_dt(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn local_from_system(t: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(t)
}

pub fn local_from_millis(ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(ms).single()
}

/// Milliseconds since the epoch of a file's mtime, 0 when unavailable.
pub fn file_mtime_ms(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| local_from_system(t).timestamp_millis())
        .unwrap_or(0)
}

/// (created, updated) from filesystem metadata.
/// Uses the birth time where the platform records one, otherwise the mtime for both.
pub fn stat_created_updated(path: &Path) -> io::Result<(DateTime<Local>, DateTime<Local>)> {
    let meta = fs::metadata(path)?;
    let modified = meta.modified()?;
    let created = meta.created().unwrap_or(modified);
    Ok((local_from_system(created), local_from_system(modified)))
}

/// Read a file as UTF-8, falling back to a lossy decode for odd encodings.
pub fn read_text_best_effort(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Shorten to `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    } else {
        s.to_string()
    }
}

/// Order-preserving de-duplication that also drops empty strings.
pub fn unique_non_empty<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}
