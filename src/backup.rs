use eyre::{Context, Result};
use filetime::FileTime;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use crate::error::RestoreError;
use crate::inventory::SessionArtifact;
use crate::utils::now_stamp;

fn spinner(quiet: bool, msg: String) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let s = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        s.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    s.set_message(msg);
    s.enable_steady_tick(Duration::from_millis(80));
    s
}

/// Copy a file and carry its mtime over.
fn copy_with_mtime(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)
        .wrap_err_with(|| format!("Failed to copy {} -> {}", src.display(), dest.display()))?;
    let meta = fs::metadata(src).wrap_err_with(|| format!("Failed to stat {}", src.display()))?;
    filetime::set_file_mtime(dest, FileTime::from_last_modification_time(&meta))
        .wrap_err_with(|| format!("Failed to set mtime on {}", dest.display()))?;
    Ok(())
}

/// Recursive copy of `src` into `dest`, merging with whatever is already there.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<u64> {
    let mut files = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.wrap_err_with(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .wrap_err("Walked outside the source tree")?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .wrap_err_with(|| format!("Failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            copy_with_mtime(entry.path(), &target)?;
            files += 1;
        }
    }
    Ok(files)
}

/// Snapshot `<storage>/<hash>` as `<backup_root>/workspaceStorage_<hash>_<stamp>`.
pub fn backup_hash(storage_root: &Path, hash: &str, backup_root: &Path, quiet: bool) -> Result<PathBuf> {
    let src = storage_root.join(hash);
    if !src.is_dir() {
        return Err(RestoreError::HashNotFound(hash.to_string()).into());
    }
    let dest = backup_root.join(format!("workspaceStorage_{}_{}", hash, now_stamp()));
    fs::create_dir_all(backup_root)
        .wrap_err_with(|| format!("Failed to create {}", backup_root.display()))?;

    let pb = spinner(quiet, format!("Backing up {hash}..."));
    let copied = copy_tree(&src, &dest);
    pb.finish_and_clear();
    let files = copied?;
    tracing::debug!("backed up {} files from {}", files, hash);
    Ok(dest)
}

/// Put a session file into the destination's `chatSessions`, replacing any
/// file of the same name.
pub fn copy_session(item: &SessionArtifact, target_chat_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(target_chat_dir)
        .wrap_err_with(|| format!("Failed to create {}", target_chat_dir.display()))?;
    let name = item
        .path
        .file_name()
        .ok_or_else(|| eyre::eyre!("Session path has no file name: {}", item.path.display()))?;
    let dest = target_chat_dir.join(name);
    copy_with_mtime(&item.path, &dest)?;
    Ok(dest)
}
