use std::path::PathBuf;

use thiserror::Error;

/// Failures a caller has to tell apart from generic I/O trouble.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("no search needles supplied; an empty needle would match every workspace")]
    NoNeedles,
    #[error("state database not found: {}", .0.display())]
    MissingStateDb(PathBuf),
    #[error("chatSessions folder not found: {}", .0.display())]
    MissingChatSessions(PathBuf),
    #[error("workspace hash does not exist: {0}")]
    HashNotFound(String),
    #[error("workspace hash {0} is not among the matched hashes")]
    UnknownHash(String),
}
