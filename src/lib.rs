//! # chat-session-restore
//!
//! A CLI tool that brings back [VS Code](https://code.visualstudio.com) Copilot
//! chat sessions that disappeared after a workspace changed identity.
//!
//! ## What it does
//!
//! VS Code keeps per-workspace state under `workspaceStorage/<hash>/`, where the
//! hash is derived from the workspace's identity. Turning a single folder into a
//! multi-root `.code-workspace` (or moving it) yields a new hash, and the chat
//! sessions in the old hash's `chatSessions/` folder stop showing up.
//!
//! This tool:
//!
//! 1. turns the workspace path into search needles (paths and `file://` URI spellings),
//! 2. finds every hash whose `workspace.json` mentions one of them,
//! 3. suggests the most recently used hash as the destination,
//! 4. lists sessions in the other hashes and marks each as missing, newer, or
//!    already present in the destination,
//! 5. copies the chosen ones over, and optionally rewrites the session index in
//!    the destination's `state.vscdb`.
//!
//! Every hash involved is backed up before anything is written.
//!
//! ## Usage
//!
//! ```sh
//! # Guided run
//! chat-session-restore ~/code/my-app.code-workspace
//!
//! # See what would happen, accepting every default
//! chat-session-restore ~/code/my-app --dry-run --yes
//! ```
//!
//! Preferences can be persisted in `~/.config/chat-session-restore/config.toml`.
//!
//! ## Compatibility
//!
//! Tracks VS Code's internal (undocumented) storage layout. Close VS Code before
//! copying or reindexing.

pub mod backup;
pub mod channels;
pub mod error;
pub mod exporter;
pub mod index;
pub mod inventory;
pub mod needles;
pub mod reconcile;
pub mod scanner;
pub mod utils;
pub mod wizard;
