use chat_session_restore::channels::Channel;
use chat_session_restore::utils::RestoreConfig;
use chat_session_restore::wizard;
use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Restore VS Code Copilot chat sessions orphaned by a workspace identity change.
/// Runs as a guided wizard; every question can be answered up front with flags.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a .code-workspace file or a project folder.
    #[arg(value_name = "WORKSPACE")]
    workspace_pos: Option<String>,

    /// Same as the positional WORKSPACE.
    #[arg(long, value_name = "PATH")]
    workspace: Option<String>,

    /// VS Code channel to search.
    #[arg(long, value_enum)]
    channel: Option<Channel>,

    /// workspaceStorage directory to use instead of auto-detecting one.
    #[arg(long, value_name = "PATH")]
    storage_root: Option<PathBuf>,

    /// Extra keyword to look for in workspace.json (repeatable).
    #[arg(long = "needle", value_name = "KEYWORD")]
    needles: Vec<String>,

    /// Destination hash, instead of choosing interactively.
    #[arg(long, value_name = "HASH")]
    target: Option<String>,

    /// Skip backups (not recommended).
    #[arg(long)]
    skip_backup: bool,

    /// Where backups go. Defaults to ./backups.
    #[arg(long, value_name = "PATH")]
    backup_dir: Option<PathBuf>,

    /// Export copied sessions to Markdown (best-effort).
    #[arg(long)]
    export_md: bool,

    /// Where Markdown exports go. Defaults to the current directory.
    #[arg(long, value_name = "PATH")]
    export_dir: Option<PathBuf>,

    /// Rewrite the session index in state.vscdb after copying.
    #[arg(long)]
    reindex: bool,

    /// Only show what would be copied; do not modify anything.
    #[arg(long)]
    dry_run: bool,

    /// Accept every default without asking.
    #[arg(short, long)]
    yes: bool,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/chat-session-restore/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,

    /// No progress spinners.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    storage_root: Option<PathBuf>,
    channel: Option<String>,
    backup_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    skip_backup: Option<bool>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("chat-session-restore/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Channel (CLI > Config)
    let channel = match (cli.channel, file_cfg.channel.as_deref()) {
        (Some(ch), _) => Some(ch),
        (None, Some(name)) => Some(
            Channel::from_name(name)
                .ok_or_else(|| eyre!("Unknown channel in config: {name:?}"))?,
        ),
        (None, None) => None,
    };

    // 3. Build the run config (CLI > Config > Default)
    let config = RestoreConfig {
        storage_root: cli.storage_root.or(file_cfg.storage_root),
        channel,
        workspace: cli.workspace.or(cli.workspace_pos),
        extra_needles: cli.needles,
        target: cli.target,
        backup_dir: cli
            .backup_dir
            .or(file_cfg.backup_dir)
            .unwrap_or_else(|| PathBuf::from("backups")),
        export_dir: cli
            .export_dir
            .or(file_cfg.export_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
        skip_backup: cli.skip_backup || file_cfg.skip_backup.unwrap_or(false),
        export_md: cli.export_md,
        reindex: cli.reindex.then_some(true),
        dry_run: cli.dry_run,
        assume_yes: cli.yes,
        quiet: cli.quiet,
    };

    // 4. Run the wizard
    let outcome = wizard::run(&config)?;
    Ok(ExitCode::from(outcome.exit_code()))
}
