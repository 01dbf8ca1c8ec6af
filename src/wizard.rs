use eyre::Result;
use std::io::{self, BufRead, Write};
use tracing::debug;

use crate::backup::{backup_hash, copy_session};
use crate::channels::{ChannelRoot, channel_roots};
use crate::error::RestoreError;
use crate::exporter::export_markdown;
use crate::index::{CHAT_INDEX_KEY, reindex_state_db};
use crate::inventory::{SessionArtifact, SessionFormat, session_inventory};
use crate::needles::{build_needles, is_code_workspace_file, resolve_input_path, to_file_uri};
use crate::reconcile::{
    CopyDecision, SessionRow, default_selection, reconcile, target_session_map,
};
use crate::scanner::{HashInfo, discover_hashes};
use crate::utils::{RestoreConfig, fmt_dt, truncate_chars};

/// How a run ended, for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    /// No storage root, bad channel, or no matching hash.
    DiscoveryFailed,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Completed | Outcome::Cancelled => 0,
            Outcome::DiscoveryFailed => 2,
        }
    }
}

/// Line-oriented questions. When not interactive, or once input is exhausted,
/// every question takes its default.
pub struct Prompter<R> {
    input: R,
    interactive: bool,
}

impl<R: BufRead> Prompter<R> {
    pub fn new(input: R, interactive: bool) -> Self {
        Self { input, interactive }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Trimmed answer, empty for "take the default".
    pub fn ask(&mut self, question: &str) -> String {
        if !self.interactive {
            return String::new();
        }
        print!("{question}");
        io::stdout().flush().ok();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => {
                self.interactive = false;
                String::new()
            }
            Ok(_) => line.trim().trim_matches('`').to_string(),
        }
    }

    /// Number in `min..=max`; blanks and garbage give `default`, out of range is clamped.
    pub fn choose_int(&mut self, question: &str, default: usize, min: usize, max: usize) -> usize {
        let raw = self.ask(question);
        match raw.parse::<usize>() {
            Ok(n) => n.clamp(min, max),
            Err(_) => default,
        }
    }

    pub fn yes_no(&mut self, question: &str, default_yes: bool) -> bool {
        let suffix = if default_yes { " (Y/n): " } else { " (y/N): " };
        let raw = self.ask(&format!("{question}{suffix}"));
        if raw.is_empty() {
            return default_yes;
        }
        let lower = raw.to_lowercase();
        lower.starts_with('y') || lower.starts_with('s')
    }
}

/// `all`, or a comma list of 1-based row numbers. Unknown parts are dropped,
/// duplicates removed, order kept.
pub fn parse_selection(raw: &str, max: usize) -> Vec<usize> {
    let r = raw.trim().trim_matches('`').to_lowercase();
    if r == "all" {
        return (1..=max).collect();
    }
    let mut out = Vec::new();
    for part in r.split(',') {
        if let Ok(n) = part.trim().parse::<usize>()
            && (1..=max).contains(&n)
            && !out.contains(&n)
        {
            out.push(n);
        }
    }
    out
}

fn print_hashes(hashes: &[HashInfo]) {
    println!("\n=== Matching workspaces (hashes) ===");
    println!("A workspace hash is a VS Code folder under workspaceStorage.");
    println!("The most recently used one (by state.vscdb mtime) is suggested as the DESTINATION.");
    println!("\n N  WorkspaceHash                      LastUsed(state.vscdb)      SessionsOnDisk");
    println!("--- ---------------------------------- -------------------------- --------------");
    for (i, h) in hashes.iter().enumerate() {
        let mt = h
            .state_db_mtime
            .as_ref()
            .map(fmt_dt)
            .unwrap_or_else(|| "(none)".to_string());
        println!("{:>2}  {:<34} {:<26} {:>14}", i + 1, h.hash, mt, h.chat_files);
    }
}

fn print_rows(rows: &[SessionRow]) {
    println!("What CopyDecision means:");
    for d in [
        CopyDecision::MissingInTarget,
        CopyDecision::NewerInSource,
        CopyDecision::AlreadyInTarget,
    ] {
        println!("- {}: {}", d, d.description());
    }
    println!();
    println!(" N  CopyDecision    LastUpdated          CreatedAt            SessionId                             Title");
    println!("--- --------------- ------------------- ------------------- ------------------------------------- --------------------");
    for row in rows {
        let it = &row.item;
        println!(
            "{:>2}  {:<15} {:<19} {:<19} {:<37} {}",
            row.number,
            row.decision,
            fmt_dt(&it.updated),
            fmt_dt(&it.created),
            it.session_id,
            truncate_chars(&it.title, 60)
        );
    }
}

fn choose_root<R: BufRead>(
    config: &RestoreConfig,
    prompt: &mut Prompter<R>,
) -> Option<ChannelRoot> {
    let roots = channel_roots(config.storage_root.as_deref());
    if roots.is_empty() {
        eprintln!("No VS Code workspaceStorage found for Code / Code - Insiders (try --storage-root).");
        return None;
    }
    if config.storage_root.is_some() || (roots.len() == 1 && config.channel.is_none()) {
        return roots.into_iter().next();
    }
    if let Some(channel) = config.channel {
        let found = roots.iter().find(|r| r.label == channel.to_string()).cloned();
        if found.is_none() {
            let available: Vec<&str> = roots.iter().map(|r| r.label.as_str()).collect();
            eprintln!("Channel {channel} is not installed. Available: {}", available.join(", "));
        }
        return found;
    }
    println!("Found more than one channel:");
    for (i, r) in roots.iter().enumerate() {
        println!("[{}] {} -> {}", i + 1, r.label, r.root.display());
    }
    let idx = prompt.choose_int("Choose channel (Enter = 1): ", 1, 1, roots.len());
    roots.into_iter().nth(idx - 1)
}

fn choose_target<R: BufRead>(
    config: &RestoreConfig,
    prompt: &mut Prompter<R>,
    hashes: &[HashInfo],
) -> Result<usize> {
    if let Some(target) = &config.target {
        return hashes
            .iter()
            .position(|h| &h.hash == target)
            .ok_or_else(|| RestoreError::UnknownHash(target.clone()).into());
    }
    let idx = prompt.choose_int("Choose DESTINATION hash (Enter = 1): ", 1, 1, hashes.len());
    Ok(idx - 1)
}

fn print_dry_run(config: &RestoreConfig, rows: &[SessionRow], selection: &[usize], target: &str) {
    println!("\n=== DRY-RUN ===");
    if selection.is_empty() {
        println!("Nothing to copy (default selection is empty).");
    } else {
        println!("Would copy {} sessions into destination hash {}:", selection.len(), target);
        for &n in selection {
            let it = &rows[n - 1].item;
            let name = it.path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
            println!("- {} ({}) from {} -> {}", it.session_id, it.format.as_str(), it.hash, name);
        }
    }
    if config.reindex == Some(true) {
        println!("Would rewrite {CHAT_INDEX_KEY} in the destination state.vscdb.");
    }
}

fn export_selected(config: &RestoreConfig, selected: &[&SessionArtifact]) {
    println!("\n=== Markdown export (best-effort) ===");
    for it in selected.iter().filter(|it| it.format == SessionFormat::Json) {
        match export_markdown(it, &config.export_dir) {
            Ok(out) => println!("Exported -> {}", out.display()),
            Err(e) => println!("Could not export {}: {:#}", it.path.display(), e),
        }
    }
}

/// Interactive run on stdin.
pub fn run(config: &RestoreConfig) -> Result<Outcome> {
    let stdin = io::stdin();
    let mut prompt = Prompter::new(stdin.lock(), !config.assume_yes);
    run_with(config, &mut prompt)
}

pub fn run_with<R: BufRead>(config: &RestoreConfig, prompt: &mut Prompter<R>) -> Result<Outcome> {
    let Some(root) = choose_root(config, prompt) else {
        return Ok(Outcome::DiscoveryFailed);
    };
    let storage = root.root.as_path();
    println!("\nworkspaceStorage: {}", storage.display());
    println!("Tip: close VS Code before copying or reindexing to avoid locks.");

    let raw_input = match &config.workspace {
        Some(w) => w.clone(),
        None => prompt.ask("Paste the path of the .code-workspace file or project folder: "),
    };
    if raw_input.trim().is_empty() {
        println!("Cancelled");
        return Ok(Outcome::Cancelled);
    }

    let ws_path = resolve_input_path(&raw_input);
    let set = build_needles(&ws_path);
    let mut needles = set.needles;
    needles.extend(
        config
            .extra_needles
            .iter()
            .filter(|n| !n.trim().is_empty())
            .cloned(),
    );
    println!("\n{}", set.label);
    if (is_code_workspace_file(&ws_path) || ws_path.is_dir())
        && let Some(uri) = to_file_uri(&ws_path)
    {
        println!("URI: {uri}");
    }
    debug!("searching with {} needles", needles.len());

    let mut hashes = discover_hashes(storage, &needles)?;
    if hashes.is_empty() {
        eprintln!("No related hashes found in workspace.json.");
        let extra = prompt.ask(
            "Extra keyword to search for (e.g. the workspace folder name). Enter = cancel: ",
        );
        if !extra.is_empty() {
            needles.push(extra);
            hashes = discover_hashes(storage, &needles)?;
        }
        if hashes.is_empty() {
            eprintln!("Try --workspace pointing at a folder inside the workspace, or add --needle.");
            return Ok(Outcome::DiscoveryFailed);
        }
    }

    print_hashes(&hashes);
    let target = &hashes[choose_target(config, prompt, &hashes)?];
    println!("Destination: {}", target.hash);

    let sources: Vec<String> = hashes
        .iter()
        .filter(|h| h.hash != target.hash && h.chat_files > 0)
        .map(|h| h.hash.clone())
        .collect();
    if sources.is_empty() {
        println!("No SOURCE hashes with chatSessions to copy.");
        return Ok(Outcome::Completed);
    }

    if !config.skip_backup && !config.dry_run {
        println!("\n=== Backups ===");
        for h in std::iter::once(&target.hash).chain(sources.iter()) {
            let dest = backup_hash(storage, h, &config.backup_dir, config.quiet)?;
            println!("Backup -> {}", dest.display());
        }
    }

    println!("\n=== Session inventory ===");
    let inventory = session_inventory(storage, &sources);
    if inventory.is_empty() {
        println!("No sessions found in source hashes.");
        return Ok(Outcome::Completed);
    }
    let rows = reconcile(inventory, &target_session_map(storage, &target.hash));
    print_rows(&rows);
    let default_sel = default_selection(&rows);
    println!(
        "\nDefault selection: {} sessions (MissingInTarget/NewerInSource)",
        default_sel.len()
    );

    if config.dry_run {
        print_dry_run(config, &rows, &default_sel, &target.hash);
        return Ok(Outcome::Completed);
    }

    let raw_sel = prompt.ask("Choose which to copy: 'all' or a list like 1,2,3 (Enter = default): ");
    let selection = if raw_sel.is_empty() {
        default_sel
    } else {
        parse_selection(&raw_sel, rows.len())
    };
    if selection.is_empty() {
        println!("Nothing selected.");
        return Ok(Outcome::Completed);
    }
    let selected: Vec<&SessionArtifact> = selection.iter().map(|&n| &rows[n - 1].item).collect();

    println!("\n=== Copying selected sessions ===");
    for it in &selected {
        let dest = copy_session(it, &target.chat_dir)?;
        println!("Copied -> {}", dest.display());
    }

    if config.export_md {
        export_selected(config, &selected);
    }

    let do_reindex = config
        .reindex
        .unwrap_or_else(|| prompt.yes_no("Reindex state.vscdb now?", false));
    if do_reindex {
        println!("\n=== Reindex state.vscdb ===");
        let report = reindex_state_db(&target.path)?;
        println!("Backup DB -> {}", report.db_backup.display());
        println!("OK: reindex wrote {CHAT_INDEX_KEY} ({} entries)", report.entries);
    }

    println!("\nDone. Open VS Code and try opening the recovered session(s).");
    Ok(Outcome::Completed)
}
