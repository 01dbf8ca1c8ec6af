use chrono::{DateTime, Local};
use eyre::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::inventory::SessionArtifact;

/// Keys whose string values are treated as conversation text.
const TEXT_KEYS: &[&str] = &["text", "value", "content", "message", "prompt", "response"];

#[derive(Serialize)]
struct Frontmatter<'a> {
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    source: String,
    exported_at: DateTime<Local>,
}

/// Unique, non-empty text chunks in document order (depth-first).
pub fn collect_text_chunks(doc: &Value) -> Vec<String> {
    fn walk(v: &Value, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        match v {
            Value::Object(map) => {
                for (k, v) in map {
                    match v {
                        Value::String(s) if TEXT_KEYS.contains(&k.as_str()) => {
                            let t = s.trim();
                            if !t.is_empty() && seen.insert(t.to_string()) {
                                out.push(t.to_string());
                            }
                        }
                        _ => walk(v, seen, out),
                    }
                }
            }
            Value::Array(items) => {
                for it in items {
                    walk(it, seen, out);
                }
            }
            _ => {}
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    walk(doc, &mut seen, &mut out);
    out
}

pub fn write_session_markdown<W: Write>(
    writer: &mut W,
    item: &SessionArtifact,
    chunks: &[String],
) -> std::io::Result<()> {
    let fm = Frontmatter {
        session_id: &item.session_id,
        title: (!item.title.is_empty()).then_some(item.title.as_str()),
        source: item.path.display().to_string(),
        exported_at: Local::now(),
    };
    let yaml = serde_yaml::to_string(&fm).map_err(std::io::Error::other)?;

    writeln!(writer, "---")?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;
    writeln!(writer, "# Recovered Copilot chat")?;
    writeln!(writer)?;
    writeln!(writer, "**File:** {}", item.path.display())?;
    writeln!(writer)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;
    for chunk in chunks {
        writeln!(writer, "{}", chunk)?;
        writeln!(writer)?;
        writeln!(writer, "---")?;
        writeln!(writer)?;
    }
    Ok(())
}

/// `<slug>.recovered.md`; ids come from file content, so they are slugified.
pub fn export_file_name(session_id: &str) -> String {
    let slug = slug::slugify(session_id);
    let stem = if slug.is_empty() { "session" } else { slug.as_str() };
    format!("{stem}.recovered.md")
}

/// Best-effort Markdown dump of a `.json` session into `out_dir`.
pub fn export_markdown(item: &SessionArtifact, out_dir: &Path) -> Result<PathBuf> {
    let bytes = fs::read(&item.path)
        .wrap_err_with(|| format!("Failed to read {}", item.path.display()))?;
    let doc: Value = serde_json::from_slice(&bytes)
        .wrap_err_with(|| format!("Failed to parse {}", item.path.display()))?;
    let chunks = collect_text_chunks(&doc);

    fs::create_dir_all(out_dir)
        .wrap_err_with(|| format!("Failed to create {}", out_dir.display()))?;
    let out_path = out_dir.join(export_file_name(&item.session_id));

    let mut tmp = NamedTempFile::new_in(out_dir).wrap_err("Failed to create temporary file")?;
    write_session_markdown(&mut tmp, item, &chunks).wrap_err("Failed to write markdown")?;
    tmp.persist(&out_path)
        .wrap_err_with(|| format!("Failed to write {}", out_path.display()))?;
    Ok(out_path)
}
