use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::utils::{read_text_best_effort, unique_non_empty};

const WORKSPACE_FILE_EXT: &str = "code-workspace";

/// Everything but unreserved characters and `/` is escaped in a workspace URI.
const URI_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// What the input resolved to, plus the de-duplicated needles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeedleSet {
    pub label: String,
    pub needles: Vec<String>,
}

/// Trim quotes pasted from file managers, expand `~`, and make the path absolute.
pub fn resolve_input_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches('"').trim_matches('\'');
    let expanded = match trimmed.strip_prefix("~") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => dirs::home_dir()
            .map(|h| h.join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| PathBuf::from(trimmed)),
        _ => PathBuf::from(trimmed),
    };
    absolutize(&expanded)
}

/// Canonical form when the path exists, a lexically cleaned absolute path otherwise.
fn absolutize(path: &Path) -> PathBuf {
    if let Ok(p) = path.canonicalize() {
        return p;
    }
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for comp in abs.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

pub fn is_code_workspace_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(WORKSPACE_FILE_EXT))
}

pub fn normalize_separators(s: &str) -> String {
    s.replace('\\', "/")
}

fn encode_uri_path(path: &str) -> String {
    utf8_percent_encode(path, URI_PATH).to_string()
}

/// `C:/rest` split into `('C', "/rest")`.
fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => Some((drive, chars.as_str())),
        _ => None,
    }
}

/// Percent-encoded `file://` URI, as VS Code writes it: `proj (copy)` becomes
/// `proj%20%28copy%29`. Relative paths have no URI.
pub fn to_file_uri(path: &Path) -> Option<String> {
    let full = normalize_separators(&path.to_string_lossy());
    let raw = match split_drive(&full) {
        Some((drive, rest)) => format!("file:///{drive}:{}", encode_uri_path(rest)),
        None if full.starts_with('/') => format!("file://{}", encode_uri_path(&full)),
        None => return None,
    };
    Url::parse(&raw).ok().map(|_| raw)
}

/// Drive-letter spellings for a path whose second character is a volume separator.
/// `C:\Users\A` yields `file:///C:/Users/A`, `file:///c:/Users/A`,
/// `file:///c%3A/Users/A` and `file:///c%3a/Users/A`.
pub fn drive_uri_variants(path: &str) -> Vec<String> {
    let normalized = normalize_separators(path);
    let Some((drive, rest)) = split_drive(&normalized) else {
        return Vec::new();
    };
    let rest = encode_uri_path(rest);
    let lower = drive.to_lowercase();
    vec![
        format!("file:///{drive}:{rest}"),
        format!("file:///{lower}:{rest}"),
        format!("file:///{lower}%3A{rest}"),
        format!("file:///{lower}%3a{rest}"),
    ]
}

/// The plain URI first, then any drive-letter variants, unique.
pub fn uri_variants(path: &Path) -> Vec<String> {
    let plain = to_file_uri(path);
    let drive = drive_uri_variants(&path.to_string_lossy());
    unique_non_empty(plain.into_iter().chain(drive))
}

/// Path, normalized path, URI and lower-cased URI.
fn path_needles(path: &Path) -> Vec<String> {
    let full = path.to_string_lossy().into_owned();
    let uri = to_file_uri(path).unwrap_or_default();
    let normalized = normalize_separators(&full);
    let lower_uri = uri.to_lowercase();
    vec![full, normalized, uri, lower_uri]
}

/// Needles for each `folders[]` entry of a `.code-workspace` file.
/// Anything unreadable or oddly shaped just contributes nothing.
pub fn workspace_folder_needles(workspace_file: &Path) -> Vec<String> {
    let Ok(text) = read_text_best_effort(workspace_file) else {
        return Vec::new();
    };
    let Ok(doc) = serde_json::from_str::<Value>(&text) else {
        tracing::debug!("{} is not valid JSON", workspace_file.display());
        return Vec::new();
    };
    let Some(folders) = doc.get("folders").and_then(Value::as_array) else {
        return Vec::new();
    };
    let base = workspace_file.parent().unwrap_or(Path::new(""));

    let mut needles = Vec::new();
    for folder in folders {
        let non_blank = |key: &str| {
            folder
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };
        if let Some(uri) = non_blank("uri") {
            needles.push(uri.to_string());
        } else if let Some(rel) = non_blank("path") {
            let p = Path::new(rel);
            let resolved = if p.is_absolute() {
                p.to_path_buf()
            } else {
                absolutize(&base.join(p))
            };
            let full = resolved.to_string_lossy().into_owned();
            needles.push(full.clone());
            needles.push(normalize_separators(&full));
            needles.extend(uri_variants(&resolved));
        }
    }
    unique_non_empty(needles)
}

/// Needles for an already resolved input path.
pub fn build_needles(path: &Path) -> NeedleSet {
    let full = path.to_string_lossy().into_owned();

    if is_code_workspace_file(path) {
        let mut needles = path_needles(path);
        needles.extend(workspace_folder_needles(path));
        return NeedleSet {
            label: format!("WorkspaceFile: {full}"),
            needles: unique_non_empty(needles),
        };
    }

    if path.is_dir() {
        let mut needles = path_needles(path);
        needles.extend(uri_variants(path));
        return NeedleSet {
            label: format!("WorkspaceFolder: {full}"),
            needles: unique_non_empty(needles),
        };
    }

    // Nothing on disk; search heuristically with what was typed.
    NeedleSet {
        label: format!("Path: {full}"),
        needles: unique_non_empty([full.clone(), normalize_separators(&full), full.to_lowercase()]),
    }
}
