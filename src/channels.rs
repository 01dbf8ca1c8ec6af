use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};

/// VS Code release channel; each keeps its own workspaceStorage tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Channel {
    #[value(name = "Code", aliases = ["code", "stable"])]
    Stable,
    #[value(name = "Code - Insiders", alias = "insiders")]
    Insiders,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Stable, Channel::Insiders];

    /// Directory name under the user config dir.
    pub fn dir_name(self) -> &'static str {
        match self {
            Channel::Stable => "Code",
            Channel::Insiders => "Code - Insiders",
        }
    }

    /// Lenient parse used for config-file values.
    pub fn from_name(name: &str) -> Option<Self> {
        Channel::from_str(name.trim(), true).ok()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A workspaceStorage directory plus where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelRoot {
    pub label: String,
    pub root: PathBuf,
}

pub fn workspace_storage_dir(config_dir: &Path, channel: Channel) -> PathBuf {
    config_dir
        .join(channel.dir_name())
        .join("User")
        .join("workspaceStorage")
}

/// Every channel whose workspaceStorage exists under `config_dir`, in channel order.
pub fn discover_roots(config_dir: &Path) -> Vec<ChannelRoot> {
    Channel::ALL
        .iter()
        .map(|&ch| (ch, workspace_storage_dir(config_dir, ch)))
        .filter(|(_, p)| p.is_dir())
        .map(|(ch, root)| ChannelRoot {
            label: ch.to_string(),
            root,
        })
        .collect()
}

/// Roots for this run: the explicit override, or whatever is installed for the user.
pub fn channel_roots(storage_root: Option<&Path>) -> Vec<ChannelRoot> {
    if let Some(root) = storage_root {
        if root.is_dir() {
            return vec![ChannelRoot {
                label: "custom".to_string(),
                root: root.to_path_buf(),
            }];
        }
        tracing::warn!("storage root {} is not a directory", root.display());
        return Vec::new();
    }
    dirs::config_dir()
        .map(|d| discover_roots(&d))
        .unwrap_or_default()
}
