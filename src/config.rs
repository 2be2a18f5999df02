use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_SUFFIX: &str = ".txt";
pub const DEFAULT_LEDGER: &str = "change.log";
pub const ROOT_ENV: &str = "LISTKEEPER_DIR";

/// Where lists live and how they are named.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub suffix: String,
    pub ledger_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: Self::data_dir(),
            suffix: DEFAULT_SUFFIX.to_string(),
            ledger_name: DEFAULT_LEDGER.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Default config, with the root taken from `LISTKEEPER_DIR` when set.
    pub fn from_env() -> Self {
        match std::env::var_os(ROOT_ENV) {
            Some(dir) if !dir.is_empty() => Self::with_root(PathBuf::from(dir)),
            _ => Self::default(),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(&self.ledger_name)
    }

    fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("listkeeper")
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("Library/Application Support/listkeeper")
        } else {
            // Linux and others
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".local/share/listkeeper")
        }
    }
}
