use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pakt_util::errors::PaktError;

/// Global user configuration loaded from `~/.pakt/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub install: InstallConfig,

    /// Extra metadata repositories searched after the project's own,
    /// name to directory path.
    #[serde(default)]
    pub repositories: BTreeMap<String, String>,
}

/// Metadata fetching settings from `[fetch]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of metadata fetches in flight.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Installation settings from `[install]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Directory, relative to the project root, for `library` packages.
    #[serde(default = "default_vendor_dir", rename = "vendor-dir")]
    pub vendor_dir: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            vendor_dir: default_vendor_dir(),
        }
    }
}

fn default_vendor_dir() -> String {
    "vendor".to_string()
}

impl GlobalConfig {
    /// Load the global configuration, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load the configuration at `path`, or return defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| PaktError::Generic {
            message: format!("Failed to read global config: {e}"),
        })?;
        toml::from_str(&content).map_err(|e| {
            PaktError::Generic {
                message: format!("Failed to parse global config: {e}"),
            }
            .into()
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the pakt data directory: `$PAKT_HOME`, or `~/.pakt/`.
pub fn dirs_path() -> PathBuf {
    if let Ok(home) = std::env::var("PAKT_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".pakt")
}
