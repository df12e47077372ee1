use serde::{Deserialize, Serialize};
use std::path::Path;

use pakt_util::errors::PaktError;

/// Deterministic lockfile recording the installed set of packages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lockfile {
    /// Hash of the manifest requirements this lockfile was produced from.
    #[serde(default, rename = "content-hash")]
    pub content_hash: String,
    #[serde(default)]
    pub package: Vec<LockedPackage>,
}

/// A single installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    #[serde(rename = "installer-type")]
    pub installer_type: String,
    /// Where the package was placed, relative to the project root.
    #[serde(default, rename = "install-path")]
    pub install_path: Option<String>,
    /// Names of the installed packages this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Lockfile {
    /// Build a lockfile from an unordered package list. Packages are sorted
    /// by name so the output is stable across runs.
    pub fn generate(content_hash: String, mut packages: Vec<LockedPackage>) -> Self {
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        for pkg in &mut packages {
            pkg.dependencies.sort();
            pkg.dependencies.dedup();
        }
        Self {
            content_hash,
            package: packages,
        }
    }

    /// Load and parse a `pakt.lock` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PaktError::Generic {
            message: format!("Failed to read lockfile: {e}"),
        })?;
        toml::from_str(&content).map_err(|e| {
            PaktError::Generic {
                message: format!("Failed to parse lockfile: {e}"),
            }
            .into()
        })
    }

    /// Load the lockfile if it exists, `None` otherwise.
    pub fn load_optional(path: &Path) -> miette::Result<Option<Self>> {
        if path.is_file() {
            Self::from_path(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Serialize the lockfile to a pretty-printed TOML string.
    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write the lockfile to `path`.
    pub fn write_to(&self, path: &Path) -> miette::Result<()> {
        let content = self.to_string_pretty().map_err(|e| PaktError::Generic {
            message: format!("Failed to serialize lockfile: {e}"),
        })?;
        std::fs::write(path, content).map_err(|e| PaktError::Io(e).into())
    }

    /// The locked version of `name`, if it is installed.
    pub fn locked_version(&self, name: &str) -> Option<&str> {
        self.find(name).map(|p| p.version.as_str())
    }

    pub fn find(&self, name: &str) -> Option<&LockedPackage> {
        self.package.iter().find(|p| p.name == name)
    }

    /// Whether this lockfile was produced from a manifest with `hash`.
    pub fn is_fresh(&self, hash: &str) -> bool {
        self.content_hash == hash
    }
}
