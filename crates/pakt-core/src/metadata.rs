//! Package metadata files served by a path repository.
//!
//! A repository is a directory holding one TOML file per package, at
//! `<root>/<vendor>/<name>.toml` for a package named `vendor/name`:
//!
//! ```toml
//! [[version]]
//! version = "2.3.0"
//! type = "library"
//! dist = "dist/util-2.3.0"
//!
//! [version.require]
//! "acme/log" = "^1.0"
//!
//! [version.replace]
//! "legacy/util" = "self.version"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pakt_util::errors::PaktError;

/// Installer type assumed when a version entry does not declare one.
pub const DEFAULT_INSTALLER_TYPE: &str = "library";

/// Placeholder in `provide`/`replace` meaning "the version being declared".
pub const SELF_VERSION: &str = "self.version";

/// All published versions of one package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageFile {
    #[serde(default, rename = "version")]
    pub versions: Vec<VersionEntry>,
}

/// One published version and its relations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,

    #[serde(default = "default_installer_type", rename = "type")]
    pub installer_type: String,

    #[serde(default)]
    pub require: BTreeMap<String, String>,

    #[serde(default)]
    pub conflict: BTreeMap<String, String>,

    #[serde(default)]
    pub provide: BTreeMap<String, String>,

    #[serde(default)]
    pub replace: BTreeMap<String, String>,

    /// Directory (relative to the repository root) holding the package files.
    #[serde(default)]
    pub dist: Option<String>,

    #[serde(default)]
    pub installer: Option<InstallerDecl>,
}

/// Marks a package as an installer plugin for the listed types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerDecl {
    pub types: Vec<String>,
    /// Install path template, e.g. `web/ext/{package}`.
    pub path: String,
}

fn default_installer_type() -> String {
    DEFAULT_INSTALLER_TYPE.to_string()
}

impl PackageFile {
    /// Load and parse a package metadata file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PaktError::Metadata {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_str(&content).map_err(|e| {
            PaktError::Metadata {
                message: format!("{}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Parse package metadata from a string.
    pub fn from_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Location of the metadata file for `name` inside a repository rooted at `root`.
///
/// Returns `None` for names that would escape the repository.
pub fn package_file_path(root: &Path, name: &str) -> Option<PathBuf> {
    let valid = !name.is_empty()
        && name
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    valid.then(|| root.join(format!("{name}.toml")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_names() {
        let root = Path::new("/repo");
        assert!(package_file_path(root, "../etc/passwd").is_none());
        assert!(package_file_path(root, "acme//util").is_none());
        assert!(package_file_path(root, "").is_none());
        assert_eq!(
            package_file_path(root, "acme/util"),
            Some(PathBuf::from("/repo/acme/util.toml"))
        );
    }

    #[test]
    fn type_defaults_to_library() {
        let file = PackageFile::from_str("[[version]]\nversion = \"1.0.0\"\n").unwrap();
        assert_eq!(file.versions[0].installer_type, DEFAULT_INSTALLER_TYPE);
        assert!(file.versions[0].installer.is_none());
    }
}
