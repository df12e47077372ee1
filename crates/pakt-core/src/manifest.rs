use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use pakt_util::errors::PaktError;
use toml_edit::{Array, DocumentMut, Item, Table, Value};

/// The parsed representation of a `pakt.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub package: PackageMetadata,

    #[serde(default)]
    pub require: BTreeMap<String, String>,

    #[serde(default, rename = "require-dev")]
    pub require_dev: BTreeMap<String, String>,

    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryEntry>,

    #[serde(default)]
    pub extra: ExtraConfig,
}

/// Package identity from the `[package]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

/// A metadata repository, either a bare path or a detailed table.
///
/// Relative paths are resolved against the directory holding `pakt.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepositoryEntry {
    Path(String),
    Detailed { path: String },
}

impl RepositoryEntry {
    pub fn path(&self) -> &str {
        match self {
            RepositoryEntry::Path(p) => p,
            RepositoryEntry::Detailed { path } => path,
        }
    }
}

/// Free-form `[extra]` section. Only `installer-disable` has meaning to pakt;
/// everything else is preserved for other tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraConfig {
    #[serde(default, rename = "installer-disable")]
    pub installer_disable: InstallerDisable,

    #[serde(flatten)]
    pub other: BTreeMap<String, toml::Value>,
}

/// Installer types that generic installer handlers must not claim.
///
/// Accepts `false` (nothing disabled), `true` (everything disabled), a
/// single tag, or an array of tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawInstallerDisable", into = "RawInstallerDisable")]
pub enum InstallerDisable {
    All,
    Tags(BTreeSet<String>),
}

impl Default for InstallerDisable {
    fn default() -> Self {
        Self::Tags(BTreeSet::new())
    }
}

impl InstallerDisable {
    pub fn contains(&self, tag: &str) -> bool {
        match self {
            InstallerDisable::All => true,
            InstallerDisable::Tags(tags) => tags.contains(tag),
        }
    }

    /// Add a tag. Returns `false` if it was already covered.
    pub fn insert(&mut self, tag: &str) -> bool {
        match self {
            InstallerDisable::All => false,
            InstallerDisable::Tags(tags) => tags.insert(tag.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawInstallerDisable {
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

impl From<RawInstallerDisable> for InstallerDisable {
    fn from(raw: RawInstallerDisable) -> Self {
        match raw {
            RawInstallerDisable::Flag(true) => InstallerDisable::All,
            RawInstallerDisable::Flag(false) => InstallerDisable::default(),
            RawInstallerDisable::One(tag) => InstallerDisable::Tags([tag].into_iter().collect()),
            RawInstallerDisable::Many(tags) => InstallerDisable::Tags(tags.into_iter().collect()),
        }
    }
}

impl From<InstallerDisable> for RawInstallerDisable {
    fn from(value: InstallerDisable) -> Self {
        match value {
            InstallerDisable::All => RawInstallerDisable::Flag(true),
            InstallerDisable::Tags(tags) => RawInstallerDisable::Many(tags.into_iter().collect()),
        }
    }
}

impl Manifest {
    /// Load and parse a `pakt.toml` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PaktError::Manifest {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_str(&content)
    }

    /// Parse a `pakt.toml` from a string.
    pub fn from_str(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            PaktError::Manifest {
                message: format!("Failed to parse pakt.toml: {e}"),
            }
            .into()
        })
    }

    /// The root requirements to resolve, name to constraint string.
    ///
    /// With `include_dev`, `require-dev` entries are merged in; an entry in
    /// `require` takes precedence over a dev entry of the same name.
    pub fn requirements(&self, include_dev: bool) -> BTreeMap<String, String> {
        let mut reqs = BTreeMap::new();
        if include_dev {
            reqs.extend(self.require_dev.clone());
        }
        reqs.extend(self.require.clone());
        reqs
    }

    /// Fingerprint of everything in the manifest that affects resolution.
    ///
    /// Stored in `pakt.lock` to detect a lockfile that no longer matches.
    pub fn content_hash(&self) -> String {
        let dev: Vec<(String, &str)> = self
            .require_dev
            .iter()
            .map(|(k, v)| (format!("dev:{k}"), v.as_str()))
            .collect();
        let pairs = self
            .require
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(dev.iter().map(|(k, v)| (k.as_str(), *v)));
        pakt_util::hash::sha256_pairs(pairs)
    }
}

/// Rewrite `extra.installer-disable` in the manifest at `path`.
///
/// Uses format-preserving edits so comments and ordering survive. The file is
/// written to a sibling temporary file and renamed into place.
pub fn write_installer_disable(path: &Path, value: &InstallerDisable) -> miette::Result<()> {
    let content = std::fs::read_to_string(path).map_err(|e| PaktError::Manifest {
        message: format!("Failed to read {}: {e}", path.display()),
    })?;

    let mut doc: DocumentMut = content.parse().map_err(|e| PaktError::Manifest {
        message: format!("Failed to parse pakt.toml: {e}"),
    })?;

    if !doc.as_table().contains_key("extra") {
        doc.as_table_mut().insert("extra", Item::Table(Table::new()));
    }
    if !doc["extra"].is_table_like() {
        return Err(PaktError::Manifest {
            message: "`extra` in pakt.toml must be a table".to_string(),
        }
        .into());
    }
    let item = match value {
        InstallerDisable::All => Item::Value(Value::from(true)),
        InstallerDisable::Tags(tags) => {
            let mut array = Array::new();
            for tag in tags {
                array.push(tag.as_str());
            }
            Item::Value(Value::Array(array))
        }
    };
    doc["extra"]["installer-disable"] = item;

    let tmp = path.with_extension("toml.tmp");
    {
        let mut file = std::fs::File::create(&tmp).map_err(PaktError::Io)?;
        file.write_all(doc.to_string().as_bytes())
            .map_err(PaktError::Io)?;
        file.sync_all().map_err(PaktError::Io)?;
    }
    std::fs::rename(&tmp, path).map_err(PaktError::Io)?;
    tracing::debug!("recorded installer-disable in {}", path.display());
    Ok(())
}
