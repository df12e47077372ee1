//! In-memory index of known package versions.
//!
//! The index is filled once by [`crate::source::populate_index`] (or by hand
//! in tests) and is read-only for the rest of the resolution session.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::version::{Constraint, ConstraintError, Version};

/// Identity of a package version: `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PackageId {
    pub name: String,
    pub version: Version,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A named constraint: a requirement on, or a conflict with, another package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub name: String,
    pub constraint: Constraint,
}

/// A name a package answers to besides its own, at a fixed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provision {
    pub name: String,
    pub version: Version,
}

/// Declares that a package installs other packages of the listed types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallerSpec {
    pub types: Vec<String>,
    pub path_template: String,
}

/// One published version of a package. Immutable once in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageVersion {
    pub name: String,
    pub version: Version,
    pub requires: Vec<Link>,
    pub conflicts: Vec<Link>,
    pub provides: Vec<Provision>,
    pub replaces: Vec<Provision>,
    pub installer_type: String,
    pub installer: Option<InstallerSpec>,
    /// Directory holding the package files, when the source knows one.
    pub dist: Option<PathBuf>,
}

impl PackageVersion {
    pub fn builder(name: &str, version: &str) -> PackageVersionBuilder {
        PackageVersionBuilder {
            name: name.to_string(),
            version: version.to_string(),
            requires: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            replaces: Vec::new(),
            installer_type: pakt_core::metadata::DEFAULT_INSTALLER_TYPE.to_string(),
            installer: None,
            dist: None,
        }
    }

    pub fn id(&self) -> PackageId {
        PackageId::new(self.name.clone(), self.version.clone())
    }

    /// The version this package presents under `name`: its own version for
    /// its own name, the declared version for a provided or replaced name.
    pub fn version_as(&self, name: &str) -> Option<&Version> {
        if self.name == name {
            return Some(&self.version);
        }
        self.replaces
            .iter()
            .chain(&self.provides)
            .find(|p| p.name == name)
            .map(|p| &p.version)
    }

    /// Every name this package answers to, its own first.
    pub fn answers_to(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.replaces.iter().map(|p| p.name.as_str()))
            .chain(self.provides.iter().map(|p| p.name.as_str()))
    }

    pub fn is_installer_plugin(&self) -> bool {
        self.installer.is_some()
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Builder for [`PackageVersion`]; constraint strings are parsed in [`build`].
///
/// [`build`]: PackageVersionBuilder::build
pub struct PackageVersionBuilder {
    name: String,
    version: String,
    requires: Vec<(String, String)>,
    conflicts: Vec<(String, String)>,
    provides: Vec<(String, String)>,
    replaces: Vec<(String, String)>,
    installer_type: String,
    installer: Option<InstallerSpec>,
    dist: Option<PathBuf>,
}

impl PackageVersionBuilder {
    pub fn require(mut self, name: &str, constraint: &str) -> Self {
        self.requires.push((name.to_string(), constraint.to_string()));
        self
    }

    pub fn conflict(mut self, name: &str, constraint: &str) -> Self {
        self.conflicts.push((name.to_string(), constraint.to_string()));
        self
    }

    /// `version` may be `self.version`.
    pub fn provide(mut self, name: &str, version: &str) -> Self {
        self.provides.push((name.to_string(), version.to_string()));
        self
    }

    /// `version` may be `self.version`.
    pub fn replace(mut self, name: &str, version: &str) -> Self {
        self.replaces.push((name.to_string(), version.to_string()));
        self
    }

    pub fn installer_type(mut self, tag: &str) -> Self {
        self.installer_type = tag.to_string();
        self
    }

    pub fn installer(mut self, types: &[&str], path_template: &str) -> Self {
        self.installer = Some(InstallerSpec {
            types: types.iter().map(|t| t.to_string()).collect(),
            path_template: path_template.to_string(),
        });
        self
    }

    pub fn dist(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dist = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<PackageVersion, ConstraintError> {
        let version = Version::parse(&self.version)?;
        let links = |pairs: Vec<(String, String)>| {
            pairs
                .into_iter()
                .map(|(name, c)| {
                    Ok(Link {
                        name,
                        constraint: Constraint::parse(&c)?,
                    })
                })
                .collect::<Result<Vec<_>, ConstraintError>>()
        };
        let provisions = |pairs: Vec<(String, String)>| {
            pairs
                .into_iter()
                .map(|(name, v)| {
                    let version = if v == pakt_core::metadata::SELF_VERSION {
                        version.clone()
                    } else {
                        Version::parse(&v)?
                    };
                    Ok(Provision { name, version })
                })
                .collect::<Result<Vec<_>, ConstraintError>>()
        };

        Ok(PackageVersion {
            requires: links(self.requires)?,
            conflicts: links(self.conflicts)?,
            provides: provisions(self.provides)?,
            replaces: provisions(self.replaces)?,
            name: self.name,
            version,
            installer_type: self.installer_type,
            installer: self.installer,
            dist: self.dist,
        })
    }
}

/// Mapping from package name to its known versions, newest first.
#[derive(Debug, Default)]
pub struct RepositoryIndex {
    packages: BTreeMap<String, Vec<Arc<PackageVersion>>>,
    /// Virtual name to the packages providing or replacing it.
    providers: BTreeMap<String, Vec<Arc<PackageVersion>>>,
    /// Packages whose metadata could not be fetched, with the reason.
    unavailable: BTreeMap<String, String>,
}

impl RepositoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a version. Returns `false` if `(name, version)` is already
    /// known; the first insertion wins.
    pub fn add(&mut self, package: PackageVersion) -> bool {
        let versions = self.packages.entry(package.name.clone()).or_default();
        if versions.iter().any(|p| p.version == package.version) {
            return false;
        }
        let package = Arc::new(package);
        let pos = versions
            .iter()
            .position(|p| p.version < package.version)
            .unwrap_or(versions.len());
        versions.insert(pos, Arc::clone(&package));

        for provided in package.replaces.iter().chain(&package.provides) {
            if provided.name == package.name {
                continue;
            }
            let list = self.providers.entry(provided.name.clone()).or_default();
            if !list.iter().any(|p| p.id() == package.id()) {
                list.push(Arc::clone(&package));
            }
        }
        self.unavailable.remove(&package.name);
        true
    }

    /// All known versions of `name`, newest first.
    pub fn find(&self, name: &str) -> &[Arc<PackageVersion>] {
        self.packages.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Versions of `name` satisfying `constraint`, newest first.
    pub fn find_matching(&self, name: &str, constraint: &Constraint) -> Vec<Arc<PackageVersion>> {
        self.find(name)
            .iter()
            .filter(|p| constraint.satisfies(&p.version))
            .cloned()
            .collect()
    }

    /// The newest version of `name` satisfying `constraint`.
    pub fn find_package(&self, name: &str, constraint: &Constraint) -> Option<Arc<PackageVersion>> {
        self.find(name)
            .iter()
            .find(|p| constraint.satisfies(&p.version))
            .cloned()
    }

    /// Every package that can stand in for `name`: real versions plus
    /// providers and replacers.
    ///
    /// Ordered by the version presented under `name`, newest first; real
    /// versions win ties, then providers by id.
    pub fn candidates(&self, name: &str) -> Vec<Arc<PackageVersion>> {
        let mut all: Vec<Arc<PackageVersion>> = self.find(name).to_vec();
        if let Some(providers) = self.providers.get(name) {
            all.extend(providers.iter().cloned());
        }
        all.sort_by(|a, b| {
            let va = a.version_as(name);
            let vb = b.version_as(name);
            vb.cmp(&va)
                .then_with(|| (b.name == name).cmp(&(a.name == name)))
                .then_with(|| a.id().cmp(&b.id()))
        });
        all
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name) || self.providers.contains_key(name)
    }

    /// Record that metadata for `name` could not be fetched.
    pub fn mark_unavailable(&mut self, name: &str, reason: impl Into<String>) {
        if !self.packages.contains_key(name) {
            self.unavailable.insert(name.to_string(), reason.into());
        }
    }

    /// Why `name` is unavailable, if its fetch failed.
    pub fn unavailable_reason(&self, name: &str) -> Option<&str> {
        self.unavailable.get(name).map(String::as_str)
    }

    /// Package names with at least one real version, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Total number of indexed versions.
    pub fn len(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str) -> PackageVersion {
        PackageVersion::builder(name, version).build().unwrap()
    }

    #[test]
    fn versions_are_kept_newest_first() {
        let mut index = RepositoryIndex::new();
        index.add(pkg("acme/b", "1.9.0"));
        index.add(pkg("acme/b", "2.3.0"));
        index.add(pkg("acme/b", "2.0.0"));
        let versions: Vec<String> = index
            .find("acme/b")
            .iter()
            .map(|p| p.version.to_string())
            .collect();
        assert_eq!(versions, vec!["2.3.0", "2.0.0", "1.9.0"]);
    }

    #[test]
    fn first_insertion_wins() {
        let mut index = RepositoryIndex::new();
        assert!(index.add(pkg("acme/b", "1.0.0")));
        assert!(!index.add(pkg("acme/b", "1.0")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn self_version_provision() {
        let p = PackageVersion::builder("acme/new", "3.1.0")
            .replace("acme/old", "self.version")
            .provide("acme/api", "1.0")
            .build()
            .unwrap();
        assert_eq!(p.version_as("acme/old"), Some(&Version::new(3, 1, 0)));
        assert_eq!(p.version_as("acme/api"), Some(&Version::new(1, 0, 0)));
        assert_eq!(p.version_as("acme/other"), None);
        assert_eq!(
            p.answers_to().collect::<Vec<_>>(),
            vec!["acme/new", "acme/old", "acme/api"]
        );
    }

    #[test]
    fn candidates_include_providers_after_real_on_ties() {
        let mut index = RepositoryIndex::new();
        index.add(pkg("acme/log", "1.0.0"));
        index.add(
            PackageVersion::builder("other/log", "5.0.0")
                .provide("acme/log", "1.0.0")
                .build()
                .unwrap(),
        );
        index.add(
            PackageVersion::builder("fork/log", "1.0.0")
                .replace("acme/log", "2.0.0")
                .build()
                .unwrap(),
        );
        let names: Vec<String> = index
            .candidates("acme/log")
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["fork/log", "acme/log", "other/log"]);
        assert!(index.contains("acme/log"));
    }

    #[test]
    fn unavailable_is_cleared_by_a_later_add() {
        let mut index = RepositoryIndex::new();
        index.mark_unavailable("acme/x", "not found");
        assert_eq!(index.unavailable_reason("acme/x"), Some("not found"));
        index.add(pkg("acme/x", "1.0.0"));
        assert_eq!(index.unavailable_reason("acme/x"), None);
    }
}
