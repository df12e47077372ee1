//! A loaded project: its manifest, the user's global configuration and the
//! metadata sources they name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pakt_core::config::GlobalConfig;
use pakt_core::lockfile::Lockfile;
use pakt_core::manifest::Manifest;
use pakt_core::{LOCK_FILE, MANIFEST_FILE};
use pakt_resolver::source::{DirectorySource, MetadataSource};
use pakt_resolver::version::{Constraint, Version};
use pakt_resolver::resolver::parse_requirements;
use pakt_util::errors::PaktError;

pub struct Project {
    /// Directory holding `pakt.toml`; install paths are relative to it.
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
    pub config: GlobalConfig,
}

impl Project {
    pub fn load(manifest_path: &Path, config: GlobalConfig) -> miette::Result<Self> {
        let manifest = Manifest::from_path(manifest_path)?;
        let root = match manifest_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            root,
            manifest_path: manifest_path.to_path_buf(),
            manifest,
            config,
        })
    }

    /// Load the nearest `pakt.toml` at or above `start`.
    pub fn discover(start: &Path, config: GlobalConfig) -> miette::Result<Self> {
        let dir = pakt_util::fs::find_ancestor_with(start, MANIFEST_FILE).ok_or_else(|| {
            PaktError::Manifest {
                message: format!(
                    "could not find {MANIFEST_FILE} in {} or any parent directory",
                    start.display()
                ),
            }
        })?;
        Self::load(&dir.join(MANIFEST_FILE), config)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn load_lock(&self) -> miette::Result<Option<Lockfile>> {
        Lockfile::load_optional(&self.lock_path())
    }

    /// Root requirements, parsed. A malformed constraint is fatal.
    pub fn roots(&self, include_dev: bool) -> miette::Result<BTreeMap<String, Constraint>> {
        parse_requirements(&self.manifest.requirements(include_dev))
            .map_err(|e| PaktError::from(e).into())
    }

    /// Metadata sources in priority order: the manifest's repositories by
    /// name, then the global configuration's.
    pub fn sources(&self) -> Vec<Arc<dyn MetadataSource>> {
        let project = self
            .manifest
            .repositories
            .iter()
            .map(|(name, entry)| (name.clone(), self.root.join(entry.path())));
        let global = self
            .config
            .repositories
            .iter()
            .map(|(name, path)| (format!("global:{name}"), PathBuf::from(path)));

        project
            .chain(global)
            .map(|(name, dir)| {
                tracing::debug!("metadata repository {name} at {}", dir.display());
                Arc::new(DirectorySource::new(name, dir)) as Arc<dyn MetadataSource>
            })
            .collect()
    }
}

/// Versions recorded in `lock`, except for the names in `unlocked`.
pub fn locked_versions(lock: &Lockfile, unlocked: &[String]) -> BTreeMap<String, Version> {
    lock.package
        .iter()
        .filter(|p| !unlocked.contains(&p.name))
        .filter_map(|p| match Version::parse(&p.version) {
            Ok(v) => Some((p.name.clone(), v)),
            Err(e) => {
                tracing::warn!("ignoring locked version of {}: {e}", p.name);
                None
            }
        })
        .collect()
}
