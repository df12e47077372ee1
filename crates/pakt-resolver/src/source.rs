//! Metadata sources and parallel index population.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pakt_core::metadata::{package_file_path, PackageFile, VersionEntry};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::index::{PackageVersion, RepositoryIndex};
use crate::version::ConstraintError;

/// Why metadata for a package could not be produced.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("package '{0}' was not found")]
    NotFound(String),

    #[error("failed to read metadata for '{package}': {message}")]
    Unreadable { package: String, message: String },

    /// Malformed constraint inside otherwise valid metadata. Fatal.
    #[error("invalid metadata for '{package}': {source}")]
    InvalidConstraint {
        package: String,
        #[source]
        source: ConstraintError,
    },
}

impl FetchError {
    /// Fatal errors abort population; the rest mark the package unavailable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::InvalidConstraint { .. })
    }
}

impl From<FetchError> for pakt_util::errors::PaktError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidConstraint { source, .. } => source.into(),
            other => pakt_util::errors::PaktError::Metadata {
                message: other.to_string(),
            },
        }
    }
}

/// Produces the published versions of a package.
///
/// Implementations are called from blocking worker threads and must be
/// safe to share between them.
pub trait MetadataSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    fn fetch_versions(&self, package: &str) -> Result<Vec<PackageVersion>, FetchError>;
}

/// A local path repository: one TOML file per package under `root`.
pub struct DirectorySource {
    name: String,
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MetadataSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_versions(&self, package: &str) -> Result<Vec<PackageVersion>, FetchError> {
        let path = package_file_path(&self.root, package)
            .ok_or_else(|| FetchError::NotFound(package.to_string()))?;
        if !path.is_file() {
            return Err(FetchError::NotFound(package.to_string()));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| FetchError::Unreadable {
            package: package.to_string(),
            message: format!("{}: {e}", path.display()),
        })?;
        let file = PackageFile::from_str(&content).map_err(|e| FetchError::Unreadable {
            package: package.to_string(),
            message: format!("{}: {e}", path.display()),
        })?;

        file.versions
            .iter()
            .map(|entry| from_entry(package, entry, &self.root))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| FetchError::InvalidConstraint {
                package: package.to_string(),
                source,
            })
    }
}

fn from_entry(name: &str, entry: &VersionEntry, root: &Path) -> Result<PackageVersion, ConstraintError> {
    let mut builder = PackageVersion::builder(name, &entry.version).installer_type(&entry.installer_type);
    for (dep, c) in &entry.require {
        builder = builder.require(dep, c);
    }
    for (dep, c) in &entry.conflict {
        builder = builder.conflict(dep, c);
    }
    for (dep, v) in &entry.provide {
        builder = builder.provide(dep, v);
    }
    for (dep, v) in &entry.replace {
        builder = builder.replace(dep, v);
    }
    if let Some(decl) = &entry.installer {
        let types: Vec<&str> = decl.types.iter().map(String::as_str).collect();
        builder = builder.installer(&types, &decl.path);
    }
    if let Some(dist) = &entry.dist {
        builder = builder.dist(root.join(dist));
    }
    builder.build()
}

/// Fixed set of versions held in memory.
#[derive(Default)]
pub struct MemorySource {
    packages: BTreeMap<String, Vec<PackageVersion>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, package: PackageVersion) {
        self.packages
            .entry(package.name.clone())
            .or_default()
            .push(package);
    }
}

impl MetadataSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_versions(&self, package: &str) -> Result<Vec<PackageVersion>, FetchError> {
        self.packages
            .get(package)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(package.to_string()))
    }
}

/// Ask each source in order; the first one that knows the package wins.
fn fetch_first(
    sources: &[Arc<dyn MetadataSource>],
    package: &str,
) -> Result<Vec<PackageVersion>, FetchError> {
    let mut last = FetchError::NotFound(package.to_string());
    for source in sources {
        match source.fetch_versions(package) {
            Ok(versions) => {
                tracing::debug!(
                    "fetched {} version(s) of {package} from {}",
                    versions.len(),
                    source.name()
                );
                return Ok(versions);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(FetchError::NotFound(_)) => {}
            Err(e) => {
                tracing::debug!("source {} failed for {package}: {e}", source.name());
                last = e;
            }
        }
    }
    Err(last)
}

/// Build a [`RepositoryIndex`] holding every package reachable from `roots`.
///
/// Fetches proceed breadth-first, one dependency level at a time, with at
/// most `jobs` fetches in flight. Results of a level are inserted in name
/// order so the index does not depend on completion order. Packages whose
/// fetch fails are recorded as unavailable; a fatal error aborts.
pub async fn populate_index(
    sources: &[Arc<dyn MetadataSource>],
    roots: impl IntoIterator<Item = String>,
    jobs: usize,
) -> Result<RepositoryIndex, FetchError> {
    let sources: Arc<[Arc<dyn MetadataSource>]> = sources.to_vec().into();
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let mut index = RepositoryIndex::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut level: BTreeSet<String> = roots.into_iter().collect();

    while !level.is_empty() {
        seen.extend(level.iter().cloned());

        let mut pending = level.clone();
        let mut join_set = JoinSet::new();
        for name in level {
            let sources = Arc::clone(&sources);
            let sem = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let lookup = name.clone();
                let result =
                    tokio::task::spawn_blocking(move || fetch_first(&sources, &lookup)).await;
                (name, result)
            });
        }

        let mut fetched: BTreeMap<String, Result<Vec<PackageVersion>, FetchError>> =
            BTreeMap::new();
        let mut task_failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(result))) => {
                    pending.remove(&name);
                    fetched.insert(name, result);
                }
                Ok((name, Err(e))) => {
                    pending.remove(&name);
                    fetched.insert(
                        name.clone(),
                        Err(FetchError::Unreadable {
                            package: name,
                            message: e.to_string(),
                        }),
                    );
                }
                Err(e) => {
                    tracing::warn!("metadata fetch task failed: {e}");
                    task_failure = Some(e.to_string());
                }
            }
        }
        // A task that died before reporting leaves its name pending.
        for name in pending {
            let message = task_failure
                .clone()
                .unwrap_or_else(|| "fetch task did not complete".to_string());
            fetched.insert(
                name.clone(),
                Err(FetchError::Unreadable {
                    package: name,
                    message,
                }),
            );
        }

        let mut next = BTreeSet::new();
        for (name, result) in fetched {
            match result {
                Ok(versions) => {
                    for version in versions {
                        for link in &version.requires {
                            if !seen.contains(&link.name) {
                                next.insert(link.name.clone());
                            }
                        }
                        index.add(version);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    // Virtual names only exist as provides/replaces.
                    if matches!(e, FetchError::NotFound(_)) {
                        tracing::debug!("{e}");
                    } else {
                        tracing::warn!("{e}");
                    }
                    index.mark_unavailable(&name, e.to_string());
                }
            }
        }
        level = next;
    }

    tracing::info!("indexed {} package version(s)", index.len());
    Ok(index)
}
