//! The phases of a run: populate the index, resolve, plan.
//!
//! Each phase is a plain function taking its inputs explicitly; commands
//! chain them and decide what to do with the outcome.

use std::collections::BTreeMap;

use pakt_core::lockfile::Lockfile;
use pakt_installer::plan::{self, InstallPlan};
use pakt_resolver::conflict::ConflictReport;
use pakt_resolver::index::RepositoryIndex;
use pakt_resolver::resolver::{CancelToken, Resolution, ResolveError, Resolver, ResolverOptions};
use pakt_resolver::source;
use pakt_resolver::version::Constraint;
use pakt_util::errors::PaktError;
use pakt_util::progress;
use tokio::task::JoinHandle;

use crate::project::{locked_versions, Project};

/// How a run that can hit a conflict ended.
#[derive(Debug)]
pub enum Outcome<T> {
    Done(T),
    Conflict(ConflictReport),
    Cancelled,
}

impl<T> Outcome<T> {
    /// Turn a conflict or a cancellation into an error.
    pub fn into_result(self) -> miette::Result<T> {
        match self {
            Outcome::Done(value) => Ok(value),
            Outcome::Conflict(report) => Err(PaktError::from(ResolveError::Conflict(report)).into()),
            Outcome::Cancelled => Err(PaktError::Cancelled.into()),
        }
    }
}

/// Cancels a token when the user presses Ctrl-C, until dropped.
pub struct InterruptGuard {
    token: CancelToken,
    task: JoinHandle<()>,
}

impl InterruptGuard {
    /// Must be called from within a tokio runtime.
    pub fn install() -> Self {
        let token = CancelToken::new();
        let watched = token.clone();
        let task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, cancelling");
                watched.cancel();
            }
        });
        Self { token, task }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fetch metadata for everything reachable from `roots` into a frozen index.
pub async fn populate_index(
    project: &Project,
    roots: &BTreeMap<String, Constraint>,
) -> miette::Result<RepositoryIndex> {
    let sources = project.sources();
    if sources.is_empty() {
        progress::status_warn("Warning", "no package repositories are configured");
    }
    tracing::info!("populating index from {} repositories", sources.len());

    let sp = progress::spinner("Fetching package metadata...");
    let result = source::populate_index(&sources, roots.keys().cloned(), project.config.fetch.jobs).await;
    sp.finish_and_clear();
    result.map_err(|e| PaktError::from(e).into())
}

/// Run the resolver off the async runtime.
pub async fn resolve(
    index: RepositoryIndex,
    roots: BTreeMap<String, Constraint>,
    options: ResolverOptions,
) -> miette::Result<Outcome<Resolution>> {
    tracing::info!("resolving {} root requirement(s)", roots.len());
    let sp = progress::spinner("Resolving dependencies...");
    let joined =
        tokio::task::spawn_blocking(move || Resolver::new(&index, options).resolve(&roots)).await;
    sp.finish_and_clear();

    let result = joined.map_err(|e| PaktError::Generic {
        message: format!("resolver task failed: {e}"),
    })?;
    Ok(match result {
        Ok(resolution) => Outcome::Done(resolution),
        Err(ResolveError::Conflict(report)) => Outcome::Conflict(report),
        Err(ResolveError::Cancelled) => Outcome::Cancelled,
    })
}

/// Order the steps that take the project from `current` to `resolution`.
pub fn plan(resolution: &Resolution, current: Option<&Lockfile>) -> miette::Result<InstallPlan> {
    plan::plan(resolution, current).map_err(|e| PaktError::from(e).into())
}

/// Which locked versions a run prefers.
#[derive(Debug, Clone, Default)]
pub enum LockPolicy {
    /// Try the locked version of every package first.
    #[default]
    Prefer,
    /// Ignore the locked versions of these packages, or of all packages
    /// when empty.
    Unlock(Vec<String>),
}

/// Populate and resolve in one go, preferring locked versions per `policy`.
pub async fn resolve_project(
    project: &Project,
    include_dev: bool,
    lock: Option<&Lockfile>,
    policy: &LockPolicy,
    cancel: CancelToken,
) -> miette::Result<Outcome<Resolution>> {
    let roots = project.roots(include_dev)?;
    let index = populate_index(project, &roots).await?;
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    let preferred = match (lock, policy) {
        (None, _) => BTreeMap::new(),
        (Some(_), LockPolicy::Unlock(names)) if names.is_empty() => BTreeMap::new(),
        (Some(lock), LockPolicy::Unlock(names)) => locked_versions(lock, names),
        (Some(lock), LockPolicy::Prefer) => locked_versions(lock, &[]),
    };
    resolve(index, roots, ResolverOptions { preferred, cancel }).await
}

/// `pakt resolve`: the plan an install would run, without running it.
pub async fn resolve_plan(
    project: &Project,
    include_dev: bool,
    cancel: CancelToken,
) -> miette::Result<Outcome<InstallPlan>> {
    let lock = project.load_lock()?;
    let outcome =
        resolve_project(project, include_dev, lock.as_ref(), &LockPolicy::Prefer, cancel).await?;
    Ok(match outcome {
        Outcome::Done(resolution) => Outcome::Done(plan(&resolution, lock.as_ref())?),
        Outcome::Conflict(report) => Outcome::Conflict(report),
        Outcome::Cancelled => Outcome::Cancelled,
    })
}
