//! Operations: `pakt install` and `pakt update`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use pakt_core::lockfile::{LockedPackage, Lockfile};
use pakt_core::metadata::DEFAULT_INSTALLER_TYPE;
use pakt_core::{LOCK_FILE, MANIFEST_FILE};
use pakt_installer::execute::{execute, ExecutionSummary, FilesystemExecutor};
use pakt_installer::plan::plan_with_paths;
use pakt_plugin::coordinator::{Coordinator, RegisterPolicy, Registration};
use pakt_plugin::handler::{InstallerHandler, LibraryInstaller, TemplateInstaller};
use pakt_plugin::registry::InstallerRegistry;
use pakt_plugin::store::{DisabledStore, ManifestStore, MemoryStore};
use pakt_resolver::resolver::{CancelToken, Resolution};
use pakt_util::errors::PaktError;
use pakt_util::progress;

use crate::ops_resolve::{self, LockPolicy};
use crate::project::Project;

/// Options shared by `pakt install` and `pakt update`.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Leave out `require-dev`.
    pub no_dev: bool,
    /// Plan and report without touching the project.
    pub dry_run: bool,
    pub lock: LockPolicy,
    pub cancel: CancelToken,
}

/// Install the project's requirements, preferring locked versions.
pub async fn install(project: &Project, opts: &InstallOptions) -> miette::Result<ExecutionSummary> {
    let lock = project.load_lock()?;
    if let (Some(lock), LockPolicy::Prefer) = (&lock, &opts.lock) {
        if !lock.is_fresh(&project.manifest.content_hash()) {
            tracing::warn!("{LOCK_FILE} does not match the requirements in {MANIFEST_FILE}");
            progress::status_warn(
                "Warning",
                &format!("{LOCK_FILE} is out of date with {MANIFEST_FILE}; run `pakt update` to refresh it"),
            );
        }
    }

    let resolution = ops_resolve::resolve_project(
        project,
        !opts.no_dev,
        lock.as_ref(),
        &opts.lock,
        opts.cancel.clone(),
    )
    .await?
    .into_result()?;

    let store: Arc<dyn DisabledStore> = if opts.dry_run {
        Arc::new(MemoryStore::new(project.manifest.extra.installer_disable.clone()))
    } else {
        Arc::new(ManifestStore::new(&project.manifest_path))
    };
    let coordinator = coordinator(project, &resolution, store)?;

    let handlers = planned_handlers(&resolution, &coordinator);
    let plan = plan_with_paths(&resolution, lock.as_ref(), |pkg| {
        handlers
            .get(&pkg.installer_type)
            .map(|handler| handler.install_path(pkg))
    })
    .map_err(PaktError::from)?;

    let nothing_to_do = plan.is_empty();
    let mut executor = FilesystemExecutor::new(&project.root, &coordinator, opts.dry_run);
    let summary = execute(plan, &mut executor)?;

    if opts.dry_run {
        progress::status_info("Dry run", "no changes were made");
        return Ok(summary);
    }

    let lockfile = lockfile_for(project, &resolution, &coordinator);
    lockfile.write_to(&project.lock_path())?;
    tracing::info!("wrote {} with {} package(s)", LOCK_FILE, lockfile.package.len());

    if nothing_to_do {
        progress::status_info("Finished", "nothing to install, update or remove");
    } else {
        progress::status(
            "Finished",
            &format!(
                "{} installed, {} removed",
                summary.installed, summary.removed
            ),
        );
    }
    Ok(summary)
}

/// Re-resolve ignoring locked versions, of `packages` or of everything.
pub async fn update(
    project: &Project,
    packages: Vec<String>,
    opts: &InstallOptions,
) -> miette::Result<ExecutionSummary> {
    let opts = InstallOptions {
        lock: LockPolicy::Unlock(packages),
        ..opts.clone()
    };
    install(project, &opts).await
}

/// A coordinator holding the built-in installer for every installer type in
/// `resolution`.
///
/// The `library` type gets the primary library installer; every other type
/// gets the generic fallback, which the disabled set may refuse. Plugin
/// handlers are activated later by the plan itself.
pub fn coordinator(
    project: &Project,
    resolution: &Resolution,
    store: Arc<dyn DisabledStore>,
) -> miette::Result<Coordinator> {
    let coordinator = Coordinator::new(InstallerRegistry::new(), store).map_err(PaktError::from)?;
    let vendor_dir = &project.config.install.vendor_dir;
    let primary: Arc<dyn InstallerHandler> = Arc::new(LibraryInstaller::primary(vendor_dir));
    let fallback: Arc<dyn InstallerHandler> = Arc::new(LibraryInstaller::new(vendor_dir));

    coordinator.register(DEFAULT_INSTALLER_TYPE, primary, RegisterPolicy::Replace);
    let tags: BTreeSet<&str> = resolution
        .packages()
        .map(|p| p.installer_type.as_str())
        .filter(|t| *t != DEFAULT_INSTALLER_TYPE)
        .collect();
    for tag in tags {
        if let Registration::Refused =
            coordinator.register(tag, Arc::clone(&fallback), RegisterPolicy::KeepExisting)
        {
            tracing::debug!(tag, "no generic installer for disabled type; a plugin must claim it");
        }
    }
    Ok(coordinator)
}

/// The handler each installer type will have once the plugins in
/// `resolution` are activated.
fn planned_handlers(
    resolution: &Resolution,
    coordinator: &Coordinator,
) -> BTreeMap<String, Arc<dyn InstallerHandler>> {
    let mut handlers = BTreeMap::new();
    for pkg in resolution.packages() {
        if let Some(handler) = coordinator.handler_for(&pkg.installer_type) {
            handlers.insert(pkg.installer_type.clone(), handler);
        }
    }
    for pkg in resolution.packages() {
        let Some(spec) = &pkg.installer else {
            continue;
        };
        // An invalid template fails later, when the plugin is activated.
        let Ok(handler) = TemplateInstaller::new(pkg.name.clone(), &spec.path_template) else {
            continue;
        };
        let handler: Arc<dyn InstallerHandler> = Arc::new(handler);
        for tag in &spec.types {
            handlers.insert(tag.clone(), Arc::clone(&handler));
        }
    }
    handlers
}

/// The lockfile describing `resolution` as installed by `coordinator`.
fn lockfile_for(project: &Project, resolution: &Resolution, coordinator: &Coordinator) -> Lockfile {
    let packages = resolution
        .packages()
        .map(|pkg| LockedPackage {
            name: pkg.name.clone(),
            version: pkg.version.to_string(),
            installer_type: pkg.installer_type.clone(),
            install_path: coordinator
                .handler_for(&pkg.installer_type)
                .map(|h| h.install_path(pkg).to_string_lossy().replace('\\', "/")),
            dependencies: resolution
                .dependencies_of(pkg)
                .into_iter()
                .map(|d| d.name.clone())
                .collect(),
        })
        .collect();
    Lockfile::generate(project.manifest.content_hash(), packages)
}
