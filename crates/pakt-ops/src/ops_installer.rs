//! Operations: `pakt installer disable` and `pakt installer list`.

use std::sync::Arc;

use pakt_core::manifest::InstallerDisable;
use pakt_plugin::coordinator::Coordinator;
use pakt_plugin::handler::{InstallerHandler, TemplateInstaller};
use pakt_plugin::registry::InstallerRegistry;
use pakt_plugin::store::{ManifestStore, MemoryStore};
use pakt_util::errors::PaktError;
use pakt_util::progress;

use crate::ops_install::{self, InstallOptions};
use crate::ops_resolve::{self, LockPolicy};
use crate::project::Project;

/// Durably disable `tag` for generic installers. Returns `false` if it
/// already was.
pub fn disable(project: &Project, tag: &str) -> miette::Result<bool> {
    let store = Arc::new(ManifestStore::new(&project.manifest_path));
    let coordinator = Coordinator::new(InstallerRegistry::new(), store).map_err(PaktError::from)?;
    let changed = coordinator.disable(tag).map_err(PaktError::from)?;
    if changed {
        progress::status("Disabled", &format!("generic installers for type {tag}"));
    } else {
        progress::status_info("Unchanged", &format!("type {tag} was already disabled"));
    }
    Ok(changed)
}

/// One row of `pakt installer list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerEntry {
    pub installer_type: String,
    pub handler: String,
}

/// The handler an install would use for each installer type, and the
/// disabled set after the plugins have activated.
///
/// Activation runs against an in-memory copy of the disabled set, so the
/// manifest is left alone.
pub async fn list(
    project: &Project,
    opts: &InstallOptions,
) -> miette::Result<(Vec<InstallerEntry>, InstallerDisable)> {
    let lock = project.load_lock()?;
    let resolution = ops_resolve::resolve_project(
        project,
        !opts.no_dev,
        lock.as_ref(),
        &LockPolicy::Prefer,
        opts.cancel.clone(),
    )
    .await?
    .into_result()?;

    let store = Arc::new(MemoryStore::new(project.manifest.extra.installer_disable.clone()));
    let coordinator = ops_install::coordinator(project, &resolution, store)?;
    for plugin in resolution.packages().filter(|p| p.is_installer_plugin()) {
        let Some(spec) = &plugin.installer else {
            continue;
        };
        for tag in &spec.types {
            coordinator
                .claim(tag, || {
                    let handler = TemplateInstaller::new(plugin.name.clone(), &spec.path_template)?;
                    Ok(Arc::new(handler) as Arc<dyn InstallerHandler>)
                })
                .map_err(PaktError::from)?;
        }
    }

    let entries = coordinator
        .entries()
        .into_iter()
        .map(|(installer_type, handler)| InstallerEntry {
            installer_type,
            handler,
        })
        .collect();
    Ok((entries, coordinator.disabled()))
}

/// Print the output of [`list`].
pub async fn print_list(project: &Project, opts: &InstallOptions) -> miette::Result<()> {
    let (entries, disabled) = list(project, opts).await?;
    if entries.is_empty() {
        println!("No installer types in use.");
    }
    for entry in &entries {
        println!("{:<24} {}", entry.installer_type, entry.handler);
    }
    match disabled {
        InstallerDisable::All => println!("\nGeneric installers disabled for: all types"),
        InstallerDisable::Tags(tags) if !tags.is_empty() => {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            println!("\nGeneric installers disabled for: {}", tags.join(", "));
        }
        InstallerDisable::Tags(_) => {}
    }
    Ok(())
}
