//! Plan execution.
//!
//! [`execute`] walks a plan strictly in order and hands every step to a
//! [`PlanExecutor`]. The first failing step stops execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pakt_plugin::coordinator::{Coordinator, Registration};
use pakt_plugin::handler::{InstallerHandler, TemplateInstaller};
use pakt_util::errors::PaktError;
use pakt_util::progress;

use crate::plan::{InstallPlan, Step};

/// Performs the effects of plan steps.
pub trait PlanExecutor {
    fn apply(&mut self, step: &Step) -> miette::Result<()>;
}

/// Counts of the steps that ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub installed: usize,
    pub removed: usize,
    pub activated: usize,
}

/// Run every step of `plan` in order, consuming it.
pub fn execute(plan: InstallPlan, executor: &mut dyn PlanExecutor) -> miette::Result<ExecutionSummary> {
    let mut summary = ExecutionSummary::default();
    for step in plan.into_steps() {
        tracing::debug!("executing {step}");
        executor.apply(&step)?;
        match step {
            Step::Install { .. } => summary.installed += 1,
            Step::Remove { .. } => summary.removed += 1,
            Step::ActivateInstaller { .. } => summary.activated += 1,
        }
    }
    Ok(summary)
}

/// Places packages under a project root through the coordinator's handlers.
pub struct FilesystemExecutor<'a> {
    root: PathBuf,
    coordinator: &'a Coordinator,
    dry_run: bool,
}

impl<'a> FilesystemExecutor<'a> {
    pub fn new(root: impl Into<PathBuf>, coordinator: &'a Coordinator, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            coordinator,
            dry_run,
        }
    }

    fn handler(&self, tag: &str) -> miette::Result<Arc<dyn InstallerHandler>> {
        self.coordinator.handler_for(tag).ok_or_else(|| {
            PaktError::Installer {
                message: format!("no installer is active for type '{tag}'"),
            }
            .into()
        })
    }

    fn target(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

impl PlanExecutor for FilesystemExecutor<'_> {
    fn apply(&mut self, step: &Step) -> miette::Result<()> {
        match step {
            Step::Install {
                name,
                version,
                installer_type,
                package,
            } => {
                let handler = self.handler(installer_type)?;
                let target = self.target(&handler.install_path(package));
                progress::status("Installing", &format!("{name} ({version})"));
                if !self.dry_run {
                    handler.install(package, &target)?;
                }
            }
            Step::Remove {
                name,
                version,
                installer_type,
                install_path,
            } => {
                progress::status("Removing", &format!("{name} ({version})"));
                if self.dry_run {
                    return Ok(());
                }
                match install_path {
                    Some(path) => {
                        pakt_util::fs::remove_dir_if_exists(&self.target(path))
                            .map_err(PaktError::Io)?;
                    }
                    None => {
                        tracing::warn!(
                            "no install path recorded for {name} ({installer_type}); nothing removed"
                        );
                    }
                }
            }
            Step::ActivateInstaller {
                package,
                installer_type,
                path_template,
            } => {
                let outcome = self.coordinator.claim(installer_type, || {
                    let handler = TemplateInstaller::new(package.clone(), path_template)?;
                    Ok(Arc::new(handler) as Arc<dyn InstallerHandler>)
                })
                .map_err(PaktError::from)?;
                if let Registration::Replaced { previous } = &outcome {
                    progress::status_info(
                        "Replaced",
                        &format!("{previous} for type {installer_type}"),
                    );
                }
                progress::status("Activating", &format!("{package} for {installer_type}"));
            }
        }
        Ok(())
    }
}
