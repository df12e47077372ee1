//! Command dispatch and handler modules.

mod install;
mod installer;
mod resolve;
mod tree;

use std::path::Path;

use miette::Result;

use pakt_core::config::GlobalConfig;
use pakt_ops::project::Project;
use pakt_util::errors::PaktError;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    tracing::debug!("running {:?}", cli.command);
    match cli.command {
        Command::Resolve { manifest, no_dev } => resolve::exec(manifest.as_deref(), no_dev).await,
        Command::Install { no_dev, dry_run } => install::exec(no_dev, dry_run).await,
        Command::Update {
            packages,
            no_dev,
            dry_run,
        } => install::exec_update(packages, no_dev, dry_run).await,
        Command::Tree { depth, no_dev } => tree::exec(depth, no_dev).await,
        Command::Why { package } => tree::exec_why(&package).await,
        Command::Installer { action } => installer::exec(action).await,
    }
}

/// Load the project at `manifest`, or the nearest one above the current
/// directory.
fn load_project(manifest: Option<&Path>) -> Result<Project> {
    let config = GlobalConfig::load()?;
    match manifest {
        Some(path) => Project::load(path, config),
        None => {
            let cwd = std::env::current_dir().map_err(PaktError::Io)?;
            Project::discover(&cwd, config)
        }
    }
}
