//! Handlers for `pakt install` and `pakt update`.

use miette::Result;

use pakt_ops::ops_install::{self, InstallOptions};
use pakt_ops::ops_resolve::InterruptGuard;

pub async fn exec(no_dev: bool, dry_run: bool) -> Result<()> {
    let project = super::load_project(None)?;
    let guard = InterruptGuard::install();
    let opts = InstallOptions {
        no_dev,
        dry_run,
        cancel: guard.token(),
        ..InstallOptions::default()
    };
    ops_install::install(&project, &opts).await?;
    Ok(())
}

pub async fn exec_update(packages: Vec<String>, no_dev: bool, dry_run: bool) -> Result<()> {
    let project = super::load_project(None)?;
    let guard = InterruptGuard::install();
    let opts = InstallOptions {
        no_dev,
        dry_run,
        cancel: guard.token(),
        ..InstallOptions::default()
    };
    ops_install::update(&project, packages, &opts).await?;
    Ok(())
}
