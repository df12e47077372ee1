//! Handler for `pakt installer`.

use miette::Result;

use pakt_ops::ops_install::InstallOptions;
use pakt_ops::ops_installer;
use pakt_ops::ops_resolve::InterruptGuard;

use crate::cli::InstallerAction;

pub async fn exec(action: InstallerAction) -> Result<()> {
    let project = super::load_project(None)?;
    match action {
        InstallerAction::Disable { tag } => {
            ops_installer::disable(&project, &tag)?;
            Ok(())
        }
        InstallerAction::List => {
            let guard = InterruptGuard::install();
            let opts = InstallOptions {
                cancel: guard.token(),
                ..InstallOptions::default()
            };
            ops_installer::print_list(&project, &opts).await
        }
    }
}
