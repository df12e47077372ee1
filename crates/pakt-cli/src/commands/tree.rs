//! Handlers for `pakt tree` and `pakt why`.

use miette::Result;

use pakt_ops::ops_resolve::InterruptGuard;
use pakt_ops::ops_tree::{self, TreeOptions};

pub async fn exec(depth: Option<usize>, no_dev: bool) -> Result<()> {
    let project = super::load_project(None)?;
    let guard = InterruptGuard::install();
    let opts = TreeOptions {
        depth,
        no_dev,
        cancel: guard.token(),
    };
    ops_tree::tree(&project, &opts).await
}

pub async fn exec_why(package: &str) -> Result<()> {
    let project = super::load_project(None)?;
    let guard = InterruptGuard::install();
    let opts = TreeOptions {
        cancel: guard.token(),
        ..TreeOptions::default()
    };
    ops_tree::why(&project, package, &opts).await
}
