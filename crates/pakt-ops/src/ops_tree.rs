//! Operations: display the dependency tree, and explain why a package is
//! installed.

use std::collections::BTreeSet;

use pakt_resolver::graph::{DependencyGraph, ResolvedNode};
use pakt_resolver::resolver::CancelToken;

use crate::ops_resolve::{self, LockPolicy};
use crate::project::Project;

/// Options for `pakt tree` and `pakt why`.
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Leave out `require-dev`.
    pub no_dev: bool,
    pub cancel: CancelToken,
}

/// Resolve the project, preferring locked versions, into a graph rooted at
/// the project itself.
pub async fn dependency_graph(
    project: &Project,
    opts: &TreeOptions,
) -> miette::Result<DependencyGraph> {
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

    let manifest = &project.manifest;
    let dev: BTreeSet<String> = manifest
        .require_dev
        .keys()
        .filter(|name| !manifest.require.contains_key(*name))
        .cloned()
        .collect();
    let root = ResolvedNode {
        name: manifest.package.name.clone(),
        version: manifest
            .package
            .version
            .clone()
            .unwrap_or_else(|| "unversioned".to_string()),
        installer_type: "project".to_string(),
    };
    Ok(DependencyGraph::from_resolution(root, &resolution, &dev))
}

/// Print the dependency tree for the project.
pub async fn tree(project: &Project, opts: &TreeOptions) -> miette::Result<()> {
    let graph = dependency_graph(project, opts).await?;
    if graph.is_empty() {
        println!("No dependencies.");
        return Ok(());
    }
    print!("{}", graph.print_tree(opts.depth));
    Ok(())
}

/// Print how the project comes to depend on `target`, then everything that
/// depends on it.
pub async fn why(project: &Project, target: &str, opts: &TreeOptions) -> miette::Result<()> {
    let graph = dependency_graph(project, opts).await?;
    let Some(path) = graph.find_path(target) else {
        println!("Package '{target}' is not in the dependency graph.");
        return Ok(());
    };

    println!("Path to {target}:");
    for (i, node) in path.iter().enumerate() {
        let indent = "  ".repeat(i);
        println!("{indent}{node}");
    }
    println!();
    println!("Required by:");
    print!("{}", graph.print_inverted_tree(target));
    Ok(())
}
