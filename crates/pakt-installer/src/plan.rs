//! Turning a resolution into an ordered install plan.
//!
//! Ordering rules, in priority order:
//!
//! 1. Packages recorded in the lockfile but absent from the resolution are
//!    removed first, dependents before their dependencies.
//! 2. Installer plugins and everything they depend on are installed next, in
//!    dependency order. Each plugin is followed by one activate step per
//!    installer type it declares.
//! 3. The remaining packages are grouped by installer type. Groups are
//!    ordered so that a group comes after every group it depends on; inside
//!    a group packages keep the global dependency order. When the groups
//!    themselves depend on each other in a cycle, grouping is skipped and
//!    the global dependency order is used as is.
//!
//! A package whose version changes gets a remove step immediately followed
//! by its install step, and so does a package whose install path moves
//! because another installer now handles its type. Packages already
//! installed at the chosen version and path get no step at all. Ties are
//! always broken by package name.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use pakt_core::lockfile::{LockedPackage, Lockfile};
use pakt_resolver::index::PackageVersion;
use pakt_resolver::resolver::Resolution;
use pakt_resolver::version::Version;
use pakt_util::errors::PaktError;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use thiserror::Error;

/// The resolved graph contains a dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle between {}", .cycle.join(", "))]
pub struct CyclicDependencyError {
    /// Names of the packages on the cycle, sorted.
    pub cycle: Vec<String>,
}

impl From<CyclicDependencyError> for PaktError {
    fn from(err: CyclicDependencyError) -> Self {
        PaktError::Plan {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Install {
        name: String,
        version: Version,
        installer_type: String,
        #[serde(skip)]
        package: Arc<PackageVersion>,
    },
    Remove {
        name: String,
        version: String,
        installer_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        install_path: Option<PathBuf>,
    },
    ActivateInstaller {
        package: String,
        installer_type: String,
        path_template: String,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Install { name, version, .. } => write!(f, "install {name}@{version}"),
            Step::Remove { name, version, .. } => write!(f, "remove {name}@{version}"),
            Step::ActivateInstaller {
                package,
                installer_type,
                ..
            } => write!(f, "activate {package} for {installer_type}"),
        }
    }
}

/// Ordered steps to bring the project in line with a resolution.
///
/// Not `Clone`: a plan is consumed by executing it.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    /// Every resolved package as `name@version`, sorted by name.
    pub packages: Vec<String>,
    pub steps: Vec<Step>,
}

impl InstallPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

/// Dependency order over a set of named nodes, backed by petgraph.
struct OrderGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl OrderGraph {
    /// Nodes are added in name order so node indices are stable.
    fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let names: BTreeSet<&str> = names.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for name in names {
            indices.insert(name.to_string(), graph.add_node(name.to_string()));
        }
        Self { graph, indices }
    }

    /// `dependent` must come after `dependency`. Unknown names and
    /// self-edges are ignored.
    fn add_dependency(&mut self, dependency: &str, dependent: &str) {
        if dependency == dependent {
            return;
        }
        if let (Some(&from), Some(&to)) =
            (self.indices.get(dependency), self.indices.get(dependent))
        {
            if self.graph.find_edge(from, to).is_none() {
                self.graph.add_edge(from, to, ());
            }
        }
    }

    /// Kahn's algorithm, always releasing the smallest ready name first.
    fn order(&self) -> Result<Vec<String>, CyclicDependencyError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let deg = self.graph.neighbors_directed(idx, Direction::Incoming).count();
                (idx, deg)
            })
            .collect();
        let mut ready: BTreeSet<(String, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(idx, _)| (self.graph[*idx].clone(), *idx))
            .collect();

        let mut ordered = Vec::with_capacity(self.graph.node_count());
        while let Some((name, idx)) = ready.pop_first() {
            ordered.push(name);
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((self.graph[next].clone(), next));
                    }
                }
            }
        }

        if ordered.len() == self.graph.node_count() {
            return Ok(ordered);
        }
        let mut cycle: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .flatten()
            .map(|idx| self.graph[idx].clone())
            .collect();
        cycle.sort();
        Err(CyclicDependencyError { cycle })
    }
}

/// Build the plan that moves the project from `current` to `resolution`.
///
/// Pure: reads nothing from disk and writes nothing.
pub fn plan(
    resolution: &Resolution,
    current: Option<&Lockfile>,
) -> Result<InstallPlan, CyclicDependencyError> {
    plan_with_paths(resolution, current, |_| None)
}

/// Like [`plan`], also moving unchanged packages whose locked install path
/// differs from `install_path`, the path the installer active once the
/// plan's plugins are activated will use. `None` keeps the locked path.
pub fn plan_with_paths<F>(
    resolution: &Resolution,
    current: Option<&Lockfile>,
    install_path: F,
) -> Result<InstallPlan, CyclicDependencyError>
where
    F: Fn(&PackageVersion) -> Option<PathBuf>,
{
    let packages: BTreeMap<&str, &Arc<PackageVersion>> = resolution
        .packages()
        .map(|p| (p.name.as_str(), p))
        .collect();

    let mut graph = OrderGraph::new(packages.keys().copied());
    for pkg in packages.values() {
        for dep in resolution.dependencies_of(pkg) {
            graph.add_dependency(&dep.name, &pkg.name);
        }
    }
    let order = graph.order()?;

    let locked: BTreeMap<&str, &LockedPackage> = current
        .map(|lock| lock.package.iter().map(|p| (p.name.as_str(), p)).collect())
        .unwrap_or_default();

    let mut steps = removals(&locked, &packages);

    // Plugins and their dependency closure go first.
    let mut early: BTreeSet<&str> = BTreeSet::new();
    let mut stack: Vec<&str> = packages
        .values()
        .filter(|p| p.is_installer_plugin())
        .map(|p| p.name.as_str())
        .collect();
    while let Some(name) = stack.pop() {
        if !early.insert(name) {
            continue;
        }
        if let Some(pkg) = packages.get(name) {
            stack.extend(
                resolution
                    .dependencies_of(pkg)
                    .into_iter()
                    .map(|d| d.name.as_str()),
            );
        }
    }

    for name in order.iter().filter(|n| early.contains(n.as_str())) {
        let Some(pkg) = packages.get(name.as_str()) else {
            continue;
        };
        let expected = install_path(pkg);
        push_install(&mut steps, pkg, locked.get(name.as_str()).copied(), expected);
        if let Some(spec) = &pkg.installer {
            for tag in &spec.types {
                steps.push(Step::ActivateInstaller {
                    package: pkg.name.clone(),
                    installer_type: tag.clone(),
                    path_template: spec.path_template.clone(),
                });
            }
        }
    }

    let rest: Vec<&str> = order
        .iter()
        .map(String::as_str)
        .filter(|n| !early.contains(n))
        .collect();
    for name in group_by_type(&rest, &packages, resolution) {
        if let Some(pkg) = packages.get(name) {
            push_install(&mut steps, pkg, locked.get(name).copied(), install_path(pkg));
        }
    }

    let plan = InstallPlan {
        packages: packages.values().map(|p| p.id().to_string()).collect(),
        steps,
    };
    tracing::debug!("planned {} step(s) for {} package(s)", plan.len(), plan.packages.len());
    Ok(plan)
}

/// Remove steps for locked packages that left the resolution, dependents
/// first.
fn removals(
    locked: &BTreeMap<&str, &LockedPackage>,
    packages: &BTreeMap<&str, &Arc<PackageVersion>>,
) -> Vec<Step> {
    let gone: Vec<&&LockedPackage> = locked
        .values()
        .filter(|l| !packages.contains_key(l.name.as_str()))
        .collect();

    let mut graph = OrderGraph::new(gone.iter().map(|l| l.name.as_str()));
    for l in &gone {
        for dep in &l.dependencies {
            graph.add_dependency(dep, &l.name);
        }
    }
    // A cycle among installed packages must not block their removal.
    let mut order = graph
        .order()
        .unwrap_or_else(|_| gone.iter().map(|l| l.name.clone()).collect());
    order.reverse();

    order
        .iter()
        .filter_map(|name| locked.get(name.as_str()))
        .map(|l| remove_step(l))
        .collect()
}

fn remove_step(locked: &LockedPackage) -> Step {
    Step::Remove {
        name: locked.name.clone(),
        version: locked.version.clone(),
        installer_type: locked.installer_type.clone(),
        install_path: locked.install_path.as_ref().map(PathBuf::from),
    }
}

fn push_install(
    steps: &mut Vec<Step>,
    pkg: &Arc<PackageVersion>,
    locked: Option<&LockedPackage>,
    expected: Option<PathBuf>,
) {
    if let Some(l) = locked {
        let same_version = Version::parse(&l.version).is_ok_and(|v| v == pkg.version);
        let same_path = match (&l.install_path, expected) {
            (Some(recorded), Some(expected)) => {
                *recorded == expected.to_string_lossy().replace('\\', "/")
            }
            _ => true,
        };
        if same_version && l.installer_type == pkg.installer_type && same_path {
            return;
        }
        if same_version && !same_path {
            tracing::debug!("{} moves to a new install path", pkg.id());
        }
        steps.push(remove_step(l));
    }
    steps.push(Step::Install {
        name: pkg.name.clone(),
        version: pkg.version.clone(),
        installer_type: pkg.installer_type.clone(),
        package: Arc::clone(pkg),
    });
}

/// Reorder `names` (already in dependency order) into installer-type
/// groups, or return them unchanged if the groups depend on each other
/// cyclically.
fn group_by_type<'a>(
    names: &[&'a str],
    packages: &BTreeMap<&str, &Arc<PackageVersion>>,
    resolution: &Resolution,
) -> Vec<&'a str> {
    let type_of = |name: &str| packages.get(name).map(|p| p.installer_type.as_str());
    let tags: BTreeSet<&str> = names.iter().filter_map(|n| type_of(*n)).collect();

    let mut groups = OrderGraph::new(tags.iter().copied());
    for name in names {
        let (Some(pkg), Some(tag)) = (packages.get(*name), type_of(*name)) else {
            continue;
        };
        for dep in resolution.dependencies_of(pkg) {
            if names.contains(&dep.name.as_str()) {
                groups.add_dependency(&dep.installer_type, tag);
            }
        }
    }

    match groups.order() {
        Ok(group_order) => group_order
            .iter()
            .flat_map(|tag| {
                names
                    .iter()
                    .copied()
                    .filter(move |n| type_of(*n) == Some(tag.as_str()))
            })
            .collect(),
        Err(e) => {
            tracing::debug!("installer types depend on each other ({e}); not grouping");
            names.to_vec()
        }
    }
}
