//! Backtracking dependency resolution.
//!
//! The search keeps an explicit stack of choice points. Each one holds the
//! state it was opened from, the package name being decided and the viable
//! candidates in preference order (locked version first, then newest
//! first). Taking a candidate clones the state, assigns every name the
//! candidate answers to and merges its requirements; a merge that leaves
//! some required name without a viable candidate rejects the candidate on
//! the spot. When a choice point runs out of candidates it is popped and
//! its parent tries its next one. Popping the last choice point ends the
//! search with a [`ConflictReport`].
//!
//! Every recorded failure carries the names of the chosen packages it
//! depends on. A choice point keeps the failures of its own candidates and
//! of the subtrees below them. When an exhausted subtree's failures do not
//! depend on the parent's current candidate, no other candidate of the
//! parent can help: the parent is skipped and the failures move up
//! unchanged. Failures of branches that were abandoned for a working
//! alternative are dropped along with that alternative's choice point.
//!
//! The next name to decide is the open name with the fewest viable
//! candidates, ties broken by name, so identical inputs always explore the
//! same tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pakt_util::errors::PaktError;
use serde::Serialize;
use thiserror::Error;

use crate::conflict::{ConflictReason, ConflictReport, VersionConflict};
use crate::index::{Link, PackageId, PackageVersion, RepositoryIndex};
use crate::version::{Constraint, ConstraintError, Version};

/// A constraint on a package name and the chain of packages that imposed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub name: String,
    pub constraint: Constraint,
    /// Packages whose dependencies led here, outermost first. Empty for a
    /// root requirement.
    pub via: Vec<PackageId>,
    /// Name of the root requirement this chain starts from.
    #[serde(skip)]
    pub root: String,
}

impl Requirement {
    pub fn root(name: impl Into<String>, constraint: Constraint) -> Self {
        let name = name.into();
        Self {
            root: name.clone(),
            name,
            constraint,
            via: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.via.is_empty()
    }

    fn child(&self, parent: &PackageVersion, link: &Link) -> Self {
        let mut via = self.via.clone();
        via.push(parent.id());
        Self {
            name: link.name.clone(),
            constraint: link.constraint.clone(),
            via,
            root: self.root.clone(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.via.is_empty() {
            return write!(f, "root requires {} {}", self.name, self.constraint);
        }
        let chain: Vec<String> = self.via.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} requires {} {}",
            chain.join(" -> "),
            self.name,
            self.constraint
        )
    }
}

/// Parse a name → constraint-string map into root constraints.
pub fn parse_requirements(
    raw: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Constraint>, ConstraintError> {
    raw.iter()
        .map(|(name, c)| Ok((name.clone(), Constraint::parse(c)?)))
        .collect()
}

/// Cooperative cancellation flag, checked at every choice-point iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0}")]
    Conflict(ConflictReport),

    #[error("resolution was cancelled")]
    Cancelled,
}

impl From<ResolveError> for PaktError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Conflict(report) => PaktError::Resolution {
                message: report.to_string(),
            },
            ResolveError::Cancelled => PaktError::Cancelled,
        }
    }
}

/// Partial assignment explored by the search.
///
/// Every name a chosen package answers to (its own, and what it provides or
/// replaces) maps to that package. `imposed` keeps every requirement seen so
/// far; a name is open while it is required but not assigned.
#[derive(Debug, Clone, Default)]
pub struct ResolutionState {
    assigned: BTreeMap<String, Arc<PackageVersion>>,
    imposed: BTreeMap<String, Vec<Requirement>>,
}

impl ResolutionState {
    pub fn assigned(&self, name: &str) -> Option<&Arc<PackageVersion>> {
        self.assigned.get(name)
    }

    pub fn requirements_on(&self, name: &str) -> &[Requirement] {
        self.imposed.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Required names without an assignment, in name order.
    pub fn open_names(&self) -> impl Iterator<Item = &str> {
        self.imposed
            .keys()
            .filter(|name| !self.assigned.contains_key(*name))
            .map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.open_names().next().is_none()
    }

    /// Distinct chosen packages, in name order.
    fn chosen(&self) -> impl Iterator<Item = &Arc<PackageVersion>> {
        self.assigned
            .iter()
            .filter(|(name, pkg)| **name == pkg.name)
            .map(|(_, pkg)| pkg)
    }
}

/// A complete, consistent assignment of one version per required package.
#[derive(Debug, Clone)]
pub struct Resolution {
    packages: BTreeMap<String, Arc<PackageVersion>>,
    /// Requested name (possibly virtual) to the chosen package's name.
    aliases: BTreeMap<String, String>,
    roots: Vec<String>,
}

impl Resolution {
    fn from_state(state: ResolutionState, roots: &BTreeMap<String, Constraint>) -> Self {
        let mut packages = BTreeMap::new();
        let mut aliases = BTreeMap::new();
        for (name, pkg) in state.assigned {
            aliases.insert(name, pkg.name.clone());
            packages.insert(pkg.name.clone(), pkg);
        }
        Self {
            packages,
            aliases,
            roots: roots.keys().cloned().collect(),
        }
    }

    /// Chosen packages, in name order.
    pub fn packages(&self) -> impl Iterator<Item = &Arc<PackageVersion>> {
        self.packages.values()
    }

    /// The package chosen for `name`, following provides and replaces.
    pub fn get(&self, name: &str) -> Option<&Arc<PackageVersion>> {
        let real = self.aliases.get(name)?;
        self.packages.get(real)
    }

    /// Chosen packages that `package` directly depends on, in declaration order.
    pub fn dependencies_of(&self, package: &PackageVersion) -> Vec<&Arc<PackageVersion>> {
        let mut seen = BTreeSet::new();
        package
            .requires
            .iter()
            .filter_map(|link| self.get(&link.name))
            .filter(|dep| dep.name != package.name && seen.insert(dep.name.clone()))
            .collect()
    }

    /// Packages chosen for the root requirements.
    pub fn roots(&self) -> Vec<&Arc<PackageVersion>> {
        let mut seen = BTreeSet::new();
        self.roots
            .iter()
            .filter_map(|name| self.get(name))
            .filter(|pkg| seen.insert(pkg.name.clone()))
            .collect()
    }

    pub fn ids(&self) -> Vec<PackageId> {
        self.packages.values().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Versions to try first, typically from the lockfile.
    pub preferred: BTreeMap<String, Version>,
    pub cancel: CancelToken,
}

struct ChoicePoint {
    base: ResolutionState,
    name: String,
    candidates: Vec<Arc<PackageVersion>>,
    next: usize,
    failures: Failures,
}

impl ChoicePoint {
    fn current(&self) -> Option<&Arc<PackageVersion>> {
        self.next.checked_sub(1).and_then(|i| self.candidates.get(i))
    }
}

/// Why a candidate cannot be taken in a given state.
enum Rejection {
    Unsatisfied,
    Taken(PackageId),
    Conflict {
        declared_by: PackageId,
        chosen: PackageId,
        link: Link,
    },
}

/// Incompatibilities recorded below one choice point. Hard ones hold
/// regardless of which version was chosen for the blamed packages and are
/// listed first.
#[derive(Default)]
struct Failures {
    hard: ConflictReport,
    soft: ConflictReport,
    /// Names of the chosen packages the failures depend on.
    culprits: BTreeSet<String>,
}

impl Failures {
    fn merge(&mut self, other: Failures) {
        for conflict in other.hard.conflicts {
            self.hard.add(conflict);
        }
        for conflict in other.soft.conflicts {
            self.soft.add(conflict);
        }
        self.culprits.extend(other.culprits);
    }

    fn is_empty(&self) -> bool {
        self.hard.is_empty() && self.soft.is_empty()
    }

    /// Whether choosing another version of `package` could avoid these
    /// failures. An empty record is assumed to depend on everything.
    fn depends_on(&self, package: &str) -> bool {
        self.is_empty() || self.culprits.contains(package)
    }

    fn into_report(self, roots: &BTreeMap<String, Constraint>) -> ConflictReport {
        let mut report = self.hard;
        for conflict in self.soft.conflicts {
            report.add(conflict);
        }
        if report.is_empty() {
            for (name, constraint) in roots {
                report.add(VersionConflict {
                    package: name.clone(),
                    reason: ConflictReason::Exhausted,
                    requirements: vec![Requirement::root(name.clone(), constraint.clone())],
                });
            }
        }

        let involved: BTreeSet<String> =
            report.root_names().into_iter().map(str::to_string).collect();
        report.roots = roots
            .iter()
            .filter(|(name, _)| involved.contains(*name))
            .map(|(name, c)| Requirement::root(name.clone(), c.clone()))
            .collect();
        report
    }
}

pub struct Resolver<'a> {
    index: &'a RepositoryIndex,
    options: ResolverOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a RepositoryIndex, options: ResolverOptions) -> Self {
        Self { index, options }
    }

    pub fn resolve(
        &self,
        roots: &BTreeMap<String, Constraint>,
    ) -> Result<Resolution, ResolveError> {
        let mut state = ResolutionState::default();
        for (name, constraint) in roots {
            state
                .imposed
                .entry(name.clone())
                .or_default()
                .push(Requirement::root(name.clone(), constraint.clone()));
        }

        let mut stack: Vec<ChoicePoint> = Vec::new();

        loop {
            self.check_cancelled()?;
            let Some((name, candidates)) = self.select(&state) else {
                tracing::debug!("resolved {} name(s)", state.assigned.len());
                return Ok(Resolution::from_state(state, roots));
            };
            let failures = if candidates.is_empty() {
                self.explain(&state, &name)
            } else {
                tracing::debug!(
                    package = %name,
                    candidates = candidates.len(),
                    depth = stack.len(),
                    "choice point"
                );
                Failures::default()
            };
            stack.push(ChoicePoint {
                base: state,
                name,
                candidates,
                next: 0,
                failures,
            });
            state = self.advance(&mut stack, roots)?;
        }
    }

    fn check_cancelled(&self) -> Result<(), ResolveError> {
        if self.options.cancel.is_cancelled() {
            tracing::debug!("resolution cancelled");
            return Err(ResolveError::Cancelled);
        }
        Ok(())
    }

    /// Take the next candidate of the innermost choice point that accepts one.
    fn advance(
        &self,
        stack: &mut Vec<ChoicePoint>,
        roots: &BTreeMap<String, Constraint>,
    ) -> Result<ResolutionState, ResolveError> {
        let mut failures = Failures::default();
        while let Some(point) = stack.last_mut() {
            self.check_cancelled()?;
            let Some(candidate) = point.candidates.get(point.next).cloned() else {
                let Some(exhausted) = stack.pop() else {
                    break;
                };
                tracing::debug!(package = %exhausted.name, "backtracking");
                failures = exhausted.failures;
                let Some(parent) = stack.last_mut() else {
                    break;
                };
                let relevant = parent
                    .current()
                    .map_or(true, |chosen| failures.depends_on(&chosen.name));
                if relevant {
                    parent.failures.merge(std::mem::take(&mut failures));
                } else {
                    tracing::debug!(package = %parent.name, "backjumping");
                    parent.failures = std::mem::take(&mut failures);
                    parent.next = parent.candidates.len();
                }
                continue;
            };
            point.next += 1;
            tracing::trace!(package = %point.name, candidate = %candidate, "trying");
            match self.apply(&point.base, &point.name, &candidate) {
                Ok(state) => return Ok(state),
                Err(rejected) => point.failures.merge(rejected),
            }
        }
        Err(ResolveError::Conflict(failures.into_report(roots)))
    }

    /// The open name with the fewest viable candidates, and those candidates
    /// in preference order.
    fn select(&self, state: &ResolutionState) -> Option<(String, Vec<Arc<PackageVersion>>)> {
        let mut best: Option<(&str, Vec<Arc<PackageVersion>>)> = None;
        for name in state.open_names() {
            let candidates = self.viable(state, name);
            if best.as_ref().map_or(true, |(_, b)| candidates.len() < b.len()) {
                let empty = candidates.is_empty();
                best = Some((name, candidates));
                if empty {
                    break;
                }
            }
        }
        best.map(|(name, candidates)| (name.to_string(), self.prefer(name, candidates)))
    }

    fn prefer(&self, name: &str, mut candidates: Vec<Arc<PackageVersion>>) -> Vec<Arc<PackageVersion>> {
        if let Some(locked) = self.options.preferred.get(name) {
            if let Some(pos) = candidates
                .iter()
                .position(|c| c.name == name && &c.version == locked)
            {
                let c = candidates.remove(pos);
                candidates.insert(0, c);
            }
        }
        candidates
    }

    fn viable(&self, state: &ResolutionState, name: &str) -> Vec<Arc<PackageVersion>> {
        self.index
            .candidates(name)
            .into_iter()
            .filter(|c| self.rejection(state, c).is_none())
            .collect()
    }

    fn rejection(&self, state: &ResolutionState, candidate: &PackageVersion) -> Option<Rejection> {
        let id = candidate.id();
        for answered in candidate.answers_to() {
            if let Some(existing) = state.assigned(answered) {
                if existing.id() != id {
                    return Some(Rejection::Taken(existing.id()));
                }
            }
            let Some(version) = candidate.version_as(answered) else {
                continue;
            };
            if !state
                .requirements_on(answered)
                .iter()
                .all(|r| r.constraint.satisfies(version))
            {
                return Some(Rejection::Unsatisfied);
            }
        }

        for chosen in state.chosen() {
            if chosen.id() == id {
                continue;
            }
            if let Some(link) = conflicting_link(chosen, candidate) {
                return Some(Rejection::Conflict {
                    declared_by: chosen.id(),
                    chosen: chosen.id(),
                    link: link.clone(),
                });
            }
            if let Some(link) = conflicting_link(candidate, chosen) {
                return Some(Rejection::Conflict {
                    declared_by: id,
                    chosen: chosen.id(),
                    link: link.clone(),
                });
            }
        }
        None
    }

    /// Assign `candidate` for `name` on a copy of `base` and merge its
    /// requirements. Fails if the merge leaves a required name without a
    /// viable candidate.
    fn apply(
        &self,
        base: &ResolutionState,
        name: &str,
        candidate: &Arc<PackageVersion>,
    ) -> Result<ResolutionState, Failures> {
        let mut state = base.clone();
        let parent = base
            .requirements_on(name)
            .first()
            .cloned()
            .unwrap_or_else(|| Requirement::root(name, Constraint::any()));

        for answered in candidate.answers_to() {
            state
                .assigned
                .insert(answered.to_string(), Arc::clone(candidate));
        }

        let mut touched = BTreeSet::new();
        for link in &candidate.requires {
            state
                .imposed
                .entry(link.name.clone())
                .or_default()
                .push(parent.child(candidate, link));
            touched.insert(link.name.as_str());
        }

        for dep in touched {
            let consistent = match state.assigned(dep) {
                Some(existing) => existing.version_as(dep).is_some_and(|v| {
                    state
                        .requirements_on(dep)
                        .iter()
                        .all(|r| r.constraint.satisfies(v))
                }),
                None => !self.viable(&state, dep).is_empty(),
            };
            if !consistent {
                tracing::trace!(candidate = %candidate, package = dep, "contradiction");
                return Err(self.explain(&state, dep));
            }
        }
        Ok(state)
    }

    /// Chosen packages that rule out some candidate for `name`: those whose
    /// dependencies imposed a constraint, those holding a name a candidate
    /// answers to, and those in a declared conflict with a candidate.
    fn blame(&self, state: &ResolutionState, name: &str) -> BTreeSet<String> {
        let mut culprits = BTreeSet::new();
        let add_chains = |culprits: &mut BTreeSet<String>, target: &str| {
            for req in state.requirements_on(target) {
                culprits.extend(req.via.iter().map(|id| id.name.clone()));
            }
        };
        add_chains(&mut culprits, name);
        for candidate in self.index.candidates(name) {
            let id = candidate.id();
            for answered in candidate.answers_to() {
                if let Some(existing) = state.assigned(answered) {
                    if existing.id() != id {
                        culprits.insert(existing.name.clone());
                    }
                }
                add_chains(&mut culprits, answered);
            }
            for chosen in state.chosen() {
                if conflicting_link(chosen, &candidate).is_some()
                    || conflicting_link(&candidate, chosen).is_some()
                {
                    culprits.insert(chosen.name.clone());
                }
            }
        }
        culprits
    }

    /// Why `name` has no viable candidate in `state`.
    fn explain(&self, state: &ResolutionState, name: &str) -> Failures {
        let mut failures = Failures {
            culprits: self.blame(state, name),
            ..Failures::default()
        };
        let requirements = state.requirements_on(name);
        let all = self.index.candidates(name);

        if all.is_empty() {
            let detail = self
                .index
                .unavailable_reason(name)
                .map(str::to_string)
                .unwrap_or_else(|| format!("no versions of '{name}' are known"));
            failures.hard.add(VersionConflict {
                package: name.to_string(),
                reason: ConflictReason::Unavailable { detail },
                requirements: requirements.iter().take(1).cloned().collect(),
            });
            return failures;
        }

        let fits = |set: &[&Requirement]| {
            all.iter().any(|c| {
                c.version_as(name)
                    .is_some_and(|v| set.iter().all(|r| r.constraint.satisfies(v)))
            })
        };

        let mut kept: Vec<&Requirement> = requirements.iter().collect();
        if fits(&kept) {
            self.explain_choice(state, name, &all, &mut failures);
            return failures;
        }

        // Drop requirements one at a time while the rest still rule out
        // every candidate.
        let mut i = 0;
        while i < kept.len() {
            let mut trial = kept.clone();
            trial.remove(i);
            if fits(&trial) {
                i += 1;
            } else {
                kept = trial;
            }
        }
        failures.hard.add(VersionConflict {
            package: name.to_string(),
            reason: ConflictReason::NoMatchingVersion,
            requirements: kept.into_iter().cloned().collect(),
        });
        failures
    }

    /// Some version fits every constraint on `name`; it was ruled out by an
    /// earlier choice.
    fn explain_choice(
        &self,
        state: &ResolutionState,
        name: &str,
        all: &[Arc<PackageVersion>],
        failures: &mut Failures,
    ) {
        let requirements = state.requirements_on(name);
        for candidate in all {
            let conflict = match self.rejection(state, candidate) {
                Some(Rejection::Conflict {
                    declared_by,
                    chosen,
                    link,
                }) => {
                    let mut reqs = requirements.to_vec();
                    reqs.extend(state.requirements_on(&chosen.name).iter().take(1).cloned());
                    VersionConflict {
                        package: name.to_string(),
                        reason: ConflictReason::DeclaredConflict {
                            declared_by,
                            package: link.name,
                            constraint: link.constraint,
                        },
                        requirements: reqs,
                    }
                }
                Some(Rejection::Taken(by)) => {
                    let mut reqs = requirements.to_vec();
                    reqs.extend(state.requirements_on(&by.name).iter().take(1).cloned());
                    VersionConflict {
                        package: name.to_string(),
                        reason: ConflictReason::AlreadyProvided { by },
                        requirements: reqs,
                    }
                }
                Some(Rejection::Unsatisfied) | None => continue,
            };
            failures.soft.add(conflict);
            return;
        }
    }
}

/// The link in `declarer.conflicts` that rules out `other`, if any.
fn conflicting_link<'p>(declarer: &'p PackageVersion, other: &PackageVersion) -> Option<&'p Link> {
    declarer.conflicts.iter().find(|link| {
        other
            .version_as(&link.name)
            .is_some_and(|v| link.constraint.satisfies(v))
    })
}

/// Resolve `roots` against `index` with default options.
pub fn resolve(
    index: &RepositoryIndex,
    roots: &BTreeMap<String, Constraint>,
) -> Result<Resolution, ResolveError> {
    Resolver::new(index, ResolverOptions::default()).resolve(roots)
}
