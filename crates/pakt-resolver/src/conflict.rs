//! Conflict explanations produced when resolution fails.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::index::PackageId;
use crate::resolver::Requirement;
use crate::version::Constraint;

/// Every incompatibility that made resolution fail, with the root
/// requirements the chains start from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<VersionConflict>,
    pub roots: Vec<Requirement>,
}

/// One package for which no acceptable version could be chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionConflict {
    pub package: String,
    pub reason: ConflictReason,
    /// The requirements that together rule out every candidate.
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConflictReason {
    /// No known version satisfies all requirements at once.
    NoMatchingVersion,
    /// No versions are known, or their metadata could not be fetched.
    Unavailable { detail: String },
    /// `declared_by` declares a conflict with `package constraint`.
    DeclaredConflict {
        declared_by: PackageId,
        package: String,
        constraint: Constraint,
    },
    /// The name is already taken by another chosen package.
    AlreadyProvided { by: PackageId },
    /// Every combination was tried without a more specific explanation.
    Exhausted,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a conflict unless an identical one is already recorded.
    pub fn add(&mut self, conflict: VersionConflict) {
        if !self.conflicts.contains(&conflict) {
            self.conflicts.push(conflict);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// Names of the root requirements involved in any conflict chain.
    pub fn root_names(&self) -> BTreeSet<&str> {
        self.conflicts
            .iter()
            .flat_map(|c| c.requirements.iter().map(|r| r.root.as_str()))
            .collect()
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::NoMatchingVersion => {
                write!(f, "no version satisfies all requirements")
            }
            ConflictReason::Unavailable { detail } => write!(f, "unavailable ({detail})"),
            ConflictReason::DeclaredConflict {
                declared_by,
                package,
                constraint,
            } => write!(f, "{declared_by} conflicts with {package} {constraint}"),
            ConflictReason::AlreadyProvided { by } => write!(f, "already provided by {by}"),
            ConflictReason::Exhausted => write!(f, "no combination of versions works"),
        }
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No version conflicts.");
        }
        writeln!(f, "Version conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  {c}")?;
            for req in &c.requirements {
                writeln!(f, "    {req}")?;
            }
        }
        if !self.roots.is_empty() {
            let roots: Vec<String> = self
                .roots
                .iter()
                .map(|r| format!("{} {}", r.name, r.constraint))
                .collect();
            write!(f, "Root requirements involved: {}", roots.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.package, self.reason)
    }
}
