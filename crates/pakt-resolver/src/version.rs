//! Version parsing, precedence, and constraint matching.
//!
//! Versions follow semantic-version precedence (backed by `semver`):
//! numeric segments compare numerically and a pre-release sorts before the
//! release it precedes. Missing segments are zero-padded, so `1.2` is `1.2.0`;
//! build metadata is discarded.
//!
//! Constraint syntax:
//! - `*`, `x` or an empty string: any version
//! - `1.2.3`, `=1.2`, `==1.2`: exact match
//! - `>=1.0`, `>1.0`, `<2.0`, `<=2.0`, `!=1.5`: comparisons
//! - `^1.2`, `~1.2.3`: compatible-release ranges
//! - `1.2.*`, `1.x`: wildcards
//! - `1.0 - 2.0`: inclusive hyphen range
//! - `>=1.0 <2.0`, `>=1.0, <2.0`: conjunction
//! - `^1.0 || ^2.0`: union

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use pakt_util::errors::PaktError;
use semver::{BuildMetadata, Prerelease};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Parse failure for a version or a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("invalid version '{input}': {reason}")]
    Version { input: String, reason: String },

    #[error("invalid constraint '{input}': {reason}")]
    Constraint { input: String, reason: String },
}

impl From<ConstraintError> for PaktError {
    fn from(err: ConstraintError) -> Self {
        match err {
            ConstraintError::Version { input, reason } => PaktError::InvalidConstraint {
                constraint: input,
                reason: format!("invalid version: {reason}"),
            },
            ConstraintError::Constraint { input, reason } => PaktError::InvalidConstraint {
                constraint: input,
                reason,
            },
        }
    }
}

/// A parsed package version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Version(semver::Version);

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version such as `1.2.3`, `v1.2`, or `2.0.0-beta.1`.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let partial = Partial::parse(input, input)?;
        if partial.wildcard {
            return Err(ConstraintError::Version {
                input: input.to_string(),
                reason: "wildcards are not allowed in a version".to_string(),
            });
        }
        Ok(partial.floor())
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    fn with_lowest_pre(major: u64, minor: u64, patch: u64) -> Self {
        let mut v = semver::Version::new(major, minor, patch);
        // "0" is the lowest possible pre-release identifier.
        v.pre = Prerelease::new("0").unwrap_or(Prerelease::EMPTY);
        Self(v)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<semver::Version> for Version {
    fn from(mut v: semver::Version) -> Self {
        v.build = BuildMetadata::EMPTY;
        Self(v)
    }
}

/// A version as written, before zero-padding: `1`, `1.2`, `1.2.*`.
struct Partial {
    parts: Vec<u64>,
    pre: Prerelease,
    wildcard: bool,
}

impl Partial {
    fn parse(text: &str, whole: &str) -> Result<Self, ConstraintError> {
        let err = |reason: &str| ConstraintError::Version {
            input: whole.to_string(),
            reason: reason.to_string(),
        };

        let s = text.trim();
        let s = s
            .strip_prefix('v')
            .or_else(|| s.strip_prefix('V'))
            .unwrap_or(s);
        let s = s.split_once('+').map_or(s, |(core, _build)| core);
        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (s, None),
        };
        if core.is_empty() {
            return Err(err("missing version number"));
        }

        let mut parts = Vec::new();
        let mut wildcard = false;
        for segment in core.split('.') {
            if wildcard {
                return Err(err("segments after a wildcard"));
            }
            match segment {
                "*" | "x" | "X" => wildcard = true,
                "" => return Err(err("empty segment")),
                _ => {
                    let n = segment
                        .parse::<u64>()
                        .map_err(|_| err(&format!("'{segment}' is not a number")))?;
                    parts.push(n);
                }
            }
        }
        if parts.len() > 3 {
            return Err(err("at most three numeric segments are supported"));
        }

        let pre = match pre {
            Some(_) if wildcard => return Err(err("pre-release on a wildcard version")),
            Some(p) => Prerelease::new(p).map_err(|e| err(&e.to_string()))?,
            None => Prerelease::EMPTY,
        };

        Ok(Self {
            parts,
            pre,
            wildcard,
        })
    }

    fn part(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }

    /// The smallest version this partial denotes.
    fn floor(&self) -> Version {
        let mut v = semver::Version::new(self.part(0), self.part(1), self.part(2));
        v.pre = self.pre.clone();
        Version(v)
    }

    /// Exclusive upper bound after bumping segment `index` (0 = major).
    fn bumped(&self, index: usize, whole: &str) -> Result<Version, ConstraintError> {
        let segment = index.min(2);
        let next = self
            .part(segment)
            .checked_add(1)
            .ok_or_else(|| constraint_err(whole, "version segment too large"))?;
        Ok(match segment {
            0 => Version::with_lowest_pre(next, 0, 0),
            1 => Version::with_lowest_pre(self.part(0), next, 0),
            _ => Version::with_lowest_pre(self.part(0), self.part(1), next),
        })
    }

    fn is_exact(&self) -> bool {
        !self.wildcard && self.parts.len() == 3
    }
}

/// Comparison operator of a single bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Op::Eq => ord == Ordering::Equal,
            Op::Ne => ord != Ordering::Equal,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
        }
    }
}

/// The normalized predicate behind a [`Constraint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    Any,
    Compare(Op, Version),
    All(Vec<Predicate>),
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Compare(op, bound) => op.accepts(version.cmp(bound)),
            Predicate::All(preds) => preds.iter().all(|p| p.matches(version)),
            Predicate::AnyOf(preds) => preds.iter().any(|p| p.matches(version)),
        }
    }

    fn all(preds: Vec<Predicate>) -> Predicate {
        let mut flat = Vec::new();
        for p in preds {
            match p {
                Predicate::Any => {}
                Predicate::All(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::Any,
            1 => flat.remove(0),
            _ => Predicate::All(flat),
        }
    }

    fn any_of(preds: Vec<Predicate>) -> Predicate {
        let mut flat = Vec::new();
        for p in preds {
            match p {
                Predicate::Any => return Predicate::Any,
                Predicate::AnyOf(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Predicate::AnyOf(flat)
        }
    }
}

/// A parsed version constraint. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    text: String,
    predicate: Predicate,
}

impl Constraint {
    /// Parse a constraint string. Fails on malformed syntax.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let text = input.trim().to_string();
        let mut branches = Vec::new();
        for branch in split_union(&text) {
            if branch.trim().is_empty() {
                if text.is_empty() {
                    branches.push(Predicate::Any);
                    continue;
                }
                return Err(constraint_err(input, "empty alternative in '||' union"));
            }
            branches.push(parse_conjunction(branch, input)?);
        }
        Ok(Self {
            text,
            predicate: Predicate::any_of(branches),
        })
    }

    /// The constraint matching every version.
    pub fn any() -> Self {
        Self {
            text: "*".to_string(),
            predicate: Predicate::Any,
        }
    }

    /// The constraint matching exactly `version`.
    pub fn exact(version: &Version) -> Self {
        Self {
            text: version.to_string(),
            predicate: Predicate::Compare(Op::Eq, version.clone()),
        }
    }

    /// Whether `version` satisfies this constraint.
    pub fn satisfies(&self, version: &Version) -> bool {
        self.predicate.matches(version)
    }

    pub fn is_any(&self) -> bool {
        self.predicate == Predicate::Any
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Free-function form of [`Constraint::satisfies`].
pub fn satisfies(constraint: &Constraint, version: &Version) -> bool {
    constraint.satisfies(version)
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&self.text)
        }
    }
}

impl FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn constraint_err(input: &str, reason: &str) -> ConstraintError {
    ConstraintError::Constraint {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Split on `||`, also accepting a single `|`.
fn split_union(text: &str) -> Vec<&str> {
    text.split("||")
        .flat_map(|part| part.split('|'))
        .collect()
}

fn parse_conjunction(branch: &str, whole: &str) -> Result<Predicate, ConstraintError> {
    let tokens = tokenize(branch, whole)?;

    if let [low, dash, high] = tokens.as_slice() {
        if dash == "-" {
            return hyphen_range(low, high, whole);
        }
    }
    if tokens.iter().any(|t| t == "-") {
        return Err(constraint_err(whole, "a hyphen range takes exactly two versions"));
    }

    let terms = tokens
        .iter()
        .map(|t| parse_term(t, whole))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Predicate::all(terms))
}

/// Split a conjunction on whitespace and commas, gluing a bare operator to
/// the version that follows it (`>= 1.0` becomes `>=1.0`).
fn tokenize(branch: &str, whole: &str) -> Result<Vec<String>, ConstraintError> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for raw in branch.split(|c: char| c.is_whitespace() || c == ',') {
        if raw.is_empty() {
            continue;
        }
        let is_bare_op = !raw.is_empty() && raw.chars().all(|c| "<>=!^~".contains(c));
        if is_bare_op {
            if pending_op.is_some() {
                return Err(constraint_err(whole, "two operators in a row"));
            }
            pending_op = Some(raw.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{op}{raw}")),
            None => tokens.push(raw.to_string()),
        }
    }
    if let Some(op) = pending_op {
        return Err(constraint_err(whole, &format!("operator '{op}' has no version")));
    }
    if tokens.is_empty() {
        return Err(constraint_err(whole, "empty constraint"));
    }
    Ok(tokens)
}

fn parse_term(token: &str, whole: &str) -> Result<Predicate, ConstraintError> {
    const OPS: [(&str, Option<Op>); 9] = [
        (">=", Some(Op::Ge)),
        ("<=", Some(Op::Le)),
        ("==", Some(Op::Eq)),
        ("!=", Some(Op::Ne)),
        (">", Some(Op::Gt)),
        ("<", Some(Op::Lt)),
        ("=", Some(Op::Eq)),
        ("^", None),
        ("~", None),
    ];

    if matches!(token, "*" | "x" | "X") {
        return Ok(Predicate::Any);
    }

    for (prefix, op) in OPS {
        let Some(rest) = token.strip_prefix(prefix) else {
            continue;
        };
        if rest.starts_with(|c: char| "<>=!^~".contains(c)) {
            return Err(constraint_err(whole, &format!("malformed operator in '{token}'")));
        }
        let partial = Partial::parse(rest, whole).map_err(|e| reword(e, whole))?;
        return match (prefix, op) {
            ("^", _) => caret(&partial, whole),
            ("~", _) => tilde(&partial, whole),
            (_, Some(_)) if partial.wildcard => Err(constraint_err(
                whole,
                "wildcards cannot be combined with a comparison operator",
            )),
            (_, Some(Op::Eq)) => exact_or_range(&partial, whole),
            (_, Some(op)) => Ok(Predicate::Compare(op, partial.floor())),
            _ => Err(constraint_err(whole, "unknown operator")),
        };
    }

    let partial = Partial::parse(token, whole).map_err(|e| reword(e, whole))?;
    exact_or_range(&partial, whole)
}

fn reword(err: ConstraintError, whole: &str) -> ConstraintError {
    match err {
        ConstraintError::Version { reason, .. } | ConstraintError::Constraint { reason, .. } => {
            constraint_err(whole, &reason)
        }
    }
}

/// A bare version: exact when fully given or padded, a range for wildcards.
fn exact_or_range(partial: &Partial, whole: &str) -> Result<Predicate, ConstraintError> {
    if partial.wildcard {
        if partial.parts.is_empty() {
            return Ok(Predicate::Any);
        }
        let ceiling = partial.bumped(partial.parts.len() - 1, whole)?;
        return Ok(range(partial.floor(), ceiling));
    }
    Ok(Predicate::Compare(Op::Eq, partial.floor()))
}

/// `^1.2.3` := `>=1.2.3 <2.0.0`; `^0.3` := `>=0.3.0 <0.4.0`; `^0.0.3` := `>=0.0.3 <0.0.4`.
fn caret(partial: &Partial, whole: &str) -> Result<Predicate, ConstraintError> {
    if partial.parts.is_empty() {
        return Ok(Predicate::Any);
    }
    let given = partial.parts.len();
    let index = partial.parts[..given]
        .iter()
        .position(|&n| n != 0)
        .unwrap_or(given - 1);
    Ok(range(partial.floor(), partial.bumped(index, whole)?))
}

/// `~1.2.3` := `>=1.2.3 <1.3.0`; `~1.2` := `>=1.2.0 <2.0.0`; `~1` := `>=1.0.0 <2.0.0`.
fn tilde(partial: &Partial, whole: &str) -> Result<Predicate, ConstraintError> {
    if partial.parts.is_empty() {
        return Ok(Predicate::Any);
    }
    let given = partial.parts.len();
    let index = if partial.wildcard || given == 1 {
        given - 1
    } else {
        given - 2
    };
    Ok(range(partial.floor(), partial.bumped(index, whole)?))
}

/// `1.0 - 2.0` := `>=1.0.0 <2.1.0`; `1.0 - 2.0.0` := `>=1.0.0 <=2.0.0`.
fn hyphen_range(low: &str, high: &str, whole: &str) -> Result<Predicate, ConstraintError> {
    let low = Partial::parse(low, whole).map_err(|e| reword(e, whole))?;
    let high = Partial::parse(high, whole).map_err(|e| reword(e, whole))?;
    if low.wildcard || high.wildcard {
        return Err(constraint_err(whole, "wildcards are not allowed in a hyphen range"));
    }
    let upper = if high.is_exact() {
        Predicate::Compare(Op::Le, high.floor())
    } else {
        Predicate::Compare(Op::Lt, high.bumped(high.parts.len() - 1, whole)?)
    };
    Ok(Predicate::all(vec![
        Predicate::Compare(Op::Ge, low.floor()),
        upper,
    ]))
}

fn range(floor: Version, ceiling: Version) -> Predicate {
    Predicate::All(vec![
        Predicate::Compare(Op::Ge, floor),
        Predicate::Compare(Op::Lt, ceiling),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> Constraint {
        Constraint::parse(s).unwrap()
    }

    #[test]
    fn three_part_ordering() {
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1.0"));
        assert!(v("1.9.0") < v("1.10.0"));
    }

    #[test]
    fn prerelease_before_release() {
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-beta") < v("1.0.0-rc.1"));
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
    }

    #[test]
    fn short_versions_are_padded() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("2"), v("2.0.0"));
        assert_eq!(v("v1.2.3"), v("1.2.3"));
        assert_eq!(v("1.2.3+build.7"), v("1.2.3"));
    }

    #[test]
    fn bad_versions() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.a").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("1.*").is_err());
    }

    #[test]
    fn comparison_boundaries() {
        assert!(c(">=1.0.0").satisfies(&v("1.0.0")));
        assert!(!c(">1.0.0").satisfies(&v("1.0.0")));
        assert!(c("<=2.0").satisfies(&v("2.0.0")));
        assert!(!c("<2.0").satisfies(&v("2.0.0")));
        assert!(c("!=1.5").satisfies(&v("1.4.0")));
        assert!(!c("!=1.5").satisfies(&v("1.5.0")));
    }

    #[test]
    fn wildcard_any() {
        for s in ["*", "", "x", "  "] {
            let any = c(s);
            assert!(any.is_any(), "{s:?}");
            assert!(any.satisfies(&v("0.0.1")));
            assert!(any.satisfies(&v("99.0.0-alpha")));
        }
    }

    #[test]
    fn exact_match() {
        assert!(c("1.0").satisfies(&v("1.0.0")));
        assert!(!c("1.0").satisfies(&v("1.0.1")));
        assert!(c("==2.3.0").satisfies(&v("2.3.0")));
    }

    #[test]
    fn caret_ranges() {
        assert!(c("^2.0").satisfies(&v("2.3.0")));
        assert!(!c("^2.0").satisfies(&v("1.9.0")));
        assert!(!c("^2.0").satisfies(&v("3.0.0")));
        assert!(!c("^2.0").satisfies(&v("3.0.0-alpha")));
        assert!(c("^0.3.1").satisfies(&v("0.3.9")));
        assert!(!c("^0.3.1").satisfies(&v("0.4.0")));
        assert!(!c("^0.0.3").satisfies(&v("0.0.4")));
    }

    #[test]
    fn tilde_ranges() {
        assert!(c("~1.2.3").satisfies(&v("1.2.9")));
        assert!(!c("~1.2.3").satisfies(&v("1.3.0")));
        assert!(c("~1.2").satisfies(&v("1.9.0")));
        assert!(!c("~1.2").satisfies(&v("2.0.0")));
    }

    #[test]
    fn wildcard_ranges() {
        assert!(c("1.2.*").satisfies(&v("1.2.7")));
        assert!(!c("1.2.*").satisfies(&v("1.3.0")));
        assert!(c("1.x").satisfies(&v("1.99.0")));
        assert!(!c("1.x").satisfies(&v("2.0.0")));
    }

    #[test]
    fn conjunction_and_union() {
        let range = c(">=1.0 <2.0");
        assert!(range.satisfies(&v("1.5.0")));
        assert!(!range.satisfies(&v("2.0.0")));
        assert_eq!(range.predicate(), c(">=1.0, <2.0").predicate());
        assert_eq!(range.predicate(), c(">= 1.0 < 2.0").predicate());

        let union = c("^1.0 || ^3.0");
        assert!(union.satisfies(&v("1.2.0")));
        assert!(!union.satisfies(&v("2.0.0")));
        assert!(union.satisfies(&v("3.1.0")));
        assert_eq!(union.predicate(), c("^1.0 | ^3.0").predicate());
    }

    #[test]
    fn hyphen_ranges() {
        let partial = c("1.0 - 2.0");
        assert!(partial.satisfies(&v("2.0.5")));
        assert!(!partial.satisfies(&v("2.1.0")));
        let full = c("1.0.0 - 2.0.0");
        assert!(full.satisfies(&v("2.0.0")));
        assert!(!full.satisfies(&v("2.0.1")));
    }

    #[test]
    fn normalization_flattens() {
        assert_eq!(c("* >=1.0").predicate(), c(">=1.0").predicate());
        assert_eq!(c("^1.0 || *").predicate(), &Predicate::Any);
    }

    #[test]
    fn parse_is_deterministic() {
        for s in ["^1.2", ">=1.0 <2.0 || 3.*", "~0.1", "1.0 - 2.0", "*"] {
            assert_eq!(c(s), c(s));
        }
    }

    #[test]
    fn malformed_constraints() {
        for s in [">=", ">=>1.0", "1.0 ||", "|| 1.0", "^abc", ">=1.*", "1.0 - ", "1 - 2 - 3", "=> 1"] {
            assert!(Constraint::parse(s).is_err(), "{s:?} should fail");
        }
    }

    #[test]
    fn upper_bound_past_the_largest_segment_is_rejected() {
        for s in [
            "^18446744073709551615",
            "18446744073709551615.*",
            "~18446744073709551615.2",
            "1.0 - 2.18446744073709551615",
            "^0.0.18446744073709551615",
        ] {
            let err = Constraint::parse(s).unwrap_err();
            assert!(
                err.to_string().contains("version segment too large"),
                "{s:?}: {err}"
            );
        }
        assert!(c("18446744073709551615.0.0").satisfies(&Version::new(u64::MAX, 0, 0)));
        assert!(c(">=18446744073709551615").satisfies(&Version::new(u64::MAX, 1, 0)));
    }

    #[test]
    fn display_keeps_source_text() {
        assert_eq!(c("  ^1.2 ").to_string(), "^1.2");
        assert_eq!(Constraint::any().to_string(), "*");
        assert_eq!(Constraint::exact(&v("1.2.3")).to_string(), "1.2.3");
    }
}
