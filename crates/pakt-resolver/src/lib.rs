//! Dependency resolution engine: version constraints, the repository index
//! and its metadata sources, backtracking resolution, conflict reporting and
//! the resolved dependency graph.

pub mod conflict;
pub mod graph;
pub mod index;
pub mod resolver;
pub mod source;
pub mod version;
