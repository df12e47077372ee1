//! Core data types for the pakt package orchestrator.
//!
//! This crate defines the on-disk formats a pakt project is made of: the
//! `pakt.toml` manifest, package metadata files served by a repository, the
//! `pakt.lock` lockfile, and the user's global configuration.
//!
//! This crate is intentionally free of async code and of resolution logic;
//! constraint strings are carried verbatim and parsed by `pakt-resolver`.

/// File name of the project manifest.
pub const MANIFEST_FILE: &str = "pakt.toml";

/// File name of the lockfile written next to the manifest.
pub const LOCK_FILE: &str = "pakt.lock";

pub mod config;
pub mod lockfile;
pub mod manifest;
pub mod metadata;
