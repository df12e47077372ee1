//! Shared utilities for the pakt package orchestrator.
//!
//! This crate provides cross-cutting concerns used by all other pakt crates:
//! the unified error type, filesystem helpers, content hashing, and terminal
//! status output.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod progress;
