//! Installer handlers and their coordination.
//!
//! An installer handler decides where packages of one installer type go and
//! places them there. The [`registry::InstallerRegistry`] maps each type tag
//! to its active handler; the [`coordinator::Coordinator`] is the only way
//! to change that mapping once planning has started.

pub mod coordinator;
pub mod handler;
pub mod registry;
pub mod store;
