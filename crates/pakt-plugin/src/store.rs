//! Durable storage for the set of installer types disabled for generic
//! handlers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use pakt_core::manifest::{write_installer_disable, InstallerDisable, Manifest};

use crate::coordinator::RegistryError;

pub trait DisabledStore: Send + Sync {
    fn load(&self) -> Result<InstallerDisable, RegistryError>;

    /// Durably record `disabled`. Must not return before the write is done.
    fn persist(&self, disabled: &InstallerDisable) -> Result<(), RegistryError>;
}

/// Keeps the set in memory; for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    value: Mutex<InstallerDisable>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(initial: InstallerDisable) -> Self {
        Self {
            value: Mutex::new(initial),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful `persist` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> InstallerDisable {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DisabledStore for MemoryStore {
    fn load(&self) -> Result<InstallerDisable, RegistryError> {
        Ok(self.current())
    }

    fn persist(&self, disabled: &InstallerDisable) -> Result<(), RegistryError> {
        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *value = disabled.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Stores the set as `extra.installer-disable` in a `pakt.toml`.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DisabledStore for ManifestStore {
    fn load(&self) -> Result<InstallerDisable, RegistryError> {
        let manifest = Manifest::from_path(&self.path).map_err(|e| RegistryError::Persist {
            message: e.to_string(),
        })?;
        Ok(manifest.extra.installer_disable)
    }

    fn persist(&self, disabled: &InstallerDisable) -> Result<(), RegistryError> {
        write_installer_disable(&self.path, disabled).map_err(|e| RegistryError::Persist {
            message: e.to_string(),
        })
    }
}
