//! Coordination between competing installer handlers.
//!
//! Every change to the [`InstallerRegistry`] happens inside one critical
//! section, so a tag is never seen with two handlers or, during a swap,
//! with none. Changes to the disabled set are persisted through the
//! [`DisabledStore`] before the in-memory state moves, so a crash between
//! the two leaves the tag marked disabled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pakt_core::manifest::InstallerDisable;
use pakt_util::errors::PaktError;
use thiserror::Error;

use crate::handler::InstallerHandler;
use crate::registry::InstallerRegistry;
use crate::store::DisabledStore;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to record disabled installer types: {message}")]
    Persist { message: String },

    #[error("failed to construct the installer for '{tag}': {message}")]
    Construct { tag: String, message: String },
}

impl From<RegistryError> for PaktError {
    fn from(err: RegistryError) -> Self {
        PaktError::Installer {
            message: err.to_string(),
        }
    }
}

/// What to do when a tag already has a different active handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterPolicy {
    Replace,
    KeepExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The tag had no handler.
    Registered,
    /// The previous handler was swapped out.
    Replaced { previous: String },
    /// The same handler instance was already active.
    Unchanged,
    /// Another handler stays active.
    Kept { existing: String },
    /// A generic handler was offered a disabled tag.
    Refused,
}

struct Inner {
    registry: InstallerRegistry,
    disabled: InstallerDisable,
}

pub struct Coordinator {
    inner: Mutex<Inner>,
    store: Arc<dyn DisabledStore>,
}

impl Coordinator {
    /// Take ownership of `registry` and load the disabled set from `store`.
    ///
    /// Generic handlers already registered for disabled tags are dropped.
    pub fn new(
        mut registry: InstallerRegistry,
        store: Arc<dyn DisabledStore>,
    ) -> Result<Self, RegistryError> {
        let disabled = store.load()?;
        for (tag, _) in registry.entries() {
            if disabled.contains(&tag) && registry.get(&tag).is_some_and(|h| h.is_generic()) {
                registry.remove(&tag);
            }
        }
        Ok(Self {
            inner: Mutex::new(Inner { registry, disabled }),
            store,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `handler` the active handler for `tag`.
    ///
    /// A generic handler never displaces a non-generic one, whatever the
    /// policy.
    pub fn register(
        &self,
        tag: &str,
        handler: Arc<dyn InstallerHandler>,
        policy: RegisterPolicy,
    ) -> Registration {
        let mut inner = self.lock();

        if handler.is_generic() && inner.disabled.contains(tag) {
            tracing::warn!(tag, handler = handler.id(), "installer type is disabled for generic installers");
            return Registration::Refused;
        }

        let outcome = match inner.registry.get(tag) {
            None => Registration::Registered,
            Some(existing) if Arc::ptr_eq(existing, &handler) => return Registration::Unchanged,
            Some(existing)
                if policy == RegisterPolicy::KeepExisting
                    || (handler.is_generic() && !existing.is_generic()) =>
            {
                return Registration::Kept {
                    existing: existing.id().to_string(),
                };
            }
            Some(existing) => Registration::Replaced {
                previous: existing.id().to_string(),
            },
        };

        tracing::debug!(tag, handler = handler.id(), "registering installer");
        inner.registry.insert(tag, handler);
        outcome
    }

    pub fn is_disabled(&self, tag: &str) -> bool {
        self.lock().disabled.contains(tag)
    }

    /// Disable `tag` for generic handlers. Returns `false` if it already was.
    ///
    /// An active generic handler for the tag is dropped once the change is
    /// persisted.
    pub fn disable(&self, tag: &str) -> Result<bool, RegistryError> {
        let mut inner = self.lock();
        if inner.disabled.contains(tag) {
            return Ok(false);
        }
        let mut next = inner.disabled.clone();
        next.insert(tag);
        self.store.persist(&next)?;
        inner.disabled = next;

        if inner.registry.get(tag).is_some_and(|h| h.is_generic()) {
            inner.registry.remove(tag);
        }
        tracing::info!(tag, "disabled installer type for generic installers");
        Ok(true)
    }

    /// Hand `tag` to the handler built by `factory`, taking it from a
    /// generic handler if one holds it.
    ///
    /// The handler is constructed before anything changes, so a failing
    /// factory leaves the registry and the disabled set untouched. When a
    /// generic handler is displaced, the tag is durably disabled for generic
    /// handlers before the swap.
    pub fn claim<F>(&self, tag: &str, factory: F) -> Result<Registration, RegistryError>
    where
        F: FnOnce() -> Result<Arc<dyn InstallerHandler>, PaktError>,
    {
        let handler = factory().map_err(|e| RegistryError::Construct {
            tag: tag.to_string(),
            message: e.to_string(),
        })?;

        let mut inner = self.lock();
        let previous = inner.registry.get(tag).cloned();
        if let Some(existing) = &previous {
            if Arc::ptr_eq(existing, &handler) {
                return Ok(Registration::Unchanged);
            }
            if existing.is_generic() && !inner.disabled.contains(tag) {
                let mut next = inner.disabled.clone();
                next.insert(tag);
                self.store.persist(&next)?;
                inner.disabled = next;
                tracing::info!(
                    tag,
                    previous = existing.id(),
                    "disabled installer type for generic installers"
                );
            }
        }

        tracing::info!(tag, handler = handler.id(), "installer activated");
        inner.registry.insert(tag, handler);
        Ok(match previous {
            Some(existing) => Registration::Replaced {
                previous: existing.id().to_string(),
            },
            None => Registration::Registered,
        })
    }

    pub fn handler_for(&self, tag: &str) -> Option<Arc<dyn InstallerHandler>> {
        self.lock().registry.get(tag).cloned()
    }

    /// `(tag, handler id)` pairs, in tag order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.lock().registry.entries()
    }

    pub fn disabled(&self) -> InstallerDisable {
        self.lock().disabled.clone()
    }

    /// Give the registry back to the caller.
    pub fn into_registry(self) -> InstallerRegistry {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .registry
    }
}
