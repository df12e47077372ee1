use std::collections::BTreeMap;
use std::sync::Arc;

use crate::handler::InstallerHandler;

/// Active installer handler per installer-type tag. At most one per tag.
///
/// Owned by the caller and mutated only through the
/// [`Coordinator`](crate::coordinator::Coordinator).
#[derive(Default)]
pub struct InstallerRegistry {
    handlers: BTreeMap<String, Arc<dyn InstallerHandler>>,
}

impl InstallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<dyn InstallerHandler>> {
        self.handlers.get(tag)
    }

    pub fn has(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Registered tags with the id of their handler, in tag order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.handlers
            .iter()
            .map(|(tag, h)| (tag.clone(), h.id().to_string()))
            .collect()
    }

    /// Insert or overwrite in one step; returns the previous handler.
    pub(crate) fn insert(
        &mut self,
        tag: &str,
        handler: Arc<dyn InstallerHandler>,
    ) -> Option<Arc<dyn InstallerHandler>> {
        self.handlers.insert(tag.to_string(), handler)
    }

    pub(crate) fn remove(&mut self, tag: &str) -> Option<Arc<dyn InstallerHandler>> {
        self.handlers.remove(tag)
    }
}
