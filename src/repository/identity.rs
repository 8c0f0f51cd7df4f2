use std::collections::HashMap;
use crate::core::Key;
use super::ResourceId;

/// Per-repository cache from `(model, key)` to the resource holding that row.
///
/// Entries live until they are forgotten; there is no eviction.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<(String, Key), ResourceId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, model: &str, key: &Key) -> Option<ResourceId> {
        self.entries.get(&(model.to_string(), key.clone())).copied()
    }

    pub fn register(&mut self, model: &str, key: Key, id: ResourceId) {
        self.entries.insert((model.to_string(), key), id);
    }

    pub fn forget(&mut self, model: &str, key: &Key) -> Option<ResourceId> {
        self.entries.remove(&(model.to_string(), key.clone()))
    }

    /// Every registered resource.
    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.entries.values().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
