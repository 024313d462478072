//! Scope and kind resolution for one registrar pass

use crate::error::WatchError;
use crate::mapper::{KindKey, RestMapper, RestMapping, Scope};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Resolves kinds against a [`RestMapper`], caching answers for the lifetime
/// of one registrar pass. A kind's scope does not change within a mapper
/// snapshot, so the cache only saves repeated lookups.
pub struct Resolver<'a> {
    mapper: &'a dyn RestMapper,
    cache: HashMap<KindKey, RestMapping>,
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("cached", &self.cache.len()).finish_non_exhaustive()
    }
}

impl<'a> Resolver<'a> {
    /// Create a resolver with an empty cache
    pub fn new(mapper: &'a dyn RestMapper) -> Self {
        Self {
            mapper,
            cache: HashMap::new(),
        }
    }

    /// Full REST mapping for `key`, looked up at exactly `key.version`
    pub fn mapping(&mut self, key: &KindKey) -> Result<&RestMapping, WatchError> {
        match self.cache.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                let mapping = self.mapper.rest_mapping(&key.group_kind(), &[key.version.as_str()])?;
                debug!("resolved {} as {}", key, mapping.scope);
                Ok(&*entry.insert(mapping))
            }
        }
    }

    /// Scope of `key`
    pub fn scope(&mut self, key: &KindKey) -> Result<Scope, WatchError> {
        self.mapping(key).map(|m| m.scope)
    }
}
