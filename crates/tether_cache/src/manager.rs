//! Collection → cache registry.

use crate::checkpoint::MemoryCheckpointStore;
use crate::error::{CacheError, CacheResult};
use crate::memory::MemoryCache;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tether_types::Entity;

/// Explicit registry mapping collection names to typed cache instances.
///
/// A manager is constructed once by the client and passed down; there is
/// no process-wide singleton. Asking for the same collection twice returns
/// the same cache instance, so every store opened over a collection sees
/// the same rows. A collection is bound to the entity type it was first
/// opened with.
pub struct CacheManager {
    caches: RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>,
    checkpoints: Arc<MemoryCheckpointStore>,
}

impl CacheManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
        }
    }

    /// Returns the cache for `collection`, creating it on first use.
    ///
    /// Fails if the collection was already opened with a different entity
    /// type.
    pub fn entity_cache<T: Entity>(&self, collection: &str) -> CacheResult<Arc<MemoryCache<T>>> {
        let mut caches = self.caches.write();
        let slot = caches
            .entry(collection.to_owned())
            .or_insert_with(|| Box::new(Arc::new(MemoryCache::<T>::new(collection))));

        slot.downcast_ref::<Arc<MemoryCache<T>>>()
            .cloned()
            .ok_or_else(|| {
                CacheError::storage(format!(
                    "collection {collection} already opened with a different entity type"
                ))
            })
    }

    /// Returns the shared checkpoint store.
    #[must_use]
    pub fn checkpoints(&self) -> Arc<MemoryCheckpointStore> {
        Arc::clone(&self.checkpoints)
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntityCache;
    use tether_types::Document;

    #[test]
    fn same_collection_returns_same_cache() {
        let manager = CacheManager::new();

        let first = manager.entity_cache::<Document>("books").unwrap();
        first
            .save(Document::new().with_entity_id("e1"))
            .unwrap();

        let second = manager.entity_cache::<Document>("books").unwrap();
        assert_eq!(second.count_all().unwrap(), 1);
    }

    #[test]
    fn collections_are_independent() {
        let manager = CacheManager::new();

        let books = manager.entity_cache::<Document>("books").unwrap();
        books.save(Document::new().with_entity_id("e1")).unwrap();

        let songs = manager.entity_cache::<Document>("songs").unwrap();
        assert!(songs.is_empty().unwrap());
    }

    #[test]
    fn type_mismatch_is_an_error() {
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Other {
            id: Option<String>,
        }

        impl Entity for Other {
            fn entity_id(&self) -> Option<&str> {
                self.id.as_deref().filter(|id| !id.is_empty())
            }

            fn with_entity_id(mut self, id: impl Into<String>) -> Self {
                self.id = Some(id.into());
                self
            }

            fn without_entity_id(mut self) -> Self {
                self.id = None;
                self
            }
        }

        let manager = CacheManager::new();
        manager.entity_cache::<Document>("books").unwrap();

        let err = manager.entity_cache::<Other>("books").unwrap_err();
        assert_eq!(err.code(), "Storage");
    }
}
