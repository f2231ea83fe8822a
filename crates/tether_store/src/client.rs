//! The top-level client.

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::gateway::NetworkGateway;
use crate::policy::StoreType;
use crate::store::DataStore;
use std::sync::Arc;
use tether_cache::{CacheManager, CheckpointStore, EntityCache};
use tether_sync::SyncQueue;
use tether_types::Entity;

/// The single composition root of a Tether client.
///
/// Owns the cache registry, the shared pending-write queue and the
/// checkpoint store, and hands out [`DataStore`] instances wired to
/// them. Everything is constructed explicitly and passed down; there is
/// no process-wide singleton or ambient static.
pub struct Client {
    cache_manager: Arc<CacheManager>,
    queue: Arc<SyncQueue>,
}

impl Client {
    /// Creates a client with fresh local state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_manager: Arc::new(CacheManager::new()),
            queue: Arc::new(SyncQueue::new()),
        }
    }

    /// The cache registry.
    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.cache_manager
    }

    /// The shared pending-write queue.
    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Number of pending actions across all collections.
    pub fn pending_count(&self) -> u64 {
        self.queue.pending_count(None)
    }

    /// Opens a data store over `collection` with the given store type
    /// and gateway.
    pub fn data_store<T, G>(
        &self,
        collection: &str,
        store_type: StoreType,
        gateway: Arc<G>,
        config: StoreConfig,
    ) -> StoreResult<DataStore<T>>
    where
        T: Entity,
        G: NetworkGateway<T> + 'static,
    {
        let cache: Arc<dyn EntityCache<T>> = self.cache_manager.entity_cache::<T>(collection)?;
        let checkpoints: Arc<dyn CheckpointStore> = self.cache_manager.checkpoints();
        let gateway: Arc<dyn NetworkGateway<T>> = gateway;

        Ok(DataStore::new(
            collection,
            store_type,
            gateway,
            cache,
            Arc::clone(&self.queue),
            checkpoints,
        )
        .with_config(config))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;
    use crate::token::CancellationToken;
    use tether_types::Document;

    #[tokio::test]
    async fn stores_over_one_collection_share_state() {
        let client = Client::new();
        let gateway = Arc::new(MockGateway::<Document>::new());

        let sync_store = client
            .data_store::<Document, _>("books", StoreType::Sync, Arc::clone(&gateway), StoreConfig::new())
            .unwrap();
        let other = client
            .data_store::<Document, _>("books", StoreType::Sync, gateway, StoreConfig::new())
            .unwrap();

        let token = CancellationToken::new();
        sync_store.save(Document::new(), &token).await.unwrap();

        assert_eq!(other.find(None, &token).await.unwrap().len(), 1);
        assert_eq!(client.pending_count(), 1);
    }
}
