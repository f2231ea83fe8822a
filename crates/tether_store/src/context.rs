//! Shared request wiring.

use crate::config::StoreConfig;
use crate::gateway::NetworkGateway;
use std::sync::Arc;
use tether_cache::{CheckpointStore, EntityCache};
use tether_sync::SyncQueue;
use tether_types::Entity;

/// The handles a request executes against, injected by the data store.
pub(crate) struct RequestContext<T: Entity> {
    pub collection: String,
    pub cache: Arc<dyn EntityCache<T>>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub queue: Arc<SyncQueue>,
    pub gateway: Arc<dyn NetworkGateway<T>>,
    pub config: StoreConfig,
}

impl<T: Entity> Clone for RequestContext<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            cache: Arc::clone(&self.cache),
            checkpoints: Arc::clone(&self.checkpoints),
            queue: Arc::clone(&self.queue),
            gateway: Arc::clone(&self.gateway),
            config: self.config.clone(),
        }
    }
}
