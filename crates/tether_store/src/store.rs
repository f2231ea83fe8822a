//! The per-collection data store façade.

use crate::config::StoreConfig;
use crate::context::RequestContext;
use crate::error::{codes, StoreError, StoreResult};
use crate::gateway::{MultiInsertResult, NetworkGateway};
use crate::policy::{ReadPolicy, StoreType, WritePolicy};
use crate::pull::{PullRequest, PullResult};
use crate::push::{PushRequest, PushResult};
use crate::read::ReadRequest;
use crate::token::CancellationToken;
use crate::write::{RemoveResult, WriteRequest};
use std::sync::Arc;
use tether_cache::{CheckpointStore, ClearResult, EntityCache};
use tether_sync::SyncQueue;
use tether_types::{Entity, GroupedResult, Query, ReduceFn};
use tokio::sync::mpsc::UnboundedSender;

/// Result of a sync: push, then pull.
///
/// The pull half is `None` when actions remained queued after the push
/// (a pull would be rejected until they drain).
#[derive(Debug)]
pub struct SyncOutcome<T> {
    /// The push half.
    pub push: PushResult<T>,
    /// The pull half, when the queue drained.
    pub pull: Option<PullResult<T>>,
}

/// Policy-driven access to one remote collection.
///
/// A store composes the collection's cache, the shared pending-write
/// queue, the checkpoint store and a network gateway, and routes every
/// operation through the fixed (read, write) policy pair of its
/// [`StoreType`]. Stores are cheap to construct and hold no state of
/// their own; everything lives in the injected components.
pub struct DataStore<T: Entity> {
    collection: String,
    store_type: StoreType,
    config: StoreConfig,
    cache: Arc<dyn EntityCache<T>>,
    checkpoints: Arc<dyn CheckpointStore>,
    queue: Arc<SyncQueue>,
    gateway: Arc<dyn NetworkGateway<T>>,
}

impl<T: Entity> DataStore<T> {
    /// Creates a store over explicitly supplied components.
    ///
    /// Most callers go through [`Client::data_store`](crate::Client::data_store)
    /// instead.
    pub fn new(
        collection: impl Into<String>,
        store_type: StoreType,
        gateway: Arc<dyn NetworkGateway<T>>,
        cache: Arc<dyn EntityCache<T>>,
        queue: Arc<SyncQueue>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            collection: collection.into(),
            store_type,
            config: StoreConfig::new(),
            cache,
            checkpoints,
            queue,
            gateway,
        }
    }

    /// Replaces the store configuration.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// The collection this store is bound to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The store type selected at construction.
    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    fn read_policy(&self) -> ReadPolicy {
        self.store_type.read_policy()
    }

    fn write_policy(&self) -> WritePolicy {
        self.store_type.write_policy()
    }

    fn context(&self) -> RequestContext<T> {
        RequestContext {
            collection: self.collection.clone(),
            cache: Arc::clone(&self.cache),
            checkpoints: Arc::clone(&self.checkpoints),
            queue: Arc::clone(&self.queue),
            gateway: Arc::clone(&self.gateway),
            config: self.config.clone(),
        }
    }

    /// Finds the entities matching `query` (all of them when `None`).
    pub async fn find(
        &self,
        query: Option<&Query<T>>,
        token: &CancellationToken,
    ) -> StoreResult<Vec<T>> {
        let query = query.cloned().unwrap_or_default();
        ReadRequest::new(self.context(), self.read_policy(), token.clone())
            .find(&query, None)
            .await
    }

    /// Like [`find`](Self::find), additionally delivering the cached
    /// result through `cached` before the network is consulted.
    ///
    /// Only the both-policy sends on the channel; the returned value is
    /// always the authoritative result.
    pub async fn find_with_cached(
        &self,
        query: Option<&Query<T>>,
        cached: UnboundedSender<Vec<T>>,
        token: &CancellationToken,
    ) -> StoreResult<Vec<T>> {
        let query = query.cloned().unwrap_or_default();
        ReadRequest::new(self.context(), self.read_policy(), token.clone())
            .find(&query, Some(cached))
            .await
    }

    /// Finds one entity by id.
    pub async fn find_by_id(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> StoreResult<Option<T>> {
        ReadRequest::new(self.context(), self.read_policy(), token.clone())
            .find_by_id(id)
            .await
    }

    /// Counts the entities matching `query`.
    pub async fn count(
        &self,
        query: Option<&Query<T>>,
        token: &CancellationToken,
    ) -> StoreResult<u64> {
        let query = query.cloned().unwrap_or_default();
        ReadRequest::new(self.context(), self.read_policy(), token.clone())
            .count(&query)
            .await
    }

    /// Groups and reduces the entities matching `query`.
    ///
    /// `field` may only be omitted for [`ReduceFn::Count`].
    pub async fn group_and_aggregate(
        &self,
        reduce: ReduceFn,
        group_field: Option<&str>,
        field: Option<&str>,
        query: Option<&Query<T>>,
        token: &CancellationToken,
    ) -> StoreResult<Vec<GroupedResult>> {
        let field = match field {
            Some(field) => field,
            None if reduce == ReduceFn::Count => "_id",
            None => {
                return Err(StoreError::validation(
                    codes::MISSING_AGGREGATE_FIELD,
                    "this reduction requires an aggregate field",
                ))
            }
        };
        let query = query.cloned().unwrap_or_default();
        ReadRequest::new(self.context(), self.read_policy(), token.clone())
            .aggregate(reduce, group_field, field, &query)
            .await
    }

    /// Saves one entity. An entity without an id is a create; with an
    /// id, an update.
    pub async fn save(&self, entity: T, token: &CancellationToken) -> StoreResult<T> {
        WriteRequest::new(self.context(), self.write_policy(), token.clone())
            .save(entity)
            .await
    }

    /// Creates a batch of entities.
    pub async fn save_batch(
        &self,
        entities: Vec<T>,
        token: &CancellationToken,
    ) -> StoreResult<MultiInsertResult<T>> {
        WriteRequest::new(self.context(), self.write_policy(), token.clone())
            .multi_insert(entities)
            .await
    }

    /// Removes one entity by id.
    pub async fn remove_by_id(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> StoreResult<RemoveResult> {
        WriteRequest::new(self.context(), self.write_policy(), token.clone())
            .remove_by_id(id)
            .await
    }

    /// Removes the entities matching `query`.
    pub async fn remove_by_query(
        &self,
        query: &Query<T>,
        token: &CancellationToken,
    ) -> StoreResult<RemoveResult> {
        WriteRequest::new(self.context(), self.write_policy(), token.clone())
            .remove_by_query(query)
            .await
    }

    /// Bulk-pulls the queried scope into the cache.
    ///
    /// Requires a store type with local state and an empty pending-write
    /// queue for the collection.
    pub async fn pull(
        &self,
        query: Option<&Query<T>>,
        expected_count: Option<u64>,
        is_initial: bool,
        token: &CancellationToken,
    ) -> StoreResult<PullResult<T>> {
        if !self.store_type.has_local_state() {
            return Err(StoreError::invalid_operation(
                codes::PULL_NOT_SUPPORTED,
                "pull requires a store with a local cache",
            ));
        }
        let query = query.cloned().unwrap_or_default();
        PullRequest::new(self.context(), token.clone(), query, expected_count, is_initial)
            .execute()
            .await
    }

    /// Pushes the collection's pending writes to the backend.
    pub async fn push(&self, token: &CancellationToken) -> StoreResult<PushResult<T>> {
        if !self.store_type.has_local_state() {
            return Err(StoreError::invalid_operation(
                codes::PUSH_NOT_SUPPORTED,
                "push requires a store with a pending-write log",
            ));
        }
        PushRequest::new(self.context(), token.clone()).execute().await
    }

    /// Pushes, then pulls.
    ///
    /// When actions remain queued after the push (some failed), the pull
    /// half is skipped rather than failing the whole sync.
    pub async fn sync(
        &self,
        query: Option<&Query<T>>,
        token: &CancellationToken,
    ) -> StoreResult<SyncOutcome<T>> {
        let push = self.push(token).await?;
        let pull = if self.queue.pending_count(Some(&self.collection)) == 0 {
            Some(self.pull(query, None, false, token).await?)
        } else {
            tracing::debug!(
                collection = %self.collection,
                remaining = self.queue.pending_count(Some(&self.collection)),
                "skipping pull: actions remain queued after push"
            );
            None
        };
        Ok(SyncOutcome { push, pull })
    }

    /// Number of pending actions for this collection, or across all
    /// collections.
    pub fn pending_count(&self, all_collections: bool) -> u64 {
        if all_collections {
            self.queue.pending_count(None)
        } else {
            self.queue.pending_count(Some(&self.collection))
        }
    }

    /// Clears local rows (all of them, or the ones matching `query`),
    /// their pending actions, and the collection's delta checkpoints.
    pub fn clear_local(&self, query: Option<&Query<T>>) -> StoreResult<ClearResult> {
        let cleared = self.cache.clear(query)?;
        match query {
            None => {
                self.queue.remove_all(Some(&self.collection));
            }
            Some(_) => {
                for id in &cleared.ids {
                    self.queue.remove_by_entity_id(&self.collection, id);
                }
            }
        }
        self.checkpoints.delete_all(&self.collection)?;
        Ok(cleared)
    }

    /// Discards pending actions without pushing them.
    ///
    /// With a query, only actions whose entity currently matches it are
    /// discarded. Returns the number discarded.
    pub fn purge_pending(&self, query: Option<&Query<T>>) -> StoreResult<u64> {
        match query {
            None => Ok(self.queue.remove_all(Some(&self.collection))),
            Some(query) => {
                let mut removed = 0;
                for entity in self.cache.find_by_query(query)? {
                    if let Some(id) = entity.entity_id() {
                        removed += self.queue.remove_by_entity_id(&self.collection, id);
                    }
                }
                Ok(removed)
            }
        }
    }
}
