//! Policy-driven write requests.

use crate::context::RequestContext;
use crate::error::{codes, StoreError, StoreResult};
use crate::gateway::{IndexedError, MultiInsertResult, Timestamped};
use crate::policy::WritePolicy;
use crate::token::CancellationToken;
use serde_json::json;
use std::sync::Arc;
use tether_sync::{PendingAction, WriteVerb};
use tether_types::{is_temp_id, temp_id, Entity, Query};
use tokio::task::JoinSet;

/// Result of a remove operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveResult {
    /// Number of entities removed.
    pub count: u64,
    /// Ids of the locally removed entities, when known.
    pub ids: Vec<String>,
}

/// A write request bound to one policy and one cancellation token.
pub(crate) struct WriteRequest<T: Entity> {
    ctx: RequestContext<T>,
    policy: WritePolicy,
    token: CancellationToken,
}

impl<T: Entity> WriteRequest<T> {
    pub fn new(ctx: RequestContext<T>, policy: WritePolicy, token: CancellationToken) -> Self {
        Self { ctx, policy, token }
    }

    /// Saves one entity.
    ///
    /// Create vs. update is decided by whether the entity carries a
    /// non-empty id at call time.
    pub async fn save(self, entity: T) -> StoreResult<T> {
        match self.policy {
            WritePolicy::ForceNetwork => {
                self.token.check()?;
                let response = match entity.entity_id() {
                    Some(id) => {
                        let id = id.to_owned();
                        self.ctx.gateway.update(&self.ctx.collection, &entity, &id).await?
                    }
                    None => self.ctx.gateway.create(&self.ctx.collection, &entity).await?,
                };
                Ok(response.value)
            }
            WritePolicy::ForceLocal => {
                let (local, local_id, is_create) = self.shadow(entity)?;
                self.enqueue_write(&local_id, verb_for(is_create));
                Ok(local)
            }
            WritePolicy::NetworkThenLocal => {
                let (local, local_id, is_create) = self.shadow(entity)?;
                self.token.check()?;
                // Network failures propagate without a queue entry: the
                // cache keeps the offline shadow only.
                let pushed = self.transmit(&local, &local_id, is_create).await?;
                self.reconcile(pushed, &local_id)
            }
            WritePolicy::LocalThenNetwork => {
                let (local, local_id, is_create) = self.shadow(entity)?;
                let outcome = match self.token.check() {
                    Ok(()) => self.transmit(&local, &local_id, is_create).await,
                    Err(error) => Err(error),
                };
                match outcome {
                    Ok(pushed) => self.reconcile(pushed, &local_id),
                    Err(error) => {
                        // The mutation is not lost: it rides the queue to
                        // the next push.
                        self.enqueue_write(&local_id, verb_for(is_create));
                        Err(error)
                    }
                }
            }
        }
    }

    /// Removes one entity by id.
    pub async fn remove_by_id(self, id: &str) -> StoreResult<RemoveResult> {
        if id.is_empty() {
            return Err(StoreError::validation(
                codes::EMPTY_ENTITY_ID,
                "remove_by_id requires a non-empty id",
            ));
        }

        match self.policy {
            WritePolicy::ForceNetwork => {
                self.token.check()?;
                let count = self
                    .ctx
                    .gateway
                    .delete_by_id(&self.ctx.collection, id)
                    .await?
                    .value;
                Ok(remove_result(count, id))
            }
            WritePolicy::ForceLocal => {
                let count = self.ctx.cache.delete_by_id(id)?;
                self.enqueue_write(id, WriteVerb::Delete);
                Ok(remove_result(count, id))
            }
            WritePolicy::NetworkThenLocal => {
                self.ctx.cache.delete_by_id(id)?;
                self.token.check()?;
                let count = self
                    .ctx
                    .gateway
                    .delete_by_id(&self.ctx.collection, id)
                    .await?
                    .value;
                Ok(remove_result(count, id))
            }
            WritePolicy::LocalThenNetwork => {
                self.ctx.cache.delete_by_id(id)?;
                let outcome = match self.token.check() {
                    Ok(()) => self.ctx.gateway.delete_by_id(&self.ctx.collection, id).await,
                    Err(error) => Err(error),
                };
                match outcome {
                    Ok(response) => Ok(remove_result(response.value, id)),
                    Err(error) => {
                        self.enqueue_write(id, WriteVerb::Delete);
                        Err(error)
                    }
                }
            }
        }
    }

    /// Removes the entities matching a query.
    pub async fn remove_by_query(self, query: &Query<T>) -> StoreResult<RemoveResult> {
        match self.policy {
            WritePolicy::ForceNetwork => {
                self.token.check()?;
                let count = self
                    .ctx
                    .gateway
                    .delete_by_query(&self.ctx.collection, &query.wire())
                    .await?
                    .value;
                Ok(RemoveResult { count, ids: Vec::new() })
            }
            WritePolicy::ForceLocal => {
                let ids = self.ctx.cache.delete_by_query(query)?;
                for id in &ids {
                    self.enqueue_write(id, WriteVerb::Delete);
                }
                Ok(RemoveResult { count: ids.len() as u64, ids })
            }
            WritePolicy::NetworkThenLocal => {
                let ids = self.ctx.cache.delete_by_query(query)?;
                self.token.check()?;
                let count = self
                    .ctx
                    .gateway
                    .delete_by_query(&self.ctx.collection, &query.wire())
                    .await?
                    .value;
                Ok(RemoveResult { count, ids })
            }
            WritePolicy::LocalThenNetwork => {
                let ids = self.ctx.cache.delete_by_query(query)?;
                let outcome = match self.token.check() {
                    Ok(()) => {
                        self.ctx
                            .gateway
                            .delete_by_query(&self.ctx.collection, &query.wire())
                            .await
                    }
                    Err(error) => Err(error),
                };
                match outcome {
                    Ok(response) => Ok(RemoveResult { count: response.value, ids }),
                    Err(error) => {
                        for id in &ids {
                            self.enqueue_write(id, WriteVerb::Delete);
                        }
                        Err(error)
                    }
                }
            }
        }
    }

    /// Creates a batch of entities.
    ///
    /// Entities are chunked into multi-insert calls bounded by the
    /// configured batch size; the calls run concurrently and are joined
    /// with a wait-for-all barrier. One bad item never fails the batch:
    /// failures land in the index-keyed error list and iteration
    /// continues.
    pub async fn multi_insert(self, entities: Vec<T>) -> StoreResult<MultiInsertResult<T>> {
        if entities.is_empty() {
            return Err(StoreError::validation(
                codes::EMPTY_BATCH,
                "multi-insert requires at least one entity",
            ));
        }

        let total = entities.len();
        let mut slots: Vec<Option<T>> = vec![None; total];
        let mut errors: Vec<IndexedError> = Vec::new();

        match self.policy {
            WritePolicy::ForceNetwork => {
                self.token.check()?;
                let items: Vec<(usize, T, String)> = entities
                    .into_iter()
                    .enumerate()
                    .map(|(index, entity)| (index, entity, String::new()))
                    .collect();
                self.transmit_batches(items, &mut slots, &mut errors, false, false)
                    .await?;
            }
            WritePolicy::ForceLocal => {
                for (index, entity) in entities.into_iter().enumerate() {
                    match self.shadow(entity) {
                        Ok((local, local_id, is_create)) => {
                            self.enqueue_write(&local_id, verb_for(is_create));
                            slots[index] = Some(local);
                        }
                        Err(error) => errors.push(indexed(index, &error)),
                    }
                }
            }
            WritePolicy::NetworkThenLocal | WritePolicy::LocalThenNetwork => {
                let enqueue_on_failure = self.policy == WritePolicy::LocalThenNetwork;

                let mut items: Vec<(usize, T, String)> = Vec::with_capacity(total);
                for (index, entity) in entities.into_iter().enumerate() {
                    match self.shadow(entity) {
                        Ok((local, local_id, _)) => items.push((index, local, local_id)),
                        Err(error) => errors.push(indexed(index, &error)),
                    }
                }

                if let Err(error) = self.token.check() {
                    if enqueue_on_failure {
                        for (_, _, local_id) in &items {
                            self.enqueue_write(local_id, WriteVerb::Create);
                        }
                    }
                    return Err(error);
                }

                self.transmit_batches(items, &mut slots, &mut errors, true, enqueue_on_failure)
                    .await?;
            }
        }

        errors.sort_by_key(|error| error.index);
        Ok(MultiInsertResult { entities: slots, errors })
    }

    /// Writes the entity into the cache ahead of any network traffic,
    /// assigning a temp id when the entity is new.
    fn shadow(&self, entity: T) -> StoreResult<(T, String, bool)> {
        match entity.entity_id() {
            Some(id) => {
                let id = id.to_owned();
                let stored = self.ctx.cache.update(entity)?;
                Ok((stored, id, false))
            }
            None => {
                let id = temp_id();
                let stored = self.ctx.cache.save(entity.with_entity_id(id.clone()))?;
                Ok((stored, id, true))
            }
        }
    }

    /// Sends one entity to the backend. Creates go out without the temp
    /// id so the server assigns the permanent one.
    async fn transmit(&self, local: &T, local_id: &str, is_create: bool) -> StoreResult<T> {
        let response = if is_create {
            let outbound = local.clone().without_entity_id();
            self.ctx.gateway.create(&self.ctx.collection, &outbound).await?
        } else {
            self.ctx
                .gateway
                .update(&self.ctx.collection, local, local_id)
                .await?
        };
        Ok(response.value)
    }

    /// Folds the server's copy back into the cache. A changed id is an
    /// atomic rename of the existing row, never a delete plus insert.
    fn reconcile(&self, pushed: T, local_id: &str) -> StoreResult<T> {
        let stored = if pushed.entity_id() == Some(local_id) {
            self.ctx.cache.update(pushed)?
        } else {
            self.ctx.cache.rename_id(pushed, local_id)?
        };
        Ok(stored)
    }

    fn enqueue_write(&self, entity_id: &str, verb: WriteVerb) {
        let verb_name = match verb {
            WriteVerb::Create => "create",
            WriteVerb::Update => "update",
            WriteVerb::Delete => "delete",
        };
        let action = PendingAction::new(&self.ctx.collection, entity_id, verb).with_state(json!({
            "collection": self.ctx.collection,
            "entity_id": entity_id,
            "verb": verb_name,
        }));
        self.ctx.queue.enqueue(action);
    }

    /// Issues the batch calls concurrently and merges their responses
    /// behind a wait-for-all barrier.
    async fn transmit_batches(
        &self,
        items: Vec<(usize, T, String)>,
        slots: &mut [Option<T>],
        errors: &mut Vec<IndexedError>,
        apply_to_cache: bool,
        enqueue_on_failure: bool,
    ) -> StoreResult<()> {
        type BatchOutcome<T> = (
            Vec<(usize, String)>,
            StoreResult<Timestamped<MultiInsertResult<T>>>,
        );

        let mut join_set: JoinSet<BatchOutcome<T>> = JoinSet::new();
        for chunk in items.chunks(self.ctx.config.multi_insert_batch_size) {
            let gateway = Arc::clone(&self.ctx.gateway);
            let collection = self.ctx.collection.clone();
            let meta: Vec<(usize, String)> = chunk
                .iter()
                .map(|(index, _, local_id)| (*index, local_id.clone()))
                .collect();
            let outbound: Vec<T> = chunk
                .iter()
                .map(|(_, entity, local_id)| {
                    if is_temp_id(local_id) {
                        entity.clone().without_entity_id()
                    } else {
                        entity.clone()
                    }
                })
                .collect();

            join_set.spawn(async move {
                let response = gateway.multi_insert(&collection, outbound).await;
                (meta, response)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (meta, response) =
                joined.map_err(|error| StoreError::network("TaskFailed", error.to_string()))?;

            match response {
                Ok(ts) => {
                    for (offset, slot) in ts.value.entities.into_iter().enumerate() {
                        let Some((index, local_id)) = meta.get(offset) else {
                            continue;
                        };
                        if let Some(pushed) = slot {
                            let stored = if apply_to_cache {
                                self.reconcile(pushed, local_id)?
                            } else {
                                pushed
                            };
                            slots[*index] = Some(stored);
                        }
                    }
                    for item_error in ts.value.errors {
                        if let Some((index, _)) = meta.get(item_error.index) {
                            errors.push(IndexedError {
                                index: *index,
                                code: item_error.code,
                                message: item_error.message,
                            });
                        }
                    }
                }
                Err(error) => {
                    // The whole batch call failed; every item of the
                    // batch is recorded and, under local-then-network,
                    // re-queued for the next push.
                    for (index, local_id) in &meta {
                        if enqueue_on_failure {
                            self.enqueue_write(local_id, WriteVerb::Create);
                        }
                        errors.push(indexed(*index, &error));
                    }
                }
            }
        }

        Ok(())
    }
}

fn verb_for(is_create: bool) -> WriteVerb {
    if is_create {
        WriteVerb::Create
    } else {
        WriteVerb::Update
    }
}

fn remove_result(count: u64, id: &str) -> RemoveResult {
    RemoveResult {
        count,
        ids: if count > 0 { vec![id.to_owned()] } else { Vec::new() },
    }
}

fn indexed(index: usize, error: &StoreError) -> IndexedError {
    IndexedError {
        index,
        code: error.code().to_string(),
        message: error.to_string(),
    }
}
