//! Queue drain: pushing pending writes to the backend.

use crate::context::RequestContext;
use crate::error::{StoreError, StoreResult};
use crate::token::CancellationToken;
use tether_sync::{PendingAction, WriteVerb};
use tether_types::Entity;

/// One pending action that failed to push.
#[derive(Debug)]
pub struct PushError {
    /// The entity whose action failed.
    pub entity_id: String,
    /// Stable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Result of draining the pending-write queue.
#[derive(Debug)]
pub struct PushResult<T> {
    /// Number of actions pushed successfully.
    pub pushed_count: u64,
    /// Entities as stored by the backend (creates and updates).
    pub entities: Vec<T>,
    /// Actions that failed and remain queued.
    pub errors: Vec<PushError>,
}

impl<T> Default for PushResult<T> {
    fn default() -> Self {
        Self {
            pushed_count: 0,
            entities: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// A push request: drains the collection's pending actions.
///
/// Creates are batched through the multi-insert endpoint; updates and
/// deletes go out individually in insertion order. A failed action is
/// recorded and stays queued for the next push; iteration always
/// continues over the remaining actions.
pub(crate) struct PushRequest<T: Entity> {
    ctx: RequestContext<T>,
    token: CancellationToken,
}

impl<T: Entity> PushRequest<T> {
    pub fn new(ctx: RequestContext<T>, token: CancellationToken) -> Self {
        Self { ctx, token }
    }

    pub async fn execute(self) -> StoreResult<PushResult<T>> {
        let mut result = PushResult::default();

        self.push_creates(&mut result).await?;
        self.push_rest(&mut result).await?;

        tracing::debug!(
            collection = %self.ctx.collection,
            pushed = result.pushed_count,
            failed = result.errors.len(),
            "push finished"
        );
        Ok(result)
    }

    /// Pushes all Create actions, batched through multi-insert.
    async fn push_creates(&self, result: &mut PushResult<T>) -> StoreResult<()> {
        let creates = self.ctx.queue.get_first_n(
            &self.ctx.collection,
            usize::MAX,
            0,
            Some(WriteVerb::Create),
        );

        for chunk in creates.chunks(self.ctx.config.multi_insert_batch_size) {
            self.token.check()?;

            // A create captures the latest cache state at push time. A
            // missing row means the entity was cleared locally; the
            // orphaned action is dropped.
            let mut items: Vec<(&PendingAction, T)> = Vec::with_capacity(chunk.len());
            for action in chunk {
                match self.ctx.cache.find_by_id(&action.entity_id)? {
                    Some(entity) => items.push((action, entity)),
                    None => {
                        self.ctx.queue.remove(action.sequence);
                    }
                }
            }
            if items.is_empty() {
                continue;
            }

            let outbound: Vec<T> = items
                .iter()
                .map(|(_, entity)| entity.clone().without_entity_id())
                .collect();

            match self.ctx.gateway.multi_insert(&self.ctx.collection, outbound).await {
                Ok(response) => {
                    for (offset, slot) in response.value.entities.into_iter().enumerate() {
                        let Some((action, _)) = items.get(offset) else {
                            continue;
                        };
                        if let Some(pushed) = slot {
                            let stored = self.promote(pushed, &action.entity_id)?;
                            self.ctx.queue.remove(action.sequence);
                            result.pushed_count += 1;
                            result.entities.push(stored);
                        }
                    }
                    for item_error in response.value.errors {
                        if let Some((action, _)) = items.get(item_error.index) {
                            result.errors.push(PushError {
                                entity_id: action.entity_id.clone(),
                                code: item_error.code,
                                message: item_error.message,
                            });
                        }
                    }
                }
                Err(error) => {
                    for (action, _) in &items {
                        result.errors.push(push_error(action, &error));
                    }
                }
            }
        }

        Ok(())
    }

    /// Pushes Update and Delete actions individually, in insertion order.
    async fn push_rest(&self, result: &mut PushResult<T>) -> StoreResult<()> {
        let actions = self
            .ctx
            .queue
            .get_first_n(&self.ctx.collection, usize::MAX, 0, None);

        for action in actions.into_iter().filter(|a| a.verb != WriteVerb::Create) {
            self.token.check()?;

            match action.verb {
                WriteVerb::Update => {
                    let Some(entity) = self.ctx.cache.find_by_id(&action.entity_id)? else {
                        self.ctx.queue.remove(action.sequence);
                        continue;
                    };
                    match self
                        .ctx
                        .gateway
                        .update(&self.ctx.collection, &entity, &action.entity_id)
                        .await
                    {
                        Ok(response) => {
                            let stored = self.ctx.cache.update(response.value)?;
                            self.ctx.queue.remove(action.sequence);
                            result.pushed_count += 1;
                            result.entities.push(stored);
                        }
                        Err(error) => result.errors.push(push_error(&action, &error)),
                    }
                }
                WriteVerb::Delete => {
                    match self
                        .ctx
                        .gateway
                        .delete_by_id(&self.ctx.collection, &action.entity_id)
                        .await
                    {
                        Ok(_) => {
                            self.ctx.queue.remove(action.sequence);
                            result.pushed_count += 1;
                        }
                        Err(error) => result.errors.push(push_error(&action, &error)),
                    }
                }
                WriteVerb::Create => unreachable!("creates were drained first"),
            }
        }

        Ok(())
    }

    /// Rewrites the temp-keyed cache row to the server-assigned id.
    fn promote(&self, pushed: T, local_id: &str) -> StoreResult<T> {
        let stored = if pushed.entity_id() == Some(local_id) {
            self.ctx.cache.update(pushed)?
        } else {
            self.ctx.cache.rename_id(pushed, local_id)?
        };
        Ok(stored)
    }
}

fn push_error(action: &PendingAction, error: &StoreError) -> PushError {
    PushError {
        entity_id: action.entity_id.clone(),
        code: error.code().to_string(),
        message: error.to_string(),
    }
}
