//! Policy-driven read requests.

use crate::context::RequestContext;
use crate::delta::fetch_network;
use crate::error::{codes, StoreError, StoreResult};
use crate::policy::ReadPolicy;
use crate::token::CancellationToken;
use tether_types::{Entity, GroupedResult, Query, ReduceFn};
use tokio::sync::mpsc::UnboundedSender;

/// A read request bound to one policy and one cancellation token.
///
/// Built by the data store per call; executing it consumes it.
pub(crate) struct ReadRequest<T: Entity> {
    ctx: RequestContext<T>,
    policy: ReadPolicy,
    token: CancellationToken,
}

impl<T: Entity> ReadRequest<T> {
    pub fn new(ctx: RequestContext<T>, policy: ReadPolicy, token: CancellationToken) -> Self {
        Self { ctx, policy, token }
    }

    /// Finds the entities matching `query`.
    ///
    /// Under the both-policy, `local` receives the cache result before the
    /// network fetch is issued; the returned value is always the
    /// network-authoritative result.
    pub async fn find(
        self,
        query: &Query<T>,
        local: Option<UnboundedSender<Vec<T>>>,
    ) -> StoreResult<Vec<T>> {
        match self.policy {
            ReadPolicy::ForceLocal => Ok(self.ctx.cache.find_by_query(query)?),
            ReadPolicy::ForceNetwork => {
                self.token.check()?;
                fetch_network(&self.ctx, query).await
            }
            ReadPolicy::Both => {
                let cached = self.ctx.cache.find_by_query(query)?;
                if let Some(listener) = local {
                    // A dropped listener is not an error; the caller only
                    // wanted the final result.
                    let _ = listener.send(cached);
                }
                self.token.check()?;
                fetch_network(&self.ctx, query).await
            }
            ReadPolicy::NetworkOtherwiseLocal => {
                self.token.check()?;
                match fetch_network(&self.ctx, query).await {
                    Ok(entities) => Ok(entities),
                    Err(error) if error.is_connectivity() => {
                        tracing::debug!(
                            collection = %self.ctx.collection,
                            "network unreachable, serving find from cache"
                        );
                        Ok(self.ctx.cache.find_by_query(query)?)
                    }
                    Err(error) => Err(error),
                }
            }
        }
    }

    /// Finds one entity by id.
    pub async fn find_by_id(self, id: &str) -> StoreResult<Option<T>> {
        if id.is_empty() {
            return Err(StoreError::validation(
                codes::EMPTY_ENTITY_ID,
                "find_by_id requires a non-empty id",
            ));
        }

        match self.policy {
            ReadPolicy::ForceLocal => Ok(self.ctx.cache.find_by_id(id)?),
            ReadPolicy::ForceNetwork | ReadPolicy::Both => {
                self.token.check()?;
                self.fetch_by_id(id).await
            }
            ReadPolicy::NetworkOtherwiseLocal => {
                self.token.check()?;
                match self.fetch_by_id(id).await {
                    Ok(entity) => Ok(entity),
                    Err(error) if error.is_connectivity() => {
                        Ok(self.ctx.cache.find_by_id(id)?)
                    }
                    Err(error) => Err(error),
                }
            }
        }
    }

    /// Counts the entities matching `query`.
    pub async fn count(self, query: &Query<T>) -> StoreResult<u64> {
        match self.policy {
            ReadPolicy::ForceLocal => Ok(self.ctx.cache.count_by_query(query)?),
            ReadPolicy::ForceNetwork | ReadPolicy::Both => {
                self.token.check()?;
                Ok(self
                    .ctx
                    .gateway
                    .count(&self.ctx.collection, &query.wire())
                    .await?
                    .value)
            }
            ReadPolicy::NetworkOtherwiseLocal => {
                self.token.check()?;
                match self.ctx.gateway.count(&self.ctx.collection, &query.wire()).await {
                    Ok(response) => Ok(response.value),
                    Err(error) if error.is_connectivity() => {
                        Ok(self.ctx.cache.count_by_query(query)?)
                    }
                    Err(error) => Err(error),
                }
            }
        }
    }

    /// Groups and reduces the entities matching `query`.
    pub async fn aggregate(
        self,
        reduce: ReduceFn,
        group_field: Option<&str>,
        field: &str,
        query: &Query<T>,
    ) -> StoreResult<Vec<GroupedResult>> {
        match self.policy {
            ReadPolicy::ForceLocal => Ok(self
                .ctx
                .cache
                .aggregate(reduce, group_field, field, Some(query))?),
            ReadPolicy::ForceNetwork | ReadPolicy::Both => {
                self.token.check()?;
                Ok(self
                    .ctx
                    .gateway
                    .aggregate(&self.ctx.collection, reduce, &query.wire(), group_field, field)
                    .await?
                    .value)
            }
            ReadPolicy::NetworkOtherwiseLocal => {
                self.token.check()?;
                let remote = self
                    .ctx
                    .gateway
                    .aggregate(&self.ctx.collection, reduce, &query.wire(), group_field, field)
                    .await;
                match remote {
                    Ok(response) => Ok(response.value),
                    Err(error) if error.is_connectivity() => Ok(self
                        .ctx
                        .cache
                        .aggregate(reduce, group_field, field, Some(query))?),
                    Err(error) => Err(error),
                }
            }
        }
    }

    /// Network fetch of one entity, refreshing its cache row.
    ///
    /// The network is authoritative: a hit upserts the row, a miss
    /// removes any stale local row.
    async fn fetch_by_id(&self, id: &str) -> StoreResult<Option<T>> {
        let response = self.ctx.gateway.get_by_id(&self.ctx.collection, id).await?;
        match response.value {
            Some(entity) => Ok(Some(self.ctx.cache.update(entity)?)),
            None => {
                self.ctx.cache.delete_by_id(id)?;
                Ok(None)
            }
        }
    }
}
