//! Bounded-concurrency bulk pull.

use crate::context::RequestContext;
use crate::error::{codes, StoreError, StoreResult};
use crate::token::CancellationToken;
use std::sync::Arc;
use tether_types::{Entity, Query};
use tokio::sync::mpsc;

/// One page that failed to fetch during a pull.
///
/// Failed pages are logged and aggregated here instead of failing the
/// pull; callers detect an under-pull by comparing `pulled_count` with
/// `total_count` or inspecting this list.
#[derive(Debug)]
pub struct PullPageError {
    /// Offset of the failed page.
    pub skip: u64,
    /// Size of the failed page.
    pub limit: u64,
    /// What went wrong.
    pub error: StoreError,
}

/// Result of a bulk pull.
#[derive(Debug)]
pub struct PullResult<T> {
    /// Total number of matching entities reported by the backend (or
    /// supplied by the caller).
    pub total_count: u64,
    /// Number of entities actually fetched and applied to the cache.
    pub pulled_count: u64,
    /// The fetched entities, in page-completion order.
    pub entities: Vec<T>,
    /// Pages that failed to fetch.
    pub page_errors: Vec<PullPageError>,
}

impl<T> PullResult<T> {
    fn empty(total_count: u64) -> Self {
        Self {
            total_count,
            pulled_count: 0,
            entities: Vec::new(),
            page_errors: Vec::new(),
        }
    }
}

/// A bulk-pull request: reconciles the whole queried scope into the cache.
///
/// The total count is split into fixed-size pages whose fetch tasks all
/// run concurrently; a single consumer drains a bounded channel of
/// completed pages in first-completed order and applies each to the
/// cache. A full channel blocks the producers, which is the pull's
/// backpressure bound. Result ordering across pages is not guaranteed,
/// only cache convergence.
pub(crate) struct PullRequest<T: Entity> {
    ctx: RequestContext<T>,
    token: CancellationToken,
    query: Query<T>,
    expected_count: Option<u64>,
    is_initial: bool,
}

impl<T: Entity> PullRequest<T> {
    pub fn new(
        ctx: RequestContext<T>,
        token: CancellationToken,
        query: Query<T>,
        expected_count: Option<u64>,
        is_initial: bool,
    ) -> Self {
        Self {
            ctx,
            token,
            query,
            expected_count,
            is_initial,
        }
    }

    pub async fn execute(self) -> StoreResult<PullResult<T>> {
        // Un-pushed local writes would be clobbered by the incoming
        // pages; the queue must be drained first.
        if self.ctx.queue.pending_count(Some(&self.ctx.collection)) > 0 {
            return Err(StoreError::invalid_operation(
                codes::PENDING_WRITES_EXIST,
                "push pending writes before pulling",
            ));
        }
        self.token.check()?;

        let total = match self.expected_count {
            Some(count) => count,
            None => {
                self.ctx
                    .gateway
                    .count(&self.ctx.collection, &self.query.wire())
                    .await?
                    .value
            }
        };
        let mut result = PullResult::empty(total);
        if total == 0 {
            return Ok(result);
        }

        let pure_insert = self.is_initial && self.ctx.cache.is_empty()?;
        let page_size = self.ctx.config.pull_page_size;
        let (tx, mut rx) =
            mpsc::channel::<(u64, u64, StoreResult<Vec<T>>)>(self.ctx.config.pull_channel_capacity);

        let mut offset = 0u64;
        while offset < total {
            let limit = page_size.min(total - offset);
            let gateway = Arc::clone(&self.ctx.gateway);
            let collection = self.ctx.collection.clone();
            let token = self.token.clone();
            let tx = tx.clone();
            let mut wire = self.query.wire();
            wire.skip = Some(offset);
            wire.limit = Some(limit);

            tokio::spawn(async move {
                let outcome = if token.is_cancelled() {
                    Err(StoreError::Cancelled)
                } else {
                    gateway.get(&collection, &wire).await.map(|ts| ts.value)
                };
                // A closed channel only means the consumer gave up.
                let _ = tx.send((offset, limit, outcome)).await;
            });

            offset += limit;
        }
        drop(tx);

        while let Some((skip, limit, outcome)) = rx.recv().await {
            match outcome {
                Ok(entities) => {
                    let applied = self.apply_page(entities, pure_insert)?;
                    result.pulled_count += applied.len() as u64;
                    result.entities.extend(applied);
                }
                Err(error) => {
                    tracing::warn!(
                        collection = %self.ctx.collection,
                        skip,
                        limit,
                        %error,
                        "pull page failed"
                    );
                    result.page_errors.push(PullPageError { skip, limit, error });
                }
            }
        }

        Ok(result)
    }

    /// Applies one completed page to the cache.
    ///
    /// An initial pull against an empty cache inserts; anything else is
    /// an upsert merge. Cache failures abort the pull, they are not page
    /// errors.
    fn apply_page(&self, entities: Vec<T>, pure_insert: bool) -> StoreResult<Vec<T>> {
        if pure_insert {
            let mut stored = Vec::with_capacity(entities.len());
            for entity in entities {
                stored.push(self.ctx.cache.save(entity)?);
            }
            Ok(stored)
        } else {
            Ok(self.ctx.cache.refresh(entities)?)
        }
    }
}
