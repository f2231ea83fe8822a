//! Delta-set network fetch.

use crate::context::RequestContext;
use crate::error::{ErrorCategory, StoreResult};
use tether_cache::DeltaCheckpoint;
use tether_types::{Entity, Query};

/// Fetches the queried scope from the network, using the delta-set
/// protocol when it applies, and refreshes the cache with the result.
///
/// Delta applies only when enabled in the store configuration, the query
/// carries no pagination modifiers, a checkpoint exists for the exact
/// (collection, query signature), and the cache is non-empty. Outside
/// those conditions this is a plain full fetch.
///
/// A full fetch clears the matching cache scope and upserts the results;
/// a delta fetch patches the cache with the changed/deleted sets and
/// re-materializes the result from the cache, since the wire payload
/// contains only the changed subset. Either way the returned list is the
/// logically-complete result for the query.
pub(crate) async fn fetch_network<T: Entity>(
    ctx: &RequestContext<T>,
    query: &Query<T>,
) -> StoreResult<Vec<T>> {
    let eligible = ctx.config.delta_set_enabled && !query.is_paged();
    if !eligible {
        return full_fetch(ctx, query, false).await;
    }

    let signature = query.signature();
    let checkpoint = ctx.checkpoints.get(&ctx.collection, &signature)?;
    let checkpoint = match checkpoint {
        Some(checkpoint) if !ctx.cache.is_empty()? => checkpoint,
        _ => return full_fetch(ctx, query, true).await,
    };

    match ctx
        .gateway
        .delta(&ctx.collection, &checkpoint.last_request, &query.wire())
        .await
    {
        Ok(response) => {
            let delta = response.value;
            ctx.cache.delete_by_ids(&delta.deleted)?;
            ctx.cache.refresh(delta.changed)?;
            ctx.checkpoints.set(DeltaCheckpoint::new(
                &ctx.collection,
                &signature,
                response.request_start,
            ))?;
            Ok(ctx.cache.find_by_query(query)?)
        }
        Err(error) if error.category() == ErrorCategory::Protocol => {
            // The server cannot serve this delta (window expired, result
            // set too large, feature unconfigured). Degrade to a full
            // fetch with a fresh checkpoint; the caller never sees it.
            tracing::warn!(
                collection = %ctx.collection,
                code = error.code(),
                "delta fetch degraded to full fetch"
            );
            ctx.checkpoints.delete(&ctx.collection, &signature)?;
            full_fetch(ctx, query, true).await
        }
        Err(error) => Err(error),
    }
}

async fn full_fetch<T: Entity>(
    ctx: &RequestContext<T>,
    query: &Query<T>,
    capture_checkpoint: bool,
) -> StoreResult<Vec<T>> {
    let response = ctx.gateway.get(&ctx.collection, &query.wire()).await?;

    // The network is authoritative for the queried scope: clear the
    // matching rows, then upsert what came back. A paged fetch sees only
    // one slice of the scope, so it must not clear the rest.
    if !query.is_paged() {
        ctx.cache.clear(Some(query))?;
    }
    ctx.cache.refresh(response.value.clone())?;

    if capture_checkpoint {
        ctx.checkpoints.set(DeltaCheckpoint::new(
            &ctx.collection,
            query.signature(),
            response.request_start,
        ))?;
    }

    Ok(response.value)
}
