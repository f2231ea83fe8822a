//! End-to-end tests: real stores wired against the in-memory gateway.

use std::sync::Arc;
use tether_store::{
    codes, CancellationToken, Client, DataStore, ErrorCategory, MockGateway, StoreConfig,
    StoreError, StoreType,
};
use tether_types::{is_temp_id, Document, Entity, ReduceFn};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn item(category: &str, qty: i64) -> Document {
    Document::new()
        .with_field("category", category)
        .with_field("qty", qty)
}

struct Fixture {
    client: Client,
    gateway: Arc<MockGateway<Document>>,
    token: CancellationToken,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        Self {
            client: Client::new(),
            gateway: Arc::new(MockGateway::new()),
            token: CancellationToken::new(),
        }
    }

    fn store(&self, collection: &str, store_type: StoreType) -> DataStore<Document> {
        self.store_with(collection, store_type, StoreConfig::new())
    }

    fn store_with(
        &self,
        collection: &str,
        store_type: StoreType,
        config: StoreConfig,
    ) -> DataStore<Document> {
        self.client
            .data_store::<Document, _>(collection, store_type, Arc::clone(&self.gateway), config)
            .unwrap()
    }
}

#[tokio::test]
async fn offline_first_save_then_push() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Sync);

    for i in 0..10 {
        let saved = store
            .save(Document::new().with_field("i", i), &fx.token)
            .await
            .unwrap();
        assert!(is_temp_id(saved.entity_id().unwrap()));
    }

    assert_eq!(store.pending_count(false), 10);
    assert_eq!(fx.gateway.call_count(), 0);

    let pushed = store.push(&fx.token).await.unwrap();

    assert_eq!(pushed.pushed_count, 10);
    assert!(pushed.errors.is_empty());
    assert_eq!(store.pending_count(false), 0);
    assert_eq!(fx.gateway.remote_count(), 10);

    // Every cache row is keyed by its server-assigned id; no temp row
    // remains.
    let local = store.find(None, &fx.token).await.unwrap();
    assert_eq!(local.len(), 10);
    for entity in &local {
        assert!(!is_temp_id(entity.entity_id().unwrap()));
    }
}

#[tokio::test]
async fn pull_refuses_while_writes_are_pending() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Sync);

    store.save(Document::new(), &fx.token).await.unwrap();
    assert!(store.pending_count(false) > 0);

    let err = store.pull(None, None, false, &fx.token).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::InvalidOperation);
    assert_eq!(err.code(), codes::PENDING_WRITES_EXIST);
    assert_eq!(fx.gateway.call_count(), 0);
}

#[tokio::test]
async fn pull_and_push_are_invalid_on_a_network_store() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Network);

    let err = store.pull(None, None, false, &fx.token).await.unwrap_err();
    assert_eq!(err.code(), codes::PULL_NOT_SUPPORTED);

    let err = store.push(&fx.token).await.unwrap_err();
    assert_eq!(err.code(), codes::PUSH_NOT_SUPPORTED);

    assert_eq!(fx.gateway.call_count(), 0);
}

#[tokio::test]
async fn delta_round_trip_patches_the_cache() {
    let fx = Fixture::new();
    let store = fx.store_with(
        "books",
        StoreType::Cache,
        StoreConfig::new().with_delta_set(true),
    );

    fx.gateway.seed(
        (0..100)
            .map(|i| Document::new().with_entity_id(format!("e{i:03}")).with_field("v", 0))
            .collect(),
    );

    // First read: full fetch, checkpoint captured.
    let first = store.find(None, &fx.token).await.unwrap();
    assert_eq!(first.len(), 100);

    // Server-side churn: two edits, one brand-new entity, two deletes.
    fx.gateway
        .remote_update(Document::new().with_entity_id("e001").with_field("v", 1));
    fx.gateway
        .remote_update(Document::new().with_entity_id("e002").with_field("v", 1));
    fx.gateway
        .remote_update(Document::new().with_entity_id("brand-new").with_field("v", 1));
    fx.gateway.remote_delete("e050");
    fx.gateway.remote_delete("e051");

    let second = store.find(None, &fx.token).await.unwrap();

    // 100 - 2 deleted + 1 new id among the changed set.
    assert_eq!(second.len(), 99);
    // The wire carried only the delta; the result was re-materialized
    // from the patched cache.
    let calls = fx.gateway.calls();
    assert_eq!(calls.iter().filter(|c| **c == "delta").count(), 1);
    assert_eq!(calls.iter().filter(|c| **c == "get").count(), 1);

    let edited = second
        .iter()
        .find(|e| e.entity_id() == Some("e001"))
        .unwrap();
    assert_eq!(edited.field("v"), Some(&1.into()));
    assert!(second.iter().all(|e| e.entity_id() != Some("e050")));
}

#[tokio::test]
async fn group_and_aggregate_sums_per_category() {
    let fx = Fixture::new();
    let store = fx.store("inventory", StoreType::Sync);

    for entity in [item("a", 1), item("a", 2), item("b", 5)] {
        store.save(entity, &fx.token).await.unwrap();
    }

    let groups = store
        .group_and_aggregate(ReduceFn::Sum, Some("category"), Some("qty"), None, &fx.token)
        .await
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, Some("a".into()));
    assert_eq!(groups[0].value, 3.0);
    assert_eq!(groups[1].key, Some("b".into()));
    assert_eq!(groups[1].value, 5.0);

    // An empty collection aggregates to an empty list, not an error.
    let empty = fx.store("nothing", StoreType::Sync);
    let groups = empty
        .group_and_aggregate(ReduceFn::Sum, Some("category"), Some("qty"), None, &fx.token)
        .await
        .unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn aggregate_without_a_field_is_only_valid_for_count() {
    let fx = Fixture::new();
    let store = fx.store("inventory", StoreType::Sync);
    store.save(item("a", 1), &fx.token).await.unwrap();

    let counted = store
        .group_and_aggregate(ReduceFn::Count, Some("category"), None, None, &fx.token)
        .await
        .unwrap();
    assert_eq!(counted[0].value, 1.0);

    let err = store
        .group_and_aggregate(ReduceFn::Sum, Some("category"), None, None, &fx.token)
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::MISSING_AGGREGATE_FIELD);
}

#[tokio::test]
async fn auto_store_rides_out_an_outage() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Auto);

    // Offline: the save fails over the wire but survives locally.
    fx.gateway.set_offline(true);
    let err = store
        .save(Document::new().with_field("title", "1984"), &fx.token)
        .await
        .unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(store.pending_count(false), 1);

    // Offline reads degrade to the cache.
    let found = store.find(None, &fx.token).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(is_temp_id(found[0].entity_id().unwrap()));

    // Back online: sync pushes the create, then pulls the scope.
    fx.gateway.set_offline(false);
    let outcome = store.sync(None, &fx.token).await.unwrap();

    assert_eq!(outcome.push.pushed_count, 1);
    let pulled = outcome.pull.expect("queue drained, pull must run");
    assert_eq!(pulled.total_count, 1);
    assert_eq!(store.pending_count(false), 0);

    let local = store.find(None, &fx.token).await.unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].entity_id(), Some("srv_1"));
    assert_eq!(fx.gateway.remote_count(), 1);
}

#[tokio::test]
async fn sync_skips_the_pull_when_actions_remain() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Sync);

    store.save(Document::new(), &fx.token).await.unwrap();
    fx.gateway.set_offline(true);

    let outcome = store.sync(None, &fx.token).await.unwrap();

    assert_eq!(outcome.push.pushed_count, 0);
    assert_eq!(outcome.push.errors.len(), 1);
    assert!(outcome.pull.is_none());
    assert_eq!(store.pending_count(false), 1);
}

#[tokio::test]
async fn cache_store_delivers_local_results_first() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Cache);
    fx.gateway.seed(vec![
        Document::new().with_entity_id("e1"),
        Document::new().with_entity_id("e2"),
    ]);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let found = store
        .find_with_cached(None, tx, &fx.token)
        .await
        .unwrap();

    // Nothing was cached yet; the listener saw the empty local state
    // before the network answered.
    assert_eq!(rx.recv().await.unwrap().len(), 0);
    assert_eq!(found.len(), 2);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let found = store
        .find_with_cached(None, tx, &fx.token)
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap().len(), 2);
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn paged_pull_converges_with_partial_failures() {
    let fx = Fixture::new();
    let store = fx.store_with(
        "books",
        StoreType::Sync,
        StoreConfig::new()
            .with_pull_page_size(10)
            .with_pull_channel_capacity(2),
    );
    fx.gateway.seed(
        (0..45)
            .map(|i| Document::new().with_entity_id(format!("e{i:03}")))
            .collect(),
    );

    let result = store.pull(None, None, true, &fx.token).await.unwrap();
    assert_eq!(result.total_count, 45);
    assert_eq!(result.pulled_count, 45);
    assert_eq!(store.find(None, &fx.token).await.unwrap().len(), 45);

    // A flaky page under-pulls but reports itself.
    fx.gateway.remote_update(Document::new().with_entity_id("e045"));
    fx.gateway
        .push_failure(StoreError::network("Timeout", "request timed out"));
    let result = store.pull(None, Some(46), false, &fx.token).await.unwrap();

    assert_eq!(result.page_errors.len(), 1);
    assert!(result.pulled_count < result.total_count);
}

#[tokio::test]
async fn remove_propagates_through_push() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Sync);
    fx.gateway.seed(vec![Document::new().with_entity_id("e1")]);

    // Materialize locally, then delete offline.
    store.pull(None, None, true, &fx.token).await.unwrap();
    let removed = store.remove_by_id("e1", &fx.token).await.unwrap();
    assert_eq!(removed.count, 1);
    assert_eq!(store.pending_count(false), 1);
    assert_eq!(fx.gateway.remote_count(), 1);

    let pushed = store.push(&fx.token).await.unwrap();
    assert_eq!(pushed.pushed_count, 1);
    assert_eq!(fx.gateway.remote_count(), 0);
}

#[tokio::test]
async fn clear_local_resets_cache_queue_and_checkpoints() {
    let fx = Fixture::new();
    let store = fx.store_with(
        "books",
        StoreType::Cache,
        StoreConfig::new().with_delta_set(true),
    );
    fx.gateway.seed(vec![Document::new().with_entity_id("e1")]);

    // Capture a checkpoint, then create some local-only state.
    store.find(None, &fx.token).await.unwrap();
    fx.client
        .queue()
        .enqueue(tether_sync::PendingAction::new(
            "books",
            "e1",
            tether_sync::WriteVerb::Update,
        ));

    let cleared = store.clear_local(None).unwrap();
    assert_eq!(cleared.count, 1);
    assert_eq!(store.pending_count(false), 0);

    // With cache and checkpoints gone, the next read is a full fetch.
    store.find(None, &fx.token).await.unwrap();
    let calls = fx.gateway.calls();
    assert_eq!(calls.iter().filter(|c| **c == "delta").count(), 0);
    assert_eq!(calls.iter().filter(|c| **c == "get").count(), 2);
}

#[tokio::test]
async fn save_batch_round_trip() {
    let fx = Fixture::new();
    let store = fx.store_with(
        "books",
        StoreType::Auto,
        StoreConfig::new().with_multi_insert_batch_size(4),
    );

    let entities: Vec<Document> = (0..10).map(|i| Document::new().with_field("i", i)).collect();
    let result = store.save_batch(entities, &fx.token).await.unwrap();

    assert_eq!(result.success_count(), 10);
    assert!(result.errors.is_empty());
    assert_eq!(fx.gateway.remote_count(), 10);
    assert_eq!(store.pending_count(false), 0);
    // 10 entities in batches of 4: three barrier-joined calls.
    assert_eq!(
        fx.gateway.calls().iter().filter(|c| **c == "multi_insert").count(),
        3
    );
}

#[tokio::test]
async fn cancellation_stops_before_the_wire() {
    let fx = Fixture::new();
    let store = fx.store("books", StoreType::Network);

    let token = CancellationToken::new();
    token.cancel();

    let err = store.find(None, &token).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Cancelled);
    assert_eq!(fx.gateway.call_count(), 0);
}
