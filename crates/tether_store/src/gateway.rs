//! Network gateway abstraction.

use crate::error::{codes, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use tether_types::{Entity, GroupedResult, ReduceFn, WireQuery};

/// A value returned by the remote service, paired with the
/// server-reported request-start timestamp.
///
/// The timestamp is opaque to the client; it is only persisted as a delta
/// checkpoint and echoed back to the delta endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<V> {
    /// The response value.
    pub value: V,
    /// Server-reported request-start timestamp.
    pub request_start: String,
}

impl<V> Timestamped<V> {
    /// Creates a timestamped value.
    pub fn new(value: V, request_start: impl Into<String>) -> Self {
        Self {
            value,
            request_start: request_start.into(),
        }
    }
}

/// The changed and deleted subsets of a collection since a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct DeltaResponse<T> {
    /// Entities created or modified since the checkpoint.
    pub changed: Vec<T>,
    /// Ids of entities deleted since the checkpoint.
    pub deleted: Vec<String>,
}

/// One failed item of a multi-insert call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedError {
    /// Position of the failed entity in the submitted list.
    pub index: usize,
    /// Stable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Result of a multi-insert: a success array parallel to the input plus
/// index-keyed errors, so one bad item never fails the batch.
#[derive(Debug, Clone)]
pub struct MultiInsertResult<T> {
    /// Created entities, `None` at the positions that failed.
    pub entities: Vec<Option<T>>,
    /// Errors keyed by input position.
    pub errors: Vec<IndexedError>,
}

impl<T> Default for MultiInsertResult<T> {
    fn default() -> Self {
        Self { entities: Vec::new(), errors: Vec::new() }
    }
}

impl<T> MultiInsertResult<T> {
    /// Number of successfully created entities.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_some()).count()
    }
}

/// Handle to the remote data service.
///
/// The gateway is the transport seam: the engine issues logical calls and
/// never sees URLs, headers or retries. Every call reports the server's
/// request-start timestamp alongside its result. Implementations signal
/// connectivity-class failures as [`StoreError::Network`] and structured
/// API errors as [`StoreError::Backend`] (constructed through
/// [`StoreError::backend`] so delta protocol codes classify correctly).
#[async_trait]
pub trait NetworkGateway<T: Entity>: Send + Sync {
    /// Fetches the entities matching `query`.
    async fn get(&self, collection: &str, query: &WireQuery) -> StoreResult<Timestamped<Vec<T>>>;

    /// Fetches one entity by id.
    async fn get_by_id(&self, collection: &str, id: &str)
        -> StoreResult<Timestamped<Option<T>>>;

    /// Creates an entity; the server assigns the id.
    async fn create(&self, collection: &str, entity: &T) -> StoreResult<Timestamped<T>>;

    /// Replaces the entity stored under `id`.
    async fn update(&self, collection: &str, entity: &T, id: &str)
        -> StoreResult<Timestamped<T>>;

    /// Deletes one entity by id. Returns the number of entities deleted.
    async fn delete_by_id(&self, collection: &str, id: &str) -> StoreResult<Timestamped<u64>>;

    /// Deletes the entities matching `query`. Returns the number deleted.
    async fn delete_by_query(
        &self,
        collection: &str,
        query: &WireQuery,
    ) -> StoreResult<Timestamped<u64>>;

    /// Creates a batch of entities in one call.
    async fn multi_insert(
        &self,
        collection: &str,
        entities: Vec<T>,
    ) -> StoreResult<Timestamped<MultiInsertResult<T>>>;

    /// Counts the entities matching `query`.
    async fn count(&self, collection: &str, query: &WireQuery) -> StoreResult<Timestamped<u64>>;

    /// Fetches the delta since a checkpoint timestamp.
    async fn delta(
        &self,
        collection: &str,
        since: &str,
        query: &WireQuery,
    ) -> StoreResult<Timestamped<DeltaResponse<T>>>;

    /// Groups and reduces server-side.
    async fn aggregate(
        &self,
        collection: &str,
        reduce: ReduceFn,
        query: &WireQuery,
        group_field: Option<&str>,
        field: &str,
    ) -> StoreResult<Timestamped<Vec<GroupedResult>>>;
}

struct MockRow<T> {
    entity: T,
    modified: u64,
}

struct MockInner<T> {
    rows: BTreeMap<String, MockRow<T>>,
    deleted: Vec<(String, u64)>,
    clock: u64,
    next_id: u64,
    calls: Vec<&'static str>,
    failures: VecDeque<StoreError>,
    offline: bool,
    #[allow(clippy::type_complexity)]
    reject: Option<Box<dyn Fn(&T) -> Option<(String, String)> + Send + Sync>>,
}

/// An in-memory fake of the remote service, for tests.
///
/// The mock keeps a single backing collection, assigns `srv_<n>` ids on
/// create, stamps a logical clock on every call (the request-start
/// timestamp), and answers delta requests from its own modification log.
/// Wire filters are opaque to the engine and the mock alike: `get` and
/// `count` ignore them and honor only skip/limit.
///
/// Failure injection: [`set_offline`](Self::set_offline) makes every call
/// fail with a connectivity error; [`push_failure`](Self::push_failure)
/// queues an error consumed by the next call;
/// [`set_reject`](Self::set_reject) installs a per-item multi-insert
/// rejection. Every call is recorded for assertions via
/// [`calls`](Self::calls).
pub struct MockGateway<T: Entity> {
    inner: Mutex<MockInner<T>>,
}

impl<T: Entity> MockGateway<T> {
    /// Creates an empty mock service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockInner {
                rows: BTreeMap::new(),
                deleted: Vec::new(),
                clock: 0,
                next_id: 1,
                calls: Vec::new(),
                failures: VecDeque::new(),
                offline: false,
                reject: None,
            }),
        }
    }

    /// Preloads entities; each must already carry an id.
    pub fn seed(&self, entities: Vec<T>) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;
        for entity in entities {
            if let Some(id) = entity.entity_id() {
                let id = id.to_owned();
                inner.rows.insert(id, MockRow { entity, modified: tick });
            }
        }
    }

    /// Makes every subsequent call fail with a connectivity error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Queues an error to be returned by the next call.
    pub fn push_failure(&self, error: StoreError) {
        self.inner.lock().failures.push_back(error);
    }

    /// Installs a per-item multi-insert rejection predicate returning
    /// `(code, message)` for entities the fake backend refuses.
    pub fn set_reject(
        &self,
        reject: impl Fn(&T) -> Option<(String, String)> + Send + Sync + 'static,
    ) {
        self.inner.lock().reject = Some(Box::new(reject));
    }

    /// Names of the calls issued so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().calls.clone()
    }

    /// Number of calls issued so far.
    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Number of entities held remotely.
    pub fn remote_count(&self) -> u64 {
        self.inner.lock().rows.len() as u64
    }

    /// Returns the remote entity under `id`, if any.
    pub fn remote_get(&self, id: &str) -> Option<T> {
        self.inner.lock().rows.get(id).map(|row| row.entity.clone())
    }

    /// Upserts an entity server-side, as if another device wrote it.
    pub fn remote_update(&self, entity: T) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;
        if let Some(id) = entity.entity_id() {
            let id = id.to_owned();
            inner.rows.insert(id, MockRow { entity, modified: tick });
        }
    }

    /// Deletes an entity server-side, as if another device removed it.
    pub fn remote_delete(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;
        if inner.rows.remove(id).is_some() {
            inner.deleted.push((id.to_owned(), tick));
        }
    }

    fn timestamp(tick: u64) -> String {
        format!("ts-{tick:08}")
    }

    fn parse_timestamp(since: &str) -> Option<u64> {
        since.strip_prefix("ts-").and_then(|raw| raw.parse().ok())
    }
}

impl<T: Entity> Default for MockGateway<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MockInner<T> {
    /// Records the call, applies injected failures, advances the clock.
    fn begin(&mut self, name: &'static str) -> StoreResult<String> {
        self.calls.push(name);
        if self.offline {
            return Err(StoreError::network("ConnectionFailed", "gateway is offline"));
        }
        if let Some(error) = self.failures.pop_front() {
            return Err(error);
        }
        self.clock += 1;
        Ok(MockGateway::<T>::timestamp(self.clock))
    }

    fn assign_id(&mut self, entity: T) -> T {
        match entity.entity_id() {
            Some(_) => entity,
            None => {
                let id = format!("srv_{}", self.next_id);
                self.next_id += 1;
                entity.with_entity_id(id)
            }
        }
    }

    fn insert(&mut self, entity: T) {
        let tick = self.clock;
        if let Some(id) = entity.entity_id() {
            let id = id.to_owned();
            self.rows.insert(id, MockRow { entity, modified: tick });
        }
    }
}

#[async_trait]
impl<T: Entity> NetworkGateway<T> for MockGateway<T> {
    async fn get(&self, _collection: &str, query: &WireQuery) -> StoreResult<Timestamped<Vec<T>>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("get")?;

        let skip = query.skip.unwrap_or(0) as usize;
        let mut entities: Vec<T> = inner
            .rows
            .values()
            .map(|row| row.entity.clone())
            .skip(skip)
            .collect();
        if let Some(limit) = query.limit {
            entities.truncate(limit as usize);
        }
        Ok(Timestamped::new(entities, ts))
    }

    async fn get_by_id(
        &self,
        _collection: &str,
        id: &str,
    ) -> StoreResult<Timestamped<Option<T>>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("get_by_id")?;
        let entity = inner.rows.get(id).map(|row| row.entity.clone());
        Ok(Timestamped::new(entity, ts))
    }

    async fn create(&self, _collection: &str, entity: &T) -> StoreResult<Timestamped<T>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("create")?;
        let entity = inner.assign_id(entity.clone());
        inner.insert(entity.clone());
        Ok(Timestamped::new(entity, ts))
    }

    async fn update(
        &self,
        _collection: &str,
        entity: &T,
        id: &str,
    ) -> StoreResult<Timestamped<T>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("update")?;
        let entity = entity.clone().with_entity_id(id);
        inner.insert(entity.clone());
        Ok(Timestamped::new(entity, ts))
    }

    async fn delete_by_id(&self, _collection: &str, id: &str) -> StoreResult<Timestamped<u64>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("delete_by_id")?;
        let tick = inner.clock;
        let removed = inner.rows.remove(id).is_some();
        if removed {
            inner.deleted.push((id.to_owned(), tick));
        }
        Ok(Timestamped::new(u64::from(removed), ts))
    }

    async fn delete_by_query(
        &self,
        _collection: &str,
        _query: &WireQuery,
    ) -> StoreResult<Timestamped<u64>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("delete_by_query")?;
        let tick = inner.clock;
        let doomed: Vec<String> = inner.rows.keys().cloned().collect();
        for id in &doomed {
            inner.rows.remove(id);
            inner.deleted.push((id.clone(), tick));
        }
        Ok(Timestamped::new(doomed.len() as u64, ts))
    }

    async fn multi_insert(
        &self,
        _collection: &str,
        entities: Vec<T>,
    ) -> StoreResult<Timestamped<MultiInsertResult<T>>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("multi_insert")?;

        let mut result = MultiInsertResult::default();
        for (index, entity) in entities.into_iter().enumerate() {
            let rejection = inner.reject.as_ref().and_then(|reject| reject(&entity));
            match rejection {
                Some((code, message)) => {
                    result.entities.push(None);
                    result.errors.push(IndexedError { index, code, message });
                }
                None => {
                    let entity = inner.assign_id(entity);
                    inner.insert(entity.clone());
                    result.entities.push(Some(entity));
                }
            }
        }
        Ok(Timestamped::new(result, ts))
    }

    async fn count(&self, _collection: &str, _query: &WireQuery) -> StoreResult<Timestamped<u64>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("count")?;
        let count = inner.rows.len() as u64;
        Ok(Timestamped::new(count, ts))
    }

    async fn delta(
        &self,
        _collection: &str,
        since: &str,
        _query: &WireQuery,
    ) -> StoreResult<Timestamped<DeltaResponse<T>>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("delta")?;

        let since_tick = Self::parse_timestamp(since).ok_or_else(|| {
            StoreError::backend(
                codes::PARAMETER_VALUE_OUT_OF_RANGE,
                format!("unparseable since timestamp: {since}"),
            )
        })?;

        let changed: Vec<T> = inner
            .rows
            .values()
            .filter(|row| row.modified > since_tick)
            .map(|row| row.entity.clone())
            .collect();
        let deleted: Vec<String> = inner
            .deleted
            .iter()
            .filter(|(_, tick)| *tick > since_tick)
            .map(|(id, _)| id.clone())
            .collect();

        Ok(Timestamped::new(DeltaResponse { changed, deleted }, ts))
    }

    async fn aggregate(
        &self,
        _collection: &str,
        reduce: ReduceFn,
        _query: &WireQuery,
        group_field: Option<&str>,
        field: &str,
    ) -> StoreResult<Timestamped<Vec<GroupedResult>>> {
        let mut inner = self.inner.lock();
        let ts = inner.begin("aggregate")?;
        let entities: Vec<T> = inner.rows.values().map(|row| row.entity.clone()).collect();
        let groups = tether_cache::aggregate_entities(&entities, reduce, group_field, field);
        Ok(Timestamped::new(groups, ts))
    }
}
