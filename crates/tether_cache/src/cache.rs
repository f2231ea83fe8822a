//! The logical cache contract.

use crate::error::CacheResult;
use tether_types::{Entity, GroupedResult, Query, ReduceFn};

/// Result of clearing cache rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearResult {
    /// Number of rows removed.
    pub count: u64,
    /// Ids of the removed rows.
    pub ids: Vec<String>,
}

/// Durable, keyed, per-collection local store of entities.
///
/// This is the logical contract the policy engine runs against; the
/// physical storage engine underneath is an integration concern. Ids are
/// unique within a collection. Single-row mutations (`save`, `update`,
/// `delete_by_id`, `rename_id`) are atomic, and [`refresh`](Self::refresh)
/// behaves as a batch upsert in which no entity is partially written.
///
/// On a duplicate-key [`save`](Self::save) the cache signals
/// [`CacheError::DuplicateKey`](crate::CacheError::DuplicateKey); policy
/// callers decide the fallback and never retry automatically.
pub trait EntityCache<T: Entity>: Send + Sync {
    /// Returns every entity in the collection.
    fn find_all(&self) -> CacheResult<Vec<T>>;

    /// Returns the entity stored under `id`, if any.
    fn find_by_id(&self, id: &str) -> CacheResult<Option<T>>;

    /// Returns the entities stored under `ids`, skipping missing ones.
    fn find_by_ids(&self, ids: &[String]) -> CacheResult<Vec<T>>;

    /// Returns the entities matching the query's predicate, paginated by
    /// its skip/limit modifiers.
    fn find_by_query(&self, query: &Query<T>) -> CacheResult<Vec<T>>;

    /// Returns the total number of entities in the collection.
    fn count_all(&self) -> CacheResult<u64>;

    /// Returns the number of entities matching the query's predicate.
    ///
    /// Pagination modifiers do not affect the count.
    fn count_by_query(&self, query: &Query<T>) -> CacheResult<u64>;

    /// Inserts a new entity, returning the stored value.
    ///
    /// Fails with a duplicate-key error if a row for the id exists.
    fn save(&self, entity: T) -> CacheResult<T>;

    /// Upserts an entity by its id, returning the stored value.
    fn update(&self, entity: T) -> CacheResult<T>;

    /// Atomically replaces the row keyed `old_id` with `entity` under its
    /// current id.
    ///
    /// This is the temp-id promotion primitive: one rename, never a
    /// delete followed by an insert.
    fn rename_id(&self, entity: T, old_id: &str) -> CacheResult<T>;

    /// Batch-upserts entities from the network.
    fn refresh(&self, entities: Vec<T>) -> CacheResult<Vec<T>>;

    /// Deletes the row under `id`. Returns the number of rows removed.
    fn delete_by_id(&self, id: &str) -> CacheResult<u64>;

    /// Deletes the rows under `ids`. Returns the number of rows removed.
    fn delete_by_ids(&self, ids: &[String]) -> CacheResult<u64>;

    /// Deletes the rows matching the query's predicate, returning their ids.
    fn delete_by_query(&self, query: &Query<T>) -> CacheResult<Vec<String>>;

    /// Clears the collection, or only the rows matching `query`.
    fn clear(&self, query: Option<&Query<T>>) -> CacheResult<ClearResult>;

    /// Groups and reduces the entities matching `query`.
    ///
    /// A missing `group_field` treats the whole filtered set as one group.
    fn aggregate(
        &self,
        reduce: ReduceFn,
        group_field: Option<&str>,
        field: &str,
        query: Option<&Query<T>>,
    ) -> CacheResult<Vec<GroupedResult>>;

    /// Returns true if the collection holds no entities.
    fn is_empty(&self) -> CacheResult<bool>;
}
