//! In-memory cache implementation.

use crate::aggregate::aggregate_entities;
use crate::cache::{ClearResult, EntityCache};
use crate::error::{CacheError, CacheResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tether_types::{Entity, GroupedResult, Query, ReduceFn};

/// The reference [`EntityCache`] implementation.
///
/// Rows live in a `BTreeMap` keyed by entity id behind a single `RwLock`,
/// which gives every contract operation single-call atomicity. One
/// `MemoryCache` holds one collection.
#[derive(Debug)]
pub struct MemoryCache<T: Entity> {
    collection: String,
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T: Entity> MemoryCache<T> {
    /// Creates an empty cache for `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn require_id(entity: &T) -> CacheResult<String> {
        entity
            .entity_id()
            .map(str::to_owned)
            .ok_or(CacheError::MissingId)
    }
}

impl<T: Entity> EntityCache<T> for MemoryCache<T> {
    fn find_all(&self) -> CacheResult<Vec<T>> {
        Ok(self.rows.read().values().cloned().collect())
    }

    fn find_by_id(&self, id: &str) -> CacheResult<Option<T>> {
        Ok(self.rows.read().get(id).cloned())
    }

    fn find_by_ids(&self, ids: &[String]) -> CacheResult<Vec<T>> {
        let rows = self.rows.read();
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    fn find_by_query(&self, query: &Query<T>) -> CacheResult<Vec<T>> {
        let matched: Vec<T> = self
            .rows
            .read()
            .values()
            .filter(|entity| query.matches(entity))
            .cloned()
            .collect();
        Ok(query.paginate(matched))
    }

    fn count_all(&self) -> CacheResult<u64> {
        Ok(self.rows.read().len() as u64)
    }

    fn count_by_query(&self, query: &Query<T>) -> CacheResult<u64> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|entity| query.matches(entity))
            .count() as u64)
    }

    fn save(&self, entity: T) -> CacheResult<T> {
        let id = Self::require_id(&entity)?;
        let mut rows = self.rows.write();
        if rows.contains_key(&id) {
            return Err(CacheError::duplicate_key(id));
        }
        rows.insert(id, entity.clone());
        Ok(entity)
    }

    fn update(&self, entity: T) -> CacheResult<T> {
        let id = Self::require_id(&entity)?;
        self.rows.write().insert(id, entity.clone());
        Ok(entity)
    }

    fn rename_id(&self, entity: T, old_id: &str) -> CacheResult<T> {
        let new_id = Self::require_id(&entity)?;
        let mut rows = self.rows.write();
        rows.remove(old_id);
        rows.insert(new_id, entity.clone());
        Ok(entity)
    }

    fn refresh(&self, entities: Vec<T>) -> CacheResult<Vec<T>> {
        let mut stored = Vec::with_capacity(entities.len());
        let mut rows = self.rows.write();
        for entity in entities {
            let id = Self::require_id(&entity)?;
            rows.insert(id, entity.clone());
            stored.push(entity);
        }
        Ok(stored)
    }

    fn delete_by_id(&self, id: &str) -> CacheResult<u64> {
        Ok(u64::from(self.rows.write().remove(id).is_some()))
    }

    fn delete_by_ids(&self, ids: &[String]) -> CacheResult<u64> {
        let mut rows = self.rows.write();
        Ok(ids
            .iter()
            .filter(|id| rows.remove(id.as_str()).is_some())
            .count() as u64)
    }

    fn delete_by_query(&self, query: &Query<T>) -> CacheResult<Vec<String>> {
        let mut rows = self.rows.write();
        let doomed: Vec<String> = rows
            .iter()
            .filter(|(_, entity)| query.matches(entity))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            rows.remove(id);
        }
        Ok(doomed)
    }

    fn clear(&self, query: Option<&Query<T>>) -> CacheResult<ClearResult> {
        let ids = match query {
            Some(query) => self.delete_by_query(query)?,
            None => {
                let mut rows = self.rows.write();
                let ids: Vec<String> = rows.keys().cloned().collect();
                rows.clear();
                ids
            }
        };
        tracing::debug!(collection = %self.collection, removed = ids.len(), "cache cleared");
        Ok(ClearResult {
            count: ids.len() as u64,
            ids,
        })
    }

    fn aggregate(
        &self,
        reduce: ReduceFn,
        group_field: Option<&str>,
        field: &str,
        query: Option<&Query<T>>,
    ) -> CacheResult<Vec<GroupedResult>> {
        let entities: Vec<T> = self
            .rows
            .read()
            .values()
            .filter(|entity| query.map_or(true, |q| q.matches(entity)))
            .cloned()
            .collect();
        Ok(aggregate_entities(&entities, reduce, group_field, field))
    }

    fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.rows.read().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::Document;

    fn doc(id: &str, score: i64) -> Document {
        Document::new().with_entity_id(id).with_field("score", score)
    }

    fn seeded() -> MemoryCache<Document> {
        let cache = MemoryCache::new("items");
        for i in 0..5 {
            cache.save(doc(&format!("e{i}"), i)).unwrap();
        }
        cache
    }

    #[test]
    fn save_then_find() {
        let cache = MemoryCache::new("items");
        cache.save(doc("e1", 1)).unwrap();

        let found = cache.find_by_id("e1").unwrap().unwrap();
        assert_eq!(found.entity_id(), Some("e1"));
        assert!(!cache.is_empty().unwrap());
    }

    #[test]
    fn save_duplicate_is_an_error() {
        let cache = MemoryCache::new("items");
        cache.save(doc("e1", 1)).unwrap();

        let err = cache.save(doc("e1", 2)).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateKey { .. }));
        // The original row is untouched.
        let row = cache.find_by_id("e1").unwrap().unwrap();
        assert_eq!(row.field("score"), Some(&1.into()));
    }

    #[test]
    fn save_without_id_is_an_error() {
        let cache: MemoryCache<Document> = MemoryCache::new("items");
        let err = cache.save(Document::new()).unwrap_err();
        assert!(matches!(err, CacheError::MissingId));
    }

    #[test]
    fn update_upserts() {
        let cache = MemoryCache::new("items");
        cache.update(doc("e1", 1)).unwrap();
        cache.update(doc("e1", 9)).unwrap();

        assert_eq!(cache.count_all().unwrap(), 1);
        let row = cache.find_by_id("e1").unwrap().unwrap();
        assert_eq!(row.field("score"), Some(&9.into()));
    }

    #[test]
    fn rename_id_moves_the_row() {
        let cache = MemoryCache::new("items");
        cache.save(doc("temp_1", 1)).unwrap();

        cache.rename_id(doc("real_1", 1), "temp_1").unwrap();

        assert!(cache.find_by_id("temp_1").unwrap().is_none());
        assert!(cache.find_by_id("real_1").unwrap().is_some());
        assert_eq!(cache.count_all().unwrap(), 1);
    }

    #[test]
    fn find_by_query_applies_predicate_and_paging() {
        let cache = seeded();
        let query = Query::all()
            .with_predicate(|d: &Document| {
                d.field("score").and_then(|v| v.as_i64()).unwrap_or(0) >= 1
            })
            .skip(1)
            .limit(2);

        let found = cache.find_by_query(&query).unwrap();
        assert_eq!(found.len(), 2);
        // Count ignores pagination.
        assert_eq!(cache.count_by_query(&query).unwrap(), 4);
    }

    #[test]
    fn find_by_ids_skips_missing() {
        let cache = seeded();
        let found = cache
            .find_by_ids(&["e0".into(), "nope".into(), "e3".into()])
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn refresh_batch_upserts() {
        let cache = seeded();
        cache.refresh(vec![doc("e0", 100), doc("new", 7)]).unwrap();

        assert_eq!(cache.count_all().unwrap(), 6);
        let row = cache.find_by_id("e0").unwrap().unwrap();
        assert_eq!(row.field("score"), Some(&100.into()));
    }

    #[test]
    fn delete_variants_report_counts() {
        let cache = seeded();

        assert_eq!(cache.delete_by_id("e0").unwrap(), 1);
        assert_eq!(cache.delete_by_id("e0").unwrap(), 0);
        assert_eq!(cache.delete_by_ids(&["e1".into(), "gone".into()]).unwrap(), 1);

        let ids = cache
            .delete_by_query(&Query::all().with_predicate(|d: &Document| {
                d.field("score").and_then(|v| v.as_i64()).unwrap_or(0) >= 4
            }))
            .unwrap();
        assert_eq!(ids, vec!["e4".to_string()]);
        assert_eq!(cache.count_all().unwrap(), 2);
    }

    #[test]
    fn clear_everything() {
        let cache = seeded();
        let cleared = cache.clear(None).unwrap();
        assert_eq!(cleared.count, 5);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn clear_scoped_by_query() {
        let cache = seeded();
        let query = Query::all().with_predicate(|d: &Document| {
            d.field("score").and_then(|v| v.as_i64()).unwrap_or(0) < 2
        });

        let cleared = cache.clear(Some(&query)).unwrap();
        assert_eq!(cleared.count, 2);
        assert_eq!(cache.count_all().unwrap(), 3);
    }

    #[test]
    fn aggregate_sums_matching_rows() {
        let cache = seeded();
        let groups = cache.aggregate(ReduceFn::Sum, None, "score", None).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].value, 10.0);
    }
}
