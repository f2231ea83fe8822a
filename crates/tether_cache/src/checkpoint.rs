//! Delta-fetch checkpoints.

use crate::error::CacheResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Checkpoint enabling incremental (delta-set) fetch.
///
/// One checkpoint exists per distinct (collection, query signature) pair.
/// `last_request` is the server-reported request-start timestamp of the
/// last successful fetch; it is opaque to the client and only ever echoed
/// back to the delta endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaCheckpoint {
    /// The collection the checkpoint belongs to.
    pub collection: String,
    /// The query signature the checkpoint was captured under.
    pub query_signature: String,
    /// Server-reported request-start timestamp of the last fetch.
    pub last_request: String,
}

impl DeltaCheckpoint {
    /// Creates a checkpoint.
    pub fn new(
        collection: impl Into<String>,
        query_signature: impl Into<String>,
        last_request: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            query_signature: query_signature.into(),
            last_request: last_request.into(),
        }
    }
}

/// Store of delta checkpoints, keyed by (collection, query signature).
pub trait CheckpointStore: Send + Sync {
    /// Returns the checkpoint for the pair, if one exists.
    fn get(&self, collection: &str, signature: &str) -> CacheResult<Option<DeltaCheckpoint>>;

    /// Inserts or replaces a checkpoint.
    fn set(&self, checkpoint: DeltaCheckpoint) -> CacheResult<()>;

    /// Deletes the checkpoint for the pair, if one exists.
    fn delete(&self, collection: &str, signature: &str) -> CacheResult<()>;

    /// Deletes every checkpoint of a collection.
    ///
    /// Called when the collection's cache is cleared: with the rows gone
    /// the checkpoints no longer describe the local state.
    fn delete_all(&self, collection: &str) -> CacheResult<()>;
}

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: RwLock<HashMap<(String, String), DeltaCheckpoint>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, collection: &str, signature: &str) -> CacheResult<Option<DeltaCheckpoint>> {
        Ok(self
            .entries
            .read()
            .get(&(collection.to_owned(), signature.to_owned()))
            .cloned())
    }

    fn set(&self, checkpoint: DeltaCheckpoint) -> CacheResult<()> {
        self.entries.write().insert(
            (checkpoint.collection.clone(), checkpoint.query_signature.clone()),
            checkpoint,
        );
        Ok(())
    }

    fn delete(&self, collection: &str, signature: &str) -> CacheResult<()> {
        self.entries
            .write()
            .remove(&(collection.to_owned(), signature.to_owned()));
        Ok(())
    }

    fn delete_all(&self, collection: &str) -> CacheResult<()> {
        self.entries
            .write()
            .retain(|(entry_collection, _), _| entry_collection != collection);
        Ok(())
    }
}
