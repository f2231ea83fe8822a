//! The pending-write queue.

use crate::action::{PendingAction, WriteVerb};
use parking_lot::Mutex;
use tether_types::is_temp_id;

struct Inner {
    entries: Vec<PendingAction>,
    next_sequence: u64,
}

/// Ordered, coalescing log of not-yet-pushed mutations.
///
/// One queue serves every collection of a client; entries carry their
/// collection tag. Sequences are monotonic and never reused, so
/// [`get_first_n`](Self::get_first_n) pagination is stable across
/// interleaved inserts.
///
/// The queue models the device-local pending log; durability of the log
/// itself is the integration's concern, the coalescing semantics live
/// here.
///
/// # Invariants
///
/// - At most one governing pending action per (collection, entity id)
/// - Entries are held in insertion order
pub struct SyncQueue {
    inner: Mutex<Inner>,
}

impl SyncQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                next_sequence: 1,
            }),
        }
    }

    /// Inserts a pending action, coalescing against the existing action
    /// for the same entity. Returns the number of entries inserted (0 or 1).
    ///
    /// Coalescing rules, keyed by (existing verb, new verb):
    ///
    /// - none, any → insert
    /// - Create, Create|Update → drop the new action (the queued create
    ///   captures the latest cache state at push time)
    /// - Update, Create → replace the update with the create
    /// - Update, Update → drop the new action
    /// - Delete, Create|Update → replace the delete (resurrection)
    /// - any, Delete → remove the existing action; the delete itself is
    ///   only inserted when the entity ever left the device (a temp id
    ///   means the backend never saw it, so nothing remains to delete)
    pub fn enqueue(&self, mut action: PendingAction) -> u64 {
        let mut inner = self.inner.lock();

        let existing = inner
            .entries
            .iter()
            .position(|e| e.collection == action.collection && e.entity_id == action.entity_id);

        match existing {
            None => {}
            Some(index) => {
                let existing_verb = inner.entries[index].verb;
                match (existing_verb, action.verb) {
                    (WriteVerb::Create, WriteVerb::Create | WriteVerb::Update)
                    | (WriteVerb::Update, WriteVerb::Update) => return 0,
                    (_, WriteVerb::Delete) => {
                        inner.entries.remove(index);
                        if is_temp_id(&action.entity_id) {
                            tracing::debug!(
                                collection = %action.collection,
                                entity = %action.entity_id,
                                "delete of an unpushed create, dropping both"
                            );
                            return 0;
                        }
                    }
                    (WriteVerb::Update, WriteVerb::Create)
                    | (WriteVerb::Delete, WriteVerb::Create | WriteVerb::Update) => {
                        inner.entries.remove(index);
                    }
                }
            }
        }

        action.sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.push(action);
        1
    }

    /// Returns the most recent pending action for a collection.
    pub fn peek(&self, collection: &str) -> Option<PendingAction> {
        self.inner
            .lock()
            .entries
            .iter()
            .rev()
            .find(|e| e.collection == collection)
            .cloned()
    }

    /// Removes and returns the most recent pending action for a collection.
    pub fn pop(&self, collection: &str) -> Option<PendingAction> {
        let mut inner = self.inner.lock();
        let index = inner
            .entries
            .iter()
            .rposition(|e| e.collection == collection)?;
        Some(inner.entries.remove(index))
    }

    /// Returns every pending action for a collection, in insertion order.
    pub fn get_all(&self, collection: &str) -> Vec<PendingAction> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.collection == collection)
            .cloned()
            .collect()
    }

    /// Returns up to `limit` actions for a collection starting at `offset`,
    /// in insertion order, optionally restricted to one verb.
    ///
    /// The offset counts filtered entries, so paging through the queue
    /// while entries are appended never skips or repeats existing rows.
    pub fn get_first_n(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
        verb: Option<WriteVerb>,
    ) -> Vec<PendingAction> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.collection == collection)
            .filter(|e| verb.map_or(true, |v| e.verb == v))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the pending action governing one entity, if any.
    pub fn get_by_entity_id(&self, collection: &str, entity_id: &str) -> Option<PendingAction> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.collection == collection && e.entity_id == entity_id)
            .cloned()
    }

    /// Removes the action governing one entity. Returns the number of
    /// entries removed; a missing entry is 0, never an error.
    pub fn remove_by_entity_id(&self, collection: &str, entity_id: &str) -> u64 {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|e| !(e.collection == collection && e.entity_id == entity_id));
        (before - inner.entries.len()) as u64
    }

    /// Removes the action with the given sequence. Returns the number of
    /// entries removed.
    pub fn remove(&self, sequence: u64) -> u64 {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.sequence != sequence);
        (before - inner.entries.len()) as u64
    }

    /// Removes every action, or every action of one collection.
    pub fn remove_all(&self, collection: Option<&str>) -> u64 {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        match collection {
            Some(collection) => inner.entries.retain(|e| e.collection != collection),
            None => inner.entries.clear(),
        }
        (before - inner.entries.len()) as u64
    }

    /// Number of pending actions, across all collections or for one.
    pub fn pending_count(&self, collection: Option<&str>) -> u64 {
        let inner = self.inner.lock();
        match collection {
            Some(collection) => inner
                .entries
                .iter()
                .filter(|e| e.collection == collection)
                .count() as u64,
            None => inner.entries.len() as u64,
        }
    }
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::new()
    }
}
