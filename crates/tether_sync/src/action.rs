//! Pending write actions.

use serde_json::Value;

/// The verb of a pending mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteVerb {
    /// The entity was created locally and must be POSTed.
    Create,
    /// The entity was modified locally and must be PUT.
    Update,
    /// The entity was deleted locally and must be DELETEd.
    Delete,
}

/// A queued, not-yet-synchronized mutation against one entity.
///
/// An action never stores the entity payload, only the entity reference
/// and the verb. A `Create` reads the latest cache row at push time, so
/// edits made after enqueueing ride along with the original create.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Monotonic insertion key; orders the queue.
    pub sequence: u64,
    /// The collection the entity belongs to.
    pub collection: String,
    /// The id of the entity the action governs.
    pub entity_id: String,
    /// The mutation verb.
    pub verb: WriteVerb,
    /// Opaque request state captured at enqueue time.
    pub state: Option<Value>,
}

impl PendingAction {
    /// Creates an action with an unassigned sequence.
    ///
    /// The queue assigns the sequence on insert.
    pub fn new(
        collection: impl Into<String>,
        entity_id: impl Into<String>,
        verb: WriteVerb,
    ) -> Self {
        Self {
            sequence: 0,
            collection: collection.into(),
            entity_id: entity_id.into(),
            verb,
            state: None,
        }
    }

    /// Attaches opaque captured state.
    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_action_has_no_sequence() {
        let action = PendingAction::new("books", "e1", WriteVerb::Update);
        assert_eq!(action.sequence, 0);
        assert_eq!(action.collection, "books");
        assert_eq!(action.entity_id, "e1");
        assert_eq!(action.state, None);
    }

    #[test]
    fn state_is_opaque() {
        let action = PendingAction::new("books", "e1", WriteVerb::Create)
            .with_state(serde_json::json!({"route": "POST /books"}));
        assert!(action.state.unwrap().get("route").is_some());
    }
}
