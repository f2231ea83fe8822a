//! Error types for the cache layer.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur in the local cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// An insert collided with an existing row for the same id.
    #[error("duplicate key: entity {id} already exists in collection")]
    DuplicateKey {
        /// The colliding entity id.
        id: String,
    },

    /// The entity carries no id, so it cannot be keyed.
    #[error("entity has no id assigned")]
    MissingId,

    /// The backing store failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl CacheError {
    /// Creates a duplicate-key error.
    pub fn duplicate_key(id: impl Into<String>) -> Self {
        Self::DuplicateKey { id: id.into() }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// The stable code identifying this error kind.
    ///
    /// Callers branch on codes, never on message text.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::DuplicateKey { .. } => "DuplicateKey",
            CacheError::MissingId => "MissingId",
            CacheError::Storage { .. } => "Storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(CacheError::duplicate_key("e1").code(), "DuplicateKey");
        assert_eq!(CacheError::MissingId.code(), "MissingId");
        assert_eq!(CacheError::storage("disk full").code(), "Storage");
    }

    #[test]
    fn display_names_the_entity() {
        let err = CacheError::duplicate_key("e1");
        assert!(err.to_string().contains("e1"));
    }
}
