//! Error types for the store engine.

use tether_cache::CacheError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Stable error codes used by the engine itself.
///
/// Backend and network codes originate from the gateway and are carried
/// through verbatim.
pub mod codes {
    /// An id argument was empty.
    pub const EMPTY_ENTITY_ID: &str = "EmptyEntityId";
    /// A batch operation received an empty entity list.
    pub const EMPTY_BATCH: &str = "EmptyBatch";
    /// A numeric reduction was requested without an aggregate field.
    pub const MISSING_AGGREGATE_FIELD: &str = "MissingAggregateField";
    /// Pull was invoked on a store without a local cache.
    pub const PULL_NOT_SUPPORTED: &str = "PullNotSupported";
    /// Push was invoked on a store without a pending-write log.
    pub const PUSH_NOT_SUPPORTED: &str = "PushNotSupported";
    /// Pull was invoked while un-pushed local writes exist.
    pub const PENDING_WRITES_EXIST: &str = "PendingWritesExist";
    /// The operation was cancelled before a network call was issued.
    pub const OPERATION_CANCELLED: &str = "OperationCancelled";

    /// Delta endpoint: the changed set is too large to enumerate.
    pub const RESULT_SET_SIZE_EXCEEDED: &str = "ResultSetSizeExceeded";
    /// Delta endpoint: the since-timestamp is out of the retained window.
    pub const PARAMETER_VALUE_OUT_OF_RANGE: &str = "ParameterValueOutOfRange";
    /// Delta endpoint: delta sync is not configured for the collection.
    pub const MISSING_CONFIGURATION: &str = "MissingConfiguration";
}

/// Backend error codes that belong to the delta-set protocol.
///
/// These are consumed internally by the delta fetch (checkpoint dropped,
/// full fetch retried) and never reach a caller.
const DELTA_PROTOCOL_CODES: [&str; 3] = [
    codes::RESULT_SET_SIZE_EXCEEDED,
    codes::PARAMETER_VALUE_OUT_OF_RANGE,
    codes::MISSING_CONFIGURATION,
];

/// The category half of the stable (category, code) pair every error
/// exposes. Callers branch on the pair, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad call arguments.
    Validation,
    /// Local storage failure.
    Cache,
    /// Connectivity-class failure: timeout, DNS, transport.
    Network,
    /// Structured remote API error.
    Backend,
    /// Delta-set-specific server error, handled internally.
    Protocol,
    /// The operation is not permitted in the current state.
    InvalidOperation,
    /// The operation was cancelled cooperatively.
    Cancelled,
}

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad call arguments.
    #[error("validation error [{code}]: {message}")]
    Validation {
        /// Stable code.
        code: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// Local cache failure.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Connectivity-class failure.
    #[error("network error [{code}]: {message}")]
    Network {
        /// Stable code reported by the transport.
        code: String,
        /// Human-readable description.
        message: String,
    },

    /// Structured remote API error.
    #[error("backend error [{code}]: {message}")]
    Backend {
        /// Code reported by the backend.
        code: String,
        /// Message reported by the backend.
        message: String,
    },

    /// Delta-set protocol error. Consumed by the delta fetch; never
    /// surfaced to callers.
    #[error("delta protocol error [{code}]: {message}")]
    Protocol {
        /// Code reported by the delta endpoint.
        code: String,
        /// Message reported by the delta endpoint.
        message: String,
    },

    /// The operation is not permitted in the current state.
    #[error("invalid operation [{code}]: {message}")]
    InvalidOperation {
        /// Stable code.
        code: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// The operation was cancelled before a network call was issued.
    #[error("operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Creates a validation error.
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// Creates a connectivity-class network error.
    pub fn network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a backend error.
    ///
    /// Codes belonging to the delta-set protocol are classified as
    /// [`StoreError::Protocol`] so the delta fetch can consume them.
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        if DELTA_PROTOCOL_CODES.contains(&code.as_str()) {
            Self::Protocol { code, message }
        } else {
            Self::Backend { code, message }
        }
    }

    /// Creates an invalid-operation error.
    pub fn invalid_operation(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            code,
            message: message.into(),
        }
    }

    /// The category half of the stable (category, code) pair.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Validation { .. } => ErrorCategory::Validation,
            StoreError::Cache(_) => ErrorCategory::Cache,
            StoreError::Network { .. } => ErrorCategory::Network,
            StoreError::Backend { .. } => ErrorCategory::Backend,
            StoreError::Protocol { .. } => ErrorCategory::Protocol,
            StoreError::InvalidOperation { .. } => ErrorCategory::InvalidOperation,
            StoreError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// The code half of the stable (category, code) pair.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            StoreError::Validation { code, .. } => code,
            StoreError::Cache(inner) => inner.code(),
            StoreError::Network { code, .. } => code,
            StoreError::Backend { code, .. } => code,
            StoreError::Protocol { code, .. } => code,
            StoreError::InvalidOperation { code, .. } => code,
            StoreError::Cancelled => codes::OPERATION_CANCELLED,
        }
    }

    /// True for connectivity-class failures.
    ///
    /// Drives the local fallback of the network-otherwise-local read
    /// policy and the enqueue-on-failure of the local-then-network write
    /// policy.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Network { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_constructor_classifies_delta_codes() {
        let err = StoreError::backend(codes::MISSING_CONFIGURATION, "not configured");
        assert_eq!(err.category(), ErrorCategory::Protocol);

        let err = StoreError::backend("EntityNotFound", "no such entity");
        assert_eq!(err.category(), ErrorCategory::Backend);
    }

    #[test]
    fn category_code_pairs_are_stable() {
        let err = StoreError::validation(codes::EMPTY_ENTITY_ID, "id is empty");
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.code(), codes::EMPTY_ENTITY_ID);

        let err = StoreError::from(CacheError::duplicate_key("e1"));
        assert_eq!(err.category(), ErrorCategory::Cache);
        assert_eq!(err.code(), "DuplicateKey");

        assert_eq!(StoreError::Cancelled.code(), codes::OPERATION_CANCELLED);
    }

    #[test]
    fn only_network_errors_are_connectivity() {
        assert!(StoreError::network("Timeout", "request timed out").is_connectivity());
        assert!(!StoreError::backend("Internal", "boom").is_connectivity());
        assert!(!StoreError::Cancelled.is_connectivity());
    }
}
