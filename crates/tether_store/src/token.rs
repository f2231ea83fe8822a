//! Cooperative cancellation.

use crate::error::{StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation token.
///
/// Clones share the flag. Cancellation is checked at call boundaries
/// before a network call is issued; a call already in flight is not
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Errors with [`StoreError::Cancelled`] if cancellation has been
    /// requested.
    pub fn check(&self) -> StoreResult<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();

        assert!(token.check().is_ok());
        clone.cancel();

        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(StoreError::Cancelled)));
    }
}
