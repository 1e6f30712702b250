//! Per-session cooperative cancellation.

use tokio_util::sync::CancellationToken;

/// Owns the cancellation token of the current session.
///
/// The token is handed read-only to the worker and the pool; only the
/// controller flips it. Cancellation is cooperative: readers observe it at
/// task boundaries and nothing is ever interrupted mid-call.
#[derive(Debug, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    /// Create a controller with a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token with a fresh one and return it.
    ///
    /// The previous token is cancelled so that anything still holding it
    /// winds down.
    pub fn new_token(&mut self) -> CancellationToken {
        let previous = std::mem::take(&mut self.token);
        previous.cancel();
        self.token.clone()
    }

    /// Clone of the current token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Flip the current token to cancelled. Returns `false` when it was
    /// already cancelled.
    pub fn request_cancel(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_cancel_is_idempotent() {
        let controller = CancellationController::new();
        let token = controller.token();

        assert!(controller.request_cancel());
        assert!(!controller.request_cancel());
        assert!(token.is_cancelled());
        assert!(controller.is_cancelled());
    }

    #[test]
    fn test_new_token_invalidates_previous() {
        let mut controller = CancellationController::new();
        let first = controller.new_token();
        let second = controller.new_token();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!controller.is_cancelled());
    }
}
