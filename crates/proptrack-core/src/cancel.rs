//! Cooperative cancellation shared between the tracker call and the frame workers.

use std::sync::Arc;
use tokio::sync::watch;

/// Handle for cancelling an in-progress job.
///
/// Cheap to clone; all clones observe the same flag. Synchronous code polls
/// [`CancelToken::is_cancelled`] between frames, async code awaits
/// [`CancelToken::cancelled`].
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<watch::Sender<bool>>);

impl CancelToken {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Return `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::ProptrackError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
