//! Cooperative abort signaling between a caller and a stream read loop.
//!
//! An abort request only sets a flag. The read loop polls it before every
//! read and before applying every event, and treats a transport failure
//! that happens while the flag is set as a graceful abort. Dropping the
//! response body once the loop observes the flag is the best-effort cancel
//! of the underlying request; nothing waits for it to complete.

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared abort flag for one in-flight answer.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    /// Create a handle whose flag is not set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort. Idempotent.
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            debug!("abort requested");
        }
        self.token.cancel();
    }

    /// Whether an abort has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once an abort has been requested.
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }

    /// Underlying token, for wiring into other cancellable tasks.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Handle that is aborted whenever `self` is, but can also be aborted
    /// on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }
}
