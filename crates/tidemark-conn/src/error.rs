//! Error types for the connection supervisor.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while supervising a connection loop.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The server demanded a pause before the operation may be retried.
    ///
    /// Run loops surface this to have the wait absorbed by a configured
    /// [`FloodWaiter`](crate::FloodWaiter); without one it propagates.
    #[error("rate limited by server, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The run loop terminated because its token was canceled.
    ///
    /// A caller-initiated stop is success, not failure; the stop handle
    /// normalizes this variant to `Ok(())`.
    #[error("connection canceled")]
    Canceled,

    /// The supervisor was already started once.
    #[error("supervisor already started")]
    AlreadyStarted,

    /// The connection loop exited unexpectedly, without a usable result
    /// or before signaling readiness.
    #[error("connection loop exited unexpectedly")]
    Aborted,

    /// Failure reported by the client's run loop.
    #[error(transparent)]
    Client(#[from] anyhow::Error),
}

impl ConnError {
    /// True when the error only reports caller-initiated cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, ConnError>;
