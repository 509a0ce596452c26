//! Error types for the facade crate.

use thiserror::Error;
use tidemark_conn::ConnError;
use tidemark_store::StoreError;

/// Errors surfaced through the unified mirror API.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Connection lifecycle error.
    #[error("connection error: {0}")]
    Conn(#[from] ConnError),
}

/// Result type for mirror operations.
pub type Result<T> = std::result::Result<T, Error>;
