//! Error types for the store crate.

use thiserror::Error;

use crate::types::{AgentId, UserId};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session document exists for the agent.
    #[error("no session document for agent {0}")]
    NotFound(AgentId),

    /// A single-field checkpoint update was attempted for a user whose
    /// checkpoint was never created.
    #[error("checkpoint for user {0} is not initialized")]
    NotInitialized(UserId),

    /// The stored session document does not parse as JSON.
    #[error("session document for agent {agent_id} is corrupt: {source}")]
    Corrupt {
        agent_id: AgentId,
        #[source]
        source: serde_json::Error,
    },

    /// The backing engine call itself failed.
    #[error("database error during {op}: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// A blocking storage task could not be joined.
    #[error("storage task failed during {op}")]
    Join { op: &'static str },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Wrap a backend error with the operation it occurred in.
    pub(crate) fn db(op: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Database { op, source }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
