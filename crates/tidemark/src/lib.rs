//! # Tidemark
//!
//! Persistence and lifecycle layer for a cursor-based update-mirror
//! client: a client that keeps a live mirror of a remote delivery
//! service's state by pulling incremental change batches addressed by
//! monotonically-advancing cursors.
//!
//! ## Overview
//!
//! The hard part of such a client is not the network loop but what
//! surrounds it. Tidemark provides:
//!
//! - **Checkpoints**: durable per-user and per-channel cursors, so a
//!   restart resumes exactly where the mirror left off, with no replayed
//!   and no lost updates.
//! - **Handle cache**: opaque access handles per (user, channel), with
//!   optional TTL expiry.
//! - **Sessions**: one JSON session document per agent with a targeted
//!   merge-update of its `session_string` field.
//! - **Supervision**: the client's connection loop runs in a background
//!   task with a blocking start, a one-shot stop handle, and transparent
//!   absorption of server-signaled rate limiting.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tidemark::{Client, ConnectOptions, FloodWaiter, Mirror, SqliteStore, StoreConfig};
//!
//! async fn example(client: impl Client) {
//!     let store = SqliteStore::open("mirror.db", StoreConfig::default()).unwrap();
//!     let mirror = Mirror::new(
//!         store,
//!         ConnectOptions {
//!             waiter: Some(FloodWaiter::default()),
//!             ..ConnectOptions::default()
//!         },
//!     );
//!
//!     let stop = mirror.connect(client).await.unwrap();
//!     // ... the mirror is live; the client reads and writes the stores ...
//!     stop.stop().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! The component crates are re-exported for direct use:
//!
//! - `tidemark::store` - store traits, backends, and data types
//! - `tidemark::conn` - supervisor, stop handle, and flood-wait policy

pub mod error;
pub mod mirror;

// Re-export component crates
pub use tidemark_conn as conn;
pub use tidemark_store as store;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use mirror::{Mirror, Storage};

// Re-export commonly used component types
pub use tidemark_conn::{
    CancellationToken, Client, ConnError, ConnectOptions, FloodWaiter, Ready, State, StopHandle,
    Supervisor,
};
pub use tidemark_store::{
    AgentId, ChannelId, Checkpoint, CheckpointStore, CredentialStore, Credentials, HandleCache,
    MemoryStore, SessionStore, SqliteStore, StoreConfig, StoreError, UserId,
};
