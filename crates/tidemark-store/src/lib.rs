//! # Tidemark Store
//!
//! Persistence layer for a cursor-based update-mirror client. Provides a
//! trait-based interface for checkpoint, access-handle, session, and
//! credential storage with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! A mirror client pulls incremental change batches from a remote service,
//! addressed by monotonically-advancing cursors. This crate owns the state
//! that makes that resumable: after a restart, the client reads its last
//! checkpoint and continues without replaying or losing updates.
//!
//! ## Key Types
//!
//! - [`CheckpointStore`] - per-user global and per-channel cursor state
//! - [`HandleCache`] - opaque access handles per (user, channel) pair
//! - [`SessionStore`] - serialized session document per agent
//! - [`CredentialStore`] - minimal credential pass-through
//! - [`SqliteStore`] - SQLite-based persistent backend
//! - [`MemoryStore`] - in-memory backend for tests and KV-style use
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tidemark_store::{CheckpointStore, Checkpoint, SqliteStore, StoreConfig};
//!
//! async fn example() {
//!     let store = SqliteStore::open("mirror.db", StoreConfig::default()).unwrap();
//!
//!     store.set_checkpoint(1, Checkpoint { pts: 100, qts: 2, date: 0, seq: 0 })
//!         .await
//!         .unwrap();
//!
//!     // After a restart, resume from the stored cursors.
//!     let resume = store.get_checkpoint(1).await.unwrap();
//!     assert!(resume.is_some());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **No partial bootstrap**: single-field cursor setters fail until a
//!   full checkpoint exists, so resume state is never silently incomplete.
//! - **Independent keyspaces**: cursor, handle, session, and credential
//!   writes are not transactionally coupled; the client's at-least-once
//!   replay makes that safe.
//! - **Trusted namespace**: table names come from construction-time
//!   configuration only and are never built from per-call input.
//! - **No deletes**: this layer never deletes records; deletion is an
//!   operational concern outside the client.

pub mod config;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    ChannelVisitor, CheckpointStore, CredentialStore, HandleCache, SessionStore,
};
pub use types::{AgentId, ChannelId, Checkpoint, Credentials, UserId};
