//! Store traits: the capability boundary consumed by the sync client.
//!
//! Each trait covers one keyspace. Implementations must not share state
//! across keyspaces; a cursor write and a handle write are independently,
//! not atomically, persisted. That is deliberate: the client recovers via
//! at-least-once replay, so cross-store transactions buy nothing.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AgentId, ChannelId, Checkpoint, Credentials, UserId};

/// Visitor invoked by [`CheckpointStore::for_each_channel`] for every
/// stored channel checkpoint. Returning an error stops iteration
/// immediately and propagates it to the caller.
pub type ChannelVisitor<'a> = dyn FnMut(ChannelId, i32) -> Result<()> + Send + 'a;

/// Durable cursor state per user (global) and per (user, channel) pair.
///
/// The single-field setters exist so a client can never record partial
/// progress (say, a fresh `qts`) for a user it has not yet bootstrapped:
/// they fail with [`StoreError::NotInitialized`] until a full checkpoint
/// has been written once.
///
/// [`StoreError::NotInitialized`]: crate::StoreError::NotInitialized
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the global checkpoint for a user.
    ///
    /// `None` means no field was ever written. Individual fields that were
    /// never written read back as zero; per-field "never set" is not
    /// distinguishable from "set to zero".
    async fn get_checkpoint(&self, user_id: UserId) -> Result<Option<Checkpoint>>;

    /// Overwrite the full checkpoint, creating the record if absent.
    async fn set_checkpoint(&self, user_id: UserId, checkpoint: Checkpoint) -> Result<()>;

    /// Update only `pts`, leaving the other fields untouched.
    async fn set_pts(&self, user_id: UserId, pts: i32) -> Result<()>;

    /// Update only `qts`, leaving the other fields untouched.
    async fn set_qts(&self, user_id: UserId, qts: i32) -> Result<()>;

    /// Update only `date`, leaving the other fields untouched.
    async fn set_date(&self, user_id: UserId, date: i32) -> Result<()>;

    /// Update only `seq`, leaving the other fields untouched.
    async fn set_seq(&self, user_id: UserId, seq: i32) -> Result<()>;

    /// Update `date` and `seq` together. The remote protocol reports the
    /// two jointly, so they are written in one statement.
    async fn set_date_seq(&self, user_id: UserId, date: i32, seq: i32) -> Result<()>;

    /// Load the checkpoint of one channel. `None` when never written.
    async fn get_channel_pts(&self, user_id: UserId, channel_id: ChannelId)
        -> Result<Option<i32>>;

    /// Create or update a channel checkpoint. Channels are independent of
    /// the global checkpoint; no existence precondition applies.
    async fn set_channel_pts(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        pts: i32,
    ) -> Result<()>;

    /// Visit every stored channel checkpoint for a user, in unspecified
    /// order.
    ///
    /// This is a best-effort live view: writers running concurrently with
    /// the iteration may or may not be reflected, and no snapshot
    /// isolation is guaranteed.
    async fn for_each_channel(
        &self,
        user_id: UserId,
        visitor: &mut ChannelVisitor<'_>,
    ) -> Result<()>;
}

/// Cache of opaque access handles per (user, channel) pair.
///
/// Zero is a valid handle value, not a sentinel for "absent"; absence is
/// always reported through the `Option`.
#[async_trait]
pub trait HandleCache: Send + Sync {
    /// Look up the handle for a channel. `None` when no entry exists or
    /// the entry expired under the configured TTL; any other failure is an
    /// error.
    async fn get_handle(&self, user_id: UserId, channel_id: ChannelId) -> Result<Option<i64>>;

    /// Create or update the handle for a channel.
    ///
    /// When a TTL is configured, every call refreshes the expiry window.
    /// The entry's update timestamp advances only when the handle value
    /// actually changes; rewriting the same handle is a no-op refresh.
    async fn set_handle(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        handle: i64,
    ) -> Result<()>;
}

/// Durable serialized session document per agent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the full session document.
    ///
    /// Fails with [`StoreError::NotFound`] when no document exists and
    /// with [`StoreError::Corrupt`] when the stored bytes do not parse as
    /// JSON. Validation happens eagerly on every read; a syntactically
    /// invalid document is never returned.
    ///
    /// [`StoreError::NotFound`]: crate::StoreError::NotFound
    /// [`StoreError::Corrupt`]: crate::StoreError::Corrupt
    async fn get_session(&self, agent_id: AgentId) -> Result<String>;

    /// Merge-write the document's `session_string` field, leaving every
    /// other field untouched. Creates the document (with only that field
    /// populated) if it does not yet exist.
    async fn set_session_string(&self, agent_id: AgentId, value: &str) -> Result<()>;
}

/// Minimal per-user credential pass-through.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load stored credentials. `None` when never written.
    async fn get_credentials(&self, user_id: UserId) -> Result<Option<Credentials>>;

    /// Store credentials, overwriting any previous pair.
    async fn set_credentials(&self, user_id: UserId, credentials: &Credentials) -> Result<()>;
}
