//! The Mirror: storage plus connection lifecycle in one place.

use std::sync::Arc;

use tidemark_conn::{Client, ConnectOptions, State, StopHandle, Supervisor};
use tidemark_store::{
    AgentId, ChannelId, Checkpoint, CheckpointStore, CredentialStore, HandleCache, SessionStore,
    UserId,
};

use crate::error::Result;

/// The full storage capability bundle the mirror client consumes.
///
/// Blanket-implemented for anything providing all four store traits, so
/// both [`SqliteStore`](tidemark_store::SqliteStore) and
/// [`MemoryStore`](tidemark_store::MemoryStore) qualify.
pub trait Storage: CheckpointStore + HandleCache + SessionStore + CredentialStore {}

impl<S> Storage for S where S: CheckpointStore + HandleCache + SessionStore + CredentialStore {}

/// One mirror environment: an explicitly owned storage backend and the
/// supervised connection lifecycle around the client's run loop.
///
/// The backend handle is constructed by the caller and passed in; there is
/// no process-wide singleton.
pub struct Mirror<S> {
    store: Arc<S>,
    supervisor: Supervisor,
}

impl<S: Storage> Mirror<S> {
    /// Create a mirror over the given storage backend.
    pub fn new(store: S, options: ConnectOptions) -> Self {
        Self {
            store: Arc::new(store),
            supervisor: Supervisor::new(options),
        }
    }

    /// The storage backend, shareable with the client.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> State {
        self.supervisor.state()
    }

    /// Launch the client's connection loop in the background, blocking
    /// until it is ready. See [`Supervisor::start`].
    pub async fn connect<C: Client>(&self, client: C) -> Result<StopHandle> {
        tracing::debug!("starting mirror connection loop");
        Ok(self.supervisor.start(client).await?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Convenience queries
    // ─────────────────────────────────────────────────────────────────────

    /// The checkpoint to resume from, if the user was ever bootstrapped.
    pub async fn resume_checkpoint(&self, user_id: UserId) -> Result<Option<Checkpoint>> {
        Ok(self.store.get_checkpoint(user_id).await?)
    }

    /// Collect all channel checkpoints of a user.
    pub async fn channel_checkpoints(&self, user_id: UserId) -> Result<Vec<(ChannelId, i32)>> {
        let mut channels = Vec::new();
        self.store
            .for_each_channel(user_id, &mut |channel_id, pts| {
                channels.push((channel_id, pts));
                Ok(())
            })
            .await?;
        Ok(channels)
    }

    /// The agent's full session document.
    pub async fn session(&self, agent_id: AgentId) -> Result<String> {
        Ok(self.store.get_session(agent_id).await?)
    }
}
