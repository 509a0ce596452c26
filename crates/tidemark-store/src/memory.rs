//! In-memory implementation of the store traits.
//!
//! Keeps the same layout as the original key-value engine design: one
//! record per user holding the four cursor fields plus a per-channel map.
//! No persistence; data is lost when the store is dropped. Thread-safe
//! via RwLock. Primarily for tests, but also the reference semantics for
//! a key-value deployment.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::traits::{
    ChannelVisitor, CheckpointStore, CredentialStore, HandleCache, SessionStore,
};
use crate::types::{AgentId, ChannelId, Checkpoint, Credentials, UserId};

#[derive(Default)]
struct UserRecord {
    pts: Option<i32>,
    qts: Option<i32>,
    date: Option<i32>,
    seq: Option<i32>,
    channels: HashMap<ChannelId, i32>,
}

impl UserRecord {
    /// A checkpoint exists once at least one cursor field was written.
    /// Channel entries alone do not count.
    fn initialized(&self) -> bool {
        self.pts.is_some() || self.qts.is_some() || self.date.is_some() || self.seq.is_some()
    }
}

struct HandleEntry {
    handle: i64,
    refreshed: Instant,
}

#[derive(Default)]
struct MemoryStoreInner {
    users: HashMap<UserId, UserRecord>,
    handles: HashMap<(UserId, ChannelId), HandleEntry>,
    sessions: HashMap<AgentId, String>,
    credentials: HashMap<UserId, Credentials>,
}

/// In-memory store implementing all four store capabilities.
pub struct MemoryStore {
    handle_ttl: Option<Duration>,
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an in-memory store with the given configuration. The table
    /// prefix is meaningless here and ignored.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            handle_ttl: config.handle_ttl,
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    #[cfg(test)]
    fn put_raw_session(&self, agent_id: AgentId, raw: &str) {
        self.inner
            .write()
            .unwrap()
            .sessions
            .insert(agent_id, raw.to_owned());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get_checkpoint(&self, user_id: UserId) -> Result<Option<Checkpoint>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .users
            .get(&user_id)
            .filter(|record| record.initialized())
            .map(|record| Checkpoint {
                pts: record.pts.unwrap_or(0),
                qts: record.qts.unwrap_or(0),
                date: record.date.unwrap_or(0),
                seq: record.seq.unwrap_or(0),
            }))
    }

    async fn set_checkpoint(&self, user_id: UserId, checkpoint: Checkpoint) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let record = inner.users.entry(user_id).or_default();
        record.pts = Some(checkpoint.pts);
        record.qts = Some(checkpoint.qts);
        record.date = Some(checkpoint.date);
        record.seq = Some(checkpoint.seq);
        Ok(())
    }

    async fn set_pts(&self, user_id: UserId, pts: i32) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.users.get_mut(&user_id) {
            Some(record) if record.initialized() => {
                record.pts = Some(pts);
                Ok(())
            }
            _ => Err(StoreError::NotInitialized(user_id)),
        }
    }

    async fn set_qts(&self, user_id: UserId, qts: i32) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.users.get_mut(&user_id) {
            Some(record) if record.initialized() => {
                record.qts = Some(qts);
                Ok(())
            }
            _ => Err(StoreError::NotInitialized(user_id)),
        }
    }

    async fn set_date(&self, user_id: UserId, date: i32) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.users.get_mut(&user_id) {
            Some(record) if record.initialized() => {
                record.date = Some(date);
                Ok(())
            }
            _ => Err(StoreError::NotInitialized(user_id)),
        }
    }

    async fn set_seq(&self, user_id: UserId, seq: i32) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.users.get_mut(&user_id) {
            Some(record) if record.initialized() => {
                record.seq = Some(seq);
                Ok(())
            }
            _ => Err(StoreError::NotInitialized(user_id)),
        }
    }

    async fn set_date_seq(&self, user_id: UserId, date: i32, seq: i32) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.users.get_mut(&user_id) {
            Some(record) if record.initialized() => {
                record.date = Some(date);
                record.seq = Some(seq);
                Ok(())
            }
            _ => Err(StoreError::NotInitialized(user_id)),
        }
    }

    async fn get_channel_pts(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<Option<i32>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .users
            .get(&user_id)
            .and_then(|record| record.channels.get(&channel_id))
            .copied())
    }

    async fn set_channel_pts(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        pts: i32,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .users
            .entry(user_id)
            .or_default()
            .channels
            .insert(channel_id, pts);
        Ok(())
    }

    async fn for_each_channel(
        &self,
        user_id: UserId,
        visitor: &mut ChannelVisitor<'_>,
    ) -> Result<()> {
        // Snapshot the pairs so the lock is not held across visitor calls.
        let pairs: Vec<(ChannelId, i32)> = {
            let inner = self.inner.read().unwrap();
            inner
                .users
                .get(&user_id)
                .map(|record| record.channels.iter().map(|(&c, &p)| (c, p)).collect())
                .unwrap_or_default()
        };

        for (channel_id, pts) in pairs {
            visitor(channel_id, pts)?;
        }
        Ok(())
    }
}

#[async_trait]
impl HandleCache for MemoryStore {
    async fn get_handle(&self, user_id: UserId, channel_id: ChannelId) -> Result<Option<i64>> {
        let inner = self.inner.read().unwrap();
        let Some(entry) = inner.handles.get(&(user_id, channel_id)) else {
            return Ok(None);
        };
        if let Some(ttl) = self.handle_ttl {
            if entry.refreshed.elapsed() >= ttl {
                return Ok(None);
            }
        }
        Ok(Some(entry.handle))
    }

    async fn set_handle(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        handle: i64,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.handles.insert(
            (user_id, channel_id),
            HandleEntry {
                handle,
                refreshed: Instant::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_session(&self, agent_id: AgentId) -> Result<String> {
        let inner = self.inner.read().unwrap();
        let data = inner
            .sessions
            .get(&agent_id)
            .ok_or(StoreError::NotFound(agent_id))?;
        if let Err(source) = serde_json::from_str::<serde_json::Value>(data) {
            return Err(StoreError::Corrupt { agent_id, source });
        }
        Ok(data.clone())
    }

    async fn set_session_string(&self, agent_id: AgentId, value: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let mut doc: serde_json::Map<String, serde_json::Value> =
            match inner.sessions.get(&agent_id) {
                Some(raw) => serde_json::from_str(raw)
                    .map_err(|source| StoreError::Corrupt { agent_id, source })?,
                None => serde_json::Map::new(),
            };
        doc.insert(
            "session_string".to_owned(),
            serde_json::Value::String(value.to_owned()),
        );
        inner
            .sessions
            .insert(agent_id, serde_json::Value::Object(doc).to_string());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_credentials(&self, user_id: UserId) -> Result<Option<Credentials>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.credentials.get(&user_id).cloned())
    }

    async fn set_credentials(&self, user_id: UserId, credentials: &Credentials) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.credentials.insert(user_id, credentials.clone());
        Ok(())
    }
}
