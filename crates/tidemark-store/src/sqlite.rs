//! SQLite implementation of the store traits.
//!
//! This is the primary persistent backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::task::spawn_blocking. Every
//! operation is a single statement (or a single upsert), so concurrent
//! writers race at SQLite's native consistency level and nothing needs
//! in-process coordination beyond the connection mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{
    ChannelVisitor, CheckpointStore, CredentialStore, HandleCache, SessionStore,
};
use crate::types::{AgentId, ChannelId, Checkpoint, Credentials, UserId};

/// Query text for one store instance.
///
/// Built once at construction from the trusted table prefix; per-call
/// input only ever travels through bind parameters.
struct Queries {
    get_checkpoint: String,
    upsert_checkpoint: String,
    set_pts: String,
    set_qts: String,
    set_date: String,
    set_seq: String,
    set_date_seq: String,
    get_channel_pts: String,
    upsert_channel_pts: String,
    list_channels: String,
    get_handle: String,
    upsert_handle: String,
    get_session: String,
    upsert_session: String,
    get_credentials: String,
    upsert_credentials: String,
}

impl Queries {
    fn new(prefix: &str) -> Self {
        let checkpoints = format!("{prefix}checkpoints");
        let channels = format!("{prefix}channel_checkpoints");
        let handles = format!("{prefix}handles");
        let sessions = format!("{prefix}sessions");
        let credentials = format!("{prefix}credentials");

        Self {
            get_checkpoint: format!(
                "SELECT pts, qts, date, seq FROM {checkpoints} WHERE user_id = ?1"
            ),
            upsert_checkpoint: format!(
                "INSERT INTO {checkpoints} (user_id, pts, qts, date, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id) DO UPDATE SET
                     pts = excluded.pts,
                     qts = excluded.qts,
                     date = excluded.date,
                     seq = excluded.seq"
            ),
            set_pts: format!("UPDATE {checkpoints} SET pts = ?2 WHERE user_id = ?1"),
            set_qts: format!("UPDATE {checkpoints} SET qts = ?2 WHERE user_id = ?1"),
            set_date: format!("UPDATE {checkpoints} SET date = ?2 WHERE user_id = ?1"),
            set_seq: format!("UPDATE {checkpoints} SET seq = ?2 WHERE user_id = ?1"),
            set_date_seq: format!(
                "UPDATE {checkpoints} SET date = ?2, seq = ?3 WHERE user_id = ?1"
            ),
            get_channel_pts: format!(
                "SELECT pts FROM {channels} WHERE user_id = ?1 AND channel_id = ?2"
            ),
            upsert_channel_pts: format!(
                "INSERT INTO {channels} (user_id, channel_id, pts) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, channel_id) DO UPDATE SET pts = excluded.pts"
            ),
            list_channels: format!(
                "SELECT channel_id, pts FROM {channels} WHERE user_id = ?1"
            ),
            get_handle: format!(
                "SELECT hash, refreshed FROM {handles} WHERE user_id = ?1 AND channel_id = ?2"
            ),
            // `updated` advances only when the stored handle actually
            // changes; `refreshed` advances on every write and carries the
            // TTL window.
            upsert_handle: format!(
                "INSERT INTO {handles} (user_id, channel_id, hash, updated, refreshed)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (user_id, channel_id) DO UPDATE SET
                     hash = excluded.hash,
                     updated = CASE
                         WHEN {handles}.hash != excluded.hash THEN excluded.updated
                         ELSE {handles}.updated
                     END,
                     refreshed = excluded.refreshed"
            ),
            get_session: format!("SELECT data FROM {sessions} WHERE agent_id = ?1"),
            upsert_session: format!(
                "INSERT INTO {sessions} (agent_id, data, updated_at)
                 VALUES (?1, json_set('{{}}', '$.session_string', ?2), ?3)
                 ON CONFLICT (agent_id) DO UPDATE SET
                     data = json_set(coalesce(data, '{{}}'), '$.session_string', ?2),
                     updated_at = excluded.updated_at"
            ),
            get_credentials: format!(
                "SELECT login, secret FROM {credentials} WHERE user_id = ?1"
            ),
            upsert_credentials: format!(
                "INSERT INTO {credentials} (user_id, login, secret) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     login = excluded.login,
                     secret = excluded.secret"
            ),
        }
    }
}

/// SQLite-backed store implementing all four store capabilities.
///
/// Thread-safe via an internal mutex; all operations run on the blocking
/// pool to keep the async runtime unblocked.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    queries: Arc<Queries>,
    handle_ttl: Option<Duration>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::db("open"))?;
        Self::from_connection(conn, config)
    }

    /// Open an in-memory SQLite database. Useful for testing.
    pub fn open_memory(config: StoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::db("open"))?;
        Self::from_connection(conn, config)
    }

    fn from_connection(mut conn: Connection, config: StoreConfig) -> Result<Self> {
        migration::migrate(&mut conn, &config.table_prefix)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            queries: Arc::new(Queries::new(&config.table_prefix)),
            handle_ttl: config.handle_ttl,
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &Queries) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let queries = Arc::clone(&self.queries);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&conn, &queries)
        })
        .await
        .map_err(|_| StoreError::Join { op })?
    }

    /// Shared body of the single-field checkpoint setters: update exactly
    /// one column, failing when no checkpoint row exists yet.
    async fn update_field(
        &self,
        op: &'static str,
        sql: fn(&Queries) -> &String,
        user_id: UserId,
        value: i32,
    ) -> Result<()> {
        self.with_conn(op, move |conn, q| {
            let changed = conn
                .execute(sql(q), params![user_id, value])
                .map_err(StoreError::db(op))?;
            if changed == 0 {
                return Err(StoreError::NotInitialized(user_id));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn get_checkpoint(&self, user_id: UserId) -> Result<Option<Checkpoint>> {
        self.with_conn("get_checkpoint", move |conn, q| {
            conn.query_row(&q.get_checkpoint, params![user_id], |row| {
                Ok(Checkpoint {
                    pts: row.get::<_, Option<i32>>(0)?.unwrap_or(0),
                    qts: row.get::<_, Option<i32>>(1)?.unwrap_or(0),
                    date: row.get::<_, Option<i32>>(2)?.unwrap_or(0),
                    seq: row.get::<_, Option<i32>>(3)?.unwrap_or(0),
                })
            })
            .optional()
            .map_err(StoreError::db("get_checkpoint"))
        })
        .await
    }

    async fn set_checkpoint(&self, user_id: UserId, checkpoint: Checkpoint) -> Result<()> {
        self.with_conn("set_checkpoint", move |conn, q| {
            conn.execute(
                &q.upsert_checkpoint,
                params![
                    user_id,
                    checkpoint.pts,
                    checkpoint.qts,
                    checkpoint.date,
                    checkpoint.seq
                ],
            )
            .map_err(StoreError::db("set_checkpoint"))?;
            Ok(())
        })
        .await
    }

    async fn set_pts(&self, user_id: UserId, pts: i32) -> Result<()> {
        self.update_field("set_pts", |q| &q.set_pts, user_id, pts).await
    }

    async fn set_qts(&self, user_id: UserId, qts: i32) -> Result<()> {
        self.update_field("set_qts", |q| &q.set_qts, user_id, qts).await
    }

    async fn set_date(&self, user_id: UserId, date: i32) -> Result<()> {
        self.update_field("set_date", |q| &q.set_date, user_id, date).await
    }

    async fn set_seq(&self, user_id: UserId, seq: i32) -> Result<()> {
        self.update_field("set_seq", |q| &q.set_seq, user_id, seq).await
    }

    async fn set_date_seq(&self, user_id: UserId, date: i32, seq: i32) -> Result<()> {
        self.with_conn("set_date_seq", move |conn, q| {
            let changed = conn
                .execute(&q.set_date_seq, params![user_id, date, seq])
                .map_err(StoreError::db("set_date_seq"))?;
            if changed == 0 {
                return Err(StoreError::NotInitialized(user_id));
            }
            Ok(())
        })
        .await
    }

    async fn get_channel_pts(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<Option<i32>> {
        self.with_conn("get_channel_pts", move |conn, q| {
            conn.query_row(&q.get_channel_pts, params![user_id, channel_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::db("get_channel_pts"))
        })
        .await
    }

    async fn set_channel_pts(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        pts: i32,
    ) -> Result<()> {
        self.with_conn("set_channel_pts", move |conn, q| {
            conn.execute(&q.upsert_channel_pts, params![user_id, channel_id, pts])
                .map_err(StoreError::db("set_channel_pts"))?;
            Ok(())
        })
        .await
    }

    async fn for_each_channel(
        &self,
        user_id: UserId,
        visitor: &mut ChannelVisitor<'_>,
    ) -> Result<()> {
        let rows = self
            .with_conn("for_each_channel", move |conn, q| {
                let mut stmt = conn
                    .prepare(&q.list_channels)
                    .map_err(StoreError::db("for_each_channel"))?;
                let rows = stmt
                    .query_map(params![user_id], |row| {
                        Ok((row.get::<_, ChannelId>(0)?, row.get::<_, i32>(1)?))
                    })
                    .map_err(StoreError::db("for_each_channel"))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StoreError::db("for_each_channel"))?;
                Ok(rows)
            })
            .await?;

        for (channel_id, pts) in rows {
            visitor(channel_id, pts)?;
        }
        Ok(())
    }
}

#[async_trait]
impl HandleCache for SqliteStore {
    async fn get_handle(&self, user_id: UserId, channel_id: ChannelId) -> Result<Option<i64>> {
        let ttl = self.handle_ttl;
        self.with_conn("get_handle", move |conn, q| {
            let row: Option<(i64, i64)> = conn
                .query_row(&q.get_handle, params![user_id, channel_id], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .optional()
                .map_err(StoreError::db("get_handle"))?;

            let Some((handle, refreshed)) = row else {
                return Ok(None);
            };
            if let Some(ttl) = ttl {
                if now_millis() - refreshed >= ttl.as_millis() as i64 {
                    return Ok(None);
                }
            }
            Ok(Some(handle))
        })
        .await
    }

    async fn set_handle(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        handle: i64,
    ) -> Result<()> {
        self.with_conn("set_handle", move |conn, q| {
            conn.execute(
                &q.upsert_handle,
                params![user_id, channel_id, handle, now_millis()],
            )
            .map_err(StoreError::db("set_handle"))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_session(&self, agent_id: AgentId) -> Result<String> {
        self.with_conn("get_session", move |conn, q| {
            let data: Option<Option<String>> = conn
                .query_row(&q.get_session, params![agent_id], |row| row.get(0))
                .optional()
                .map_err(StoreError::db("get_session"))?;

            let Some(data) = data.flatten() else {
                return Err(StoreError::NotFound(agent_id));
            };
            if let Err(source) = serde_json::from_str::<serde_json::Value>(&data) {
                tracing::warn!(agent_id, "stored session document failed to parse");
                return Err(StoreError::Corrupt { agent_id, source });
            }
            Ok(data)
        })
        .await
    }

    async fn set_session_string(&self, agent_id: AgentId, value: &str) -> Result<()> {
        let value = value.to_owned();
        self.with_conn("set_session_string", move |conn, q| {
            conn.execute(&q.upsert_session, params![agent_id, value, now_millis()])
                .map_err(StoreError::db("set_session_string"))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get_credentials(&self, user_id: UserId) -> Result<Option<Credentials>> {
        self.with_conn("get_credentials", move |conn, q| {
            conn.query_row(&q.get_credentials, params![user_id], |row| {
                Ok(Credentials {
                    login: row.get(0)?,
                    secret: row.get(1)?,
                })
            })
            .optional()
            .map_err(StoreError::db("get_credentials"))
        })
        .await
    }

    async fn set_credentials(&self, user_id: UserId, credentials: &Credentials) -> Result<()> {
        let credentials = credentials.clone();
        self.with_conn("set_credentials", move |conn, q| {
            conn.execute(
                &q.upsert_credentials,
                params![user_id, credentials.login, credentials.secret],
            )
            .map_err(StoreError::db("set_credentials"))?;
            Ok(())
        })
        .await
    }
}
