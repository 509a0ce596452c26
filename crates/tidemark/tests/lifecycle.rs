//! End-to-end tests of the mirror lifecycle and store semantics, run
//! against both backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tidemark::{
    CancellationToken, Checkpoint, CheckpointStore, Client, ConnError, ConnectOptions,
    Credentials, CredentialStore, FloodWaiter, HandleCache, MemoryStore, Mirror, Ready,
    SessionStore, SqliteStore, State, StoreConfig, StoreError,
};

/// Connects after a short delay, then blocks until canceled.
struct SlowConnector;

#[async_trait]
impl Client for SlowConnector {
    async fn run(&self, token: CancellationToken, ready: Ready) -> Result<(), ConnError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ready.notify();
        token.cancelled().await;
        Err(ConnError::Canceled)
    }
}

/// Fails before ever signaling readiness.
struct BrokenConnector;

#[async_trait]
impl Client for BrokenConnector {
    async fn run(&self, _token: CancellationToken, _ready: Ready) -> Result<(), ConnError> {
        Err(ConnError::Client(anyhow::anyhow!("dc unreachable")))
    }
}

/// Rate-limited on the first attempt, connects on the second.
struct LimitedConnector {
    attempts: AtomicU32,
}

#[async_trait]
impl Client for LimitedConnector {
    async fn run(&self, token: CancellationToken, ready: Ready) -> Result<(), ConnError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ConnError::RateLimited {
                retry_after: Duration::from_millis(5),
            });
        }
        ready.notify();
        token.cancelled().await;
        Err(ConnError::Canceled)
    }
}

#[tokio::test]
async fn connect_blocks_until_ready_and_stop_is_clean() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mirror = Mirror::new(MemoryStore::new(), ConnectOptions::default());
    assert_eq!(mirror.state(), State::Idle);

    let stop = mirror.connect(SlowConnector).await.unwrap();
    assert_eq!(mirror.state(), State::Running);

    // The loop's internal Canceled result is normalized to success.
    stop.stop().await.unwrap();
    assert_eq!(mirror.state(), State::Stopped);
}

#[tokio::test]
async fn startup_failure_comes_back_from_connect() {
    let mirror = Mirror::new(MemoryStore::new(), ConnectOptions::default());

    let err = mirror.connect(BrokenConnector).await.unwrap_err();
    assert!(matches!(err, tidemark::Error::Conn(ConnError::Client(_))));
    assert_eq!(mirror.state(), State::Failed);
}

#[tokio::test]
async fn flood_wait_is_absorbed_transparently() {
    let mirror = Mirror::new(
        MemoryStore::new(),
        ConnectOptions {
            waiter: Some(FloodWaiter::default()),
            ..ConnectOptions::default()
        },
    );

    let client = LimitedConnector {
        attempts: AtomicU32::new(0),
    };
    let stop = mirror.connect(client).await.unwrap();
    assert_eq!(mirror.state(), State::Running);
    stop.stop().await.unwrap();
}

/// Store semantics shared by every backend.
async fn exercise_store<S>(store: &S)
where
    S: CheckpointStore + HandleCache + SessionStore + CredentialStore,
{
    // A zero handle is a real value, distinct from absence.
    assert_eq!(store.get_handle(1, 2).await.unwrap(), None);
    store.set_handle(1, 2, 555).await.unwrap();
    assert_eq!(store.get_handle(1, 2).await.unwrap(), Some(555));
    store.set_handle(1, 2, 0).await.unwrap();
    assert_eq!(store.get_handle(1, 2).await.unwrap(), Some(0));

    // Cursor progress cannot be recorded before bootstrap.
    assert!(matches!(
        store.set_pts(1, 10).await.unwrap_err(),
        StoreError::NotInitialized(1)
    ));
    store
        .set_checkpoint(1, Checkpoint { pts: 1, qts: 2, date: 3, seq: 4 })
        .await
        .unwrap();
    store.set_pts(1, 10).await.unwrap();
    store.set_date_seq(1, 30, 40).await.unwrap();
    assert_eq!(
        store.get_checkpoint(1).await.unwrap(),
        Some(Checkpoint { pts: 10, qts: 2, date: 30, seq: 40 })
    );

    // Channels are independent and iterable.
    store.set_channel_pts(1, 7, 70).await.unwrap();
    store.set_channel_pts(1, 8, 80).await.unwrap();
    let mut seen = Vec::new();
    store
        .for_each_channel(1, &mut |channel_id, pts| {
            seen.push((channel_id, pts));
            Ok(())
        })
        .await
        .unwrap();
    seen.sort();
    assert_eq!(seen, vec![(7, 70), (8, 80)]);

    // Session document lifecycle.
    assert!(matches!(
        store.get_session(9).await.unwrap_err(),
        StoreError::NotFound(9)
    ));
    store.set_session_string(9, "resume-token").await.unwrap();
    let doc: serde_json::Value = serde_json::from_str(&store.get_session(9).await.unwrap()).unwrap();
    assert_eq!(doc["session_string"], "resume-token");

    // Credential pass-through.
    let creds = Credentials {
        login: "+15550100".into(),
        secret: "hunter2".into(),
    };
    store.set_credentials(1, &creds).await.unwrap();
    assert_eq!(store.get_credentials(1).await.unwrap(), Some(creds));
}

#[tokio::test]
async fn memory_backend_semantics() {
    exercise_store(&MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_backend_semantics() {
    exercise_store(&SqliteStore::open_memory(StoreConfig::default()).unwrap()).await;
}

#[tokio::test]
async fn sqlite_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");

    {
        let store = SqliteStore::open(&path, StoreConfig::default()).unwrap();
        store
            .set_checkpoint(1, Checkpoint { pts: 100, qts: 0, date: 0, seq: 0 })
            .await
            .unwrap();
        store.set_channel_pts(1, 2, 42).await.unwrap();
        store.set_session_string(1, "token").await.unwrap();
    }

    let mirror = Mirror::new(
        SqliteStore::open(&path, StoreConfig::default()).unwrap(),
        ConnectOptions::default(),
    );
    let resumed = mirror.resume_checkpoint(1).await.unwrap().unwrap();
    assert_eq!(resumed.pts, 100);
    assert_eq!(mirror.channel_checkpoints(1).await.unwrap(), vec![(2, 42)]);

    let doc: serde_json::Value = serde_json::from_str(&mirror.session(1).await.unwrap()).unwrap();
    assert_eq!(doc["session_string"], "token");
}

#[tokio::test]
async fn out_of_band_corruption_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");

    let store = SqliteStore::open(&path, StoreConfig::default()).unwrap();
    store.set_session_string(5, "token").await.unwrap();

    // Truncate the stored document through a second connection.
    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE sessions SET data = substr(data, 1, 8) WHERE agent_id = 5",
        [],
    )
    .unwrap();

    let err = store.get_session(5).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { agent_id: 5, .. }));
}
