//! # Tidemark Conn
//!
//! Connection supervision for the tidemark mirror client.
//!
//! ## Overview
//!
//! The mirror client exposes a long-lived connection loop. This crate runs
//! that loop in a background task with a synchronous start/stop lifecycle:
//!
//! - [`Supervisor::start`] blocks until the loop signals readiness and
//!   hands back a one-shot [`StopHandle`];
//! - [`StopHandle::stop`] cancels the loop and blocks until it has fully
//!   terminated, normalizing cancellation-induced termination to success;
//! - an optional [`FloodWaiter`] absorbs server-signaled rate limiting by
//!   re-invoking the loop after the server-mandated delay, without
//!   changing readiness or cancellation semantics.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tidemark_conn::{Client, ConnectOptions, FloodWaiter, Supervisor};
//!
//! async fn example(client: impl Client) {
//!     let supervisor = Supervisor::new(ConnectOptions {
//!         waiter: Some(FloodWaiter::default()),
//!         ..ConnectOptions::default()
//!     });
//!
//!     let stop = supervisor.start(client).await.unwrap();
//!     // ... mirror is live ...
//!     stop.stop().await.unwrap();
//! }
//! ```

pub mod error;
pub mod supervisor;
pub mod waiter;

pub use error::{ConnError, Result};
pub use supervisor::{Client, ConnectOptions, Ready, State, StopHandle, Supervisor};
pub use waiter::FloodWaiter;

// Re-exported so consumers can drive external cancellation without
// depending on tokio-util themselves.
pub use tokio_util::sync::CancellationToken;
