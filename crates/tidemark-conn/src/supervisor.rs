//! Background supervision of the client's connection loop.
//!
//! The supervisor owns exactly one background task. `start` blocks the
//! caller until the loop signals readiness (or fails, or the base token is
//! canceled) and returns a one-shot [`StopHandle`]; `stop` cancels the
//! loop and blocks until it has fully terminated. Startup failures come
//! back from `start` and runtime failures only from `stop`; neither leaks
//! through the other channel.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnError, Result};
use crate::waiter::FloodWaiter;

/// Lifecycle states of a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not started yet.
    Idle,
    /// `start` was called; waiting for the loop to become ready.
    Starting,
    /// The loop signaled readiness and runs in the background.
    Running,
    /// A stop was requested; waiting for the loop to terminate.
    Stopping,
    /// The loop terminated after a caller-initiated stop or cancellation.
    Stopped,
    /// The loop terminated on its own with an error. Absorbing.
    Failed,
}

/// Lock-free state cell shared between the supervisor, the background
/// task, and the stop handle.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(State::Idle as u8))
    }

    fn get(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            0 => State::Idle,
            1 => State::Starting,
            2 => State::Running,
            3 => State::Stopping,
            4 => State::Stopped,
            _ => State::Failed,
        }
    }

    fn set(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Idempotent readiness signal handed to the run loop.
///
/// The first signal wins; repeat signals (for instance from flood-wait
/// retries of the loop) are no-ops.
#[derive(Debug, Clone)]
pub struct Ready {
    tx: Arc<watch::Sender<bool>>,
}

impl Ready {
    fn channel() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Signal that the connection is established.
    pub fn notify(&self) {
        let _ = self.tx.send(true);
    }
}

/// The client's connection loop, as seen by the supervisor.
///
/// Implementations are expected to establish their connection, call
/// `ready.notify()`, and then block until `token` is canceled. Returning
/// [`ConnError::Canceled`] after a cancellation is the normal shutdown
/// path and is normalized to success by [`StopHandle::stop`]. When a
/// flood-wait policy is configured the loop may be invoked several times
/// in succession; each invocation must start from scratch.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Run the connection loop to completion.
    async fn run(&self, token: CancellationToken, ready: Ready) -> Result<()>;
}

/// Options for supervising a connection loop.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Base cancellation token. Canceling it tears the loop down from the
    /// outside; the supervisor derives its own child token from it.
    pub token: CancellationToken,
    /// Optional flood-wait policy wrapping the run loop.
    pub waiter: Option<FloodWaiter>,
}

/// Supervises one background connection loop.
pub struct Supervisor {
    options: ConnectOptions,
    state: Arc<StateCell>,
}

impl Supervisor {
    /// Create an idle supervisor.
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            state: Arc::new(StateCell::new()),
        }
    }

    /// Current lifecycle state. Lock-free; safe to poll from anywhere.
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// Launch the client's run loop in the background and block until it
    /// is ready.
    ///
    /// Returns a [`StopHandle`] once the loop signals readiness. If the
    /// loop terminates first, its error is returned and the supervisor is
    /// left [`State::Failed`]. If the base token is canceled (or already
    /// was), returns [`ConnError::Canceled`] immediately.
    pub async fn start<C: Client>(&self, client: C) -> Result<StopHandle> {
        if !self.state.transition(State::Idle, State::Starting) {
            return Err(ConnError::AlreadyStarted);
        }

        let base = self.options.token.clone();
        if base.is_cancelled() {
            self.state.set(State::Stopped);
            return Err(ConnError::Canceled);
        }

        let token = base.child_token();
        let (ready, mut ready_rx) = Ready::channel();
        let waiter = self.options.waiter.clone();

        let mut task: JoinHandle<Result<()>> = tokio::spawn({
            let token = token.clone();
            let state = Arc::clone(&self.state);
            async move {
                let client = Arc::new(client);
                let result = match waiter {
                    Some(waiter) => {
                        let loop_client = Arc::clone(&client);
                        let loop_token = token.clone();
                        let loop_ready = ready.clone();
                        waiter
                            .run(&token, move || {
                                let client = Arc::clone(&loop_client);
                                let token = loop_token.clone();
                                let ready = loop_ready.clone();
                                async move { client.run(token, ready).await }
                            })
                            .await
                    }
                    None => client.run(token.clone(), ready).await,
                };
                if let Err(err) = &result {
                    if !err.is_canceled() {
                        tracing::warn!("connection loop terminated: {err}");
                        state.set(State::Failed);
                    }
                }
                result
            }
        });

        enum Startup {
            Ready,
            Terminated(std::result::Result<Result<()>, tokio::task::JoinError>),
            Canceled,
        }

        let became_ready = async {
            loop {
                if ready_rx.changed().await.is_err() {
                    // The loop dropped its ready signal without firing;
                    // termination surfaces through the task branch.
                    std::future::pending::<()>().await;
                }
                if *ready_rx.borrow() {
                    break;
                }
            }
        };

        let outcome = tokio::select! {
            res = &mut task => Startup::Terminated(res),
            _ = base.cancelled() => Startup::Canceled,
            _ = became_ready => Startup::Ready,
        };

        match outcome {
            Startup::Ready => {
                self.state.transition(State::Starting, State::Running);
                Ok(StopHandle {
                    token,
                    task,
                    state: Arc::clone(&self.state),
                })
            }
            Startup::Terminated(res) => {
                token.cancel();
                match res {
                    Ok(Err(err)) => {
                        self.state.set(if err.is_canceled() {
                            State::Stopped
                        } else {
                            State::Failed
                        });
                        Err(err)
                    }
                    // Exiting cleanly before readiness is still a startup
                    // failure, as is a panicked task.
                    Ok(Ok(())) | Err(_) => {
                        self.state.set(State::Failed);
                        Err(ConnError::Aborted)
                    }
                }
            }
            Startup::Canceled => {
                token.cancel();
                self.state.set(State::Stopped);
                Err(ConnError::Canceled)
            }
        }
    }
}

/// Handle to request a graceful shutdown of a running loop.
///
/// `stop` consumes the handle, making a second stop unrepresentable.
#[derive(Debug)]
pub struct StopHandle {
    token: CancellationToken,
    task: JoinHandle<Result<()>>,
    state: Arc<StateCell>,
}

impl StopHandle {
    /// Cancel the run loop and block until it has fully terminated.
    ///
    /// Returns the loop's terminal error, except that termination caused
    /// purely by this cancellation is normalized to `Ok(())`. When this
    /// returns, no background activity remains.
    pub async fn stop(self) -> Result<()> {
        self.state.transition(State::Running, State::Stopping);
        self.token.cancel();

        let result = match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if err.is_canceled() => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ConnError::Aborted),
        };

        match result {
            Ok(()) => self.state.set(State::Stopped),
            Err(_) => self.state.set(State::Failed),
        }
        result
    }
}
