//! Flood-wait absorption for the connection loop.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ConnError, Result};

/// Retry policy that absorbs server-signaled rate limiting.
///
/// On every [`ConnError::RateLimited`] failure the operation is re-invoked
/// from scratch after sleeping the server-mandated delay. Every other
/// outcome, success or failure, passes through untouched. A cancellation
/// during the wait aborts it promptly.
#[derive(Debug, Clone)]
pub struct FloodWaiter {
    /// Upper bound on a single wait, whatever the server demands.
    pub max_wait: Duration,
    /// Number of absorbed waits before the rate-limit error is surfaced
    /// instead. Zero means unlimited.
    pub max_retries: u32,
}

impl Default for FloodWaiter {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(60),
            max_retries: 0,
        }
    }
}

impl FloodWaiter {
    /// Invoke `op` until it terminates with anything other than a
    /// rate-limit error.
    pub async fn run<F, Fut>(&self, token: &CancellationToken, mut op: F) -> Result<()>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let mut waits = 0u32;
        loop {
            match op().await {
                Err(ConnError::RateLimited { retry_after }) => {
                    waits = waits.saturating_add(1);
                    if self.max_retries > 0 && waits > self.max_retries {
                        return Err(ConnError::RateLimited { retry_after });
                    }
                    let wait = retry_after.min(self.max_wait);
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "absorbing rate-limit wait");
                    tokio::select! {
                        _ = token.cancelled() => return Err(ConnError::Canceled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_reinvokes_after_rate_limit() {
        let waiter = FloodWaiter::default();
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result = waiter
            .run(&token, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ConnError::RateLimited {
                            retry_after: Duration::from_secs(3),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let waiter = FloodWaiter::default();
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result = waiter
            .run(&token, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnError::Client(anyhow::anyhow!("dc unreachable"))) }
            })
            .await;

        assert!(matches!(result, Err(ConnError::Client(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_retries_surfaces_rate_limit() {
        let waiter = FloodWaiter {
            max_retries: 2,
            ..FloodWaiter::default()
        };
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result = waiter
            .run(&token, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ConnError::RateLimited {
                        retry_after: Duration::from_secs(1),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ConnError::RateLimited { .. })));
        // Two waits were absorbed; the third rate limit surfaced.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait_promptly() {
        let waiter = FloodWaiter::default();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = waiter
            .run(&token, || async {
                Err(ConnError::RateLimited {
                    retry_after: Duration::from_secs(30),
                })
            })
            .await;

        assert!(matches!(result, Err(ConnError::Canceled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
