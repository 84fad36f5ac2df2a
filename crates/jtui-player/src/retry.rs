use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use crate::error::PlayerError;

/// Source of delays, swappable in tests.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real time, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Fixed-backoff retry with a deadline on each attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
    /// Upper bound on a single attempt.
    pub attempt_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(50),
            attempt_deadline: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or attempts run out, returning the last
    /// error on exhaustion.
    pub async fn execute<F, Fut, T>(&self, clock: &dyn Clock, mut op: F) -> Result<T, PlayerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlayerError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = PlayerError::IpcUnreachable("no attempt made".into());

        for attempt in 1..=attempts {
            let deadline = clock.sleep(self.attempt_deadline);
            let result = tokio::select! {
                biased;
                result = op() => result,
                _ = deadline => Err(PlayerError::IpcUnreachable(format!(
                    "no response within {:?}",
                    self.attempt_deadline
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(attempt, error = %e, "IPC attempt failed");
                    last_error = e;
                }
            }

            if attempt < attempts {
                clock.sleep(self.backoff).await;
            }
        }

        Err(last_error)
    }
}
