// Fixed-delay retry shared by stream backoff and the initial-state poll.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Result of one attempt handed to [`FixedRetry::run`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Finished; stop retrying and return the value.
    Done(T),
    /// Not yet; wait the fixed delay and try again.
    Retry,
}

/// Retry an operation with a constant delay until it succeeds or the
/// token is cancelled. No attempt cap.
#[derive(Debug, Clone, Copy)]
pub struct FixedRetry {
    pub delay: Duration,
}

impl FixedRetry {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Sleep for the fixed delay. Returns `false` if cancelled first.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.delay) => true,
        }
    }

    /// Call `op` until it yields [`RetryOutcome::Done`], pausing between
    /// attempts. Returns `None` if cancelled, including mid-attempt.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = RetryOutcome<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                outcome = op(attempt) => outcome,
            };

            match outcome {
                RetryOutcome::Done(value) => return Some(value),
                RetryOutcome::Retry => {
                    tracing::debug!(
                        delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
                        attempt,
                        "Retrying after fixed delay"
                    );
                    if !self.pause(cancel).await {
                        return None;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
