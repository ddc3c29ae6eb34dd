//! Retry policy for chunk transfers: linear backoff, bounded attempts.

use std::future::Future;
use std::time::Duration;

use vidhost_core::{UploadConfig, VideoError, VideoResult};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first
    pub max_attempts: u32,
    /// Delay after failed attempt `n` is `n * base_delay`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(upload: &UploadConfig) -> Self {
        Self::new(upload.max_attempts, upload.retry_base_delay())
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `operation` until it succeeds, fails non-transiently, or the
    /// attempt ceiling is reached.
    ///
    /// Non-transient errors are returned unchanged after the first attempt.
    /// Exhausting the ceiling on transient errors yields `TransferFailed`
    /// wrapping the last error.
    pub async fn run<F, Fut, T>(
        &self,
        session_id: &str,
        offset: u64,
        mut operation: F,
    ) -> VideoResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VideoResult<T>>,
    {
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    tracing::warn!(
                        session_id = %session_id,
                        offset = offset,
                        attempts = attempt,
                        error = %err,
                        "Chunk transfer retries exhausted"
                    );
                    return Err(VideoError::TransferFailed {
                        attempts: attempt,
                        offset,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        session_id = %session_id,
                        offset = offset,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Chunk transfer failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
