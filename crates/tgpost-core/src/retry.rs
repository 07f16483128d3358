//! Shared retry policy for provider calls.

use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::sleep;

use crate::provider::{ProviderError, ProviderErrorKind};

/// Errors that can be classified as worth another attempt.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self.kind,
            ProviderErrorKind::NotFound | ProviderErrorKind::AuthRequired
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
    /// Multiplier applied to `delay` after each failed attempt (1.0 = fixed).
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 1.0,
        }
    }

    /// Entity lookups: 3 attempts, 1s apart.
    pub fn entity_default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }

    /// Message lookups: 3 attempts, 500ms apart.
    pub fn message_default() -> Self {
        Self::fixed(3, Duration::from_millis(500))
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        if self.backoff <= 1.0 {
            return self.delay;
        }
        let factor = self.backoff.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(self.delay.as_secs_f64() * factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `before_retry` runs after a retryable failure
    /// and before the delay.
    pub async fn run<T, E, F, Fut, H, HFut>(
        &self,
        label: &str,
        mut op: F,
        mut before_retry: H,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&E) -> HFut,
        HFut: Future<Output = ()>,
        E: IsRetryable + Display,
    {
        let mut attempt = 1u32;
        loop {
            match op(attempt).await {
                Ok(v) => {
                    if attempt > 1 {
                        tracing::info!(op = label, attempts = attempt, "succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        op = label,
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        "attempt failed, retrying"
                    );
                    before_retry(&e).await;
                    sleep(self.delay_after(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(op = label, error = %e, attempts = attempt, "giving up");
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::message_default()
    }
}
