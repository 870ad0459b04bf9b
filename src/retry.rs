//! Shared retry policy: capped exponential backoff with jitter.
//!
//! One policy instance is built from config at startup and handed to every
//! upstream client (code host, model endpoint). Retrying happens inside the
//! clients; callers above them see only the final result.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::Result;

/// Retry policy for upstream calls.
///
/// A call is retried only while its error classifies as transient
/// (`AppError::is_transient`). The delay doubles per attempt, gains up to
/// 50% random jitter and never exceeds `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget, first try included
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Cap applied to every delay, jitter included before the cap on the
    /// deterministic part only
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Deterministic backoff for a zero-based attempt index: base * 2^attempt,
    /// capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Backoff with up to half the deterministic delay added as jitter,
    /// so synchronized clients fan out instead of thundering together.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_delay(attempt);
        let spread_ms = (base.as_millis() as u64) / 2;
        if spread_ms == 0 {
            return base;
        }
        let extra = rand::rng().random_range(0..=spread_ms);
        base + Duration::from_millis(extra)
    }

    /// Run `op` until it succeeds, fails permanently, or exhausts the
    /// attempt budget. The final error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, call: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.jittered_delay(attempt);
                    tracing::warn!(
                        call,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
