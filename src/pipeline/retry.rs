//! Exponential backoff with jitter for model calls.
//!
//! The wait before retry `n` (1-based) is
//! `initial_delay_ms * 2^(n-1) + jitter`, jitter uniform in
//! `[0, max_jitter_ms)`. With the defaults the sequence is roughly
//! 1 s → 2 s → 4 s → 8 s → 16 s, each plus up to one second of jitter.
//!
//! Only errors accepted by the caller's predicate are retried; everything
//! else, and the last error once the budget is spent, propagates unchanged.
//! No state is shared between calls.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 5.
    pub max_retries: u32,
    /// Base delay in milliseconds, doubled per retry. Default: 1000.
    pub initial_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter in milliseconds. Default: 1000.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits; for tests and offline tooling.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_jitter_ms: 0,
        }
    }

    /// Deterministic part of the delay before retry `attempt` (1-based).
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_delay_ms.saturating_mul(1u64 << exp)
    }

    /// Full delay before retry `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.max_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.base_delay_ms(attempt).saturating_add(jitter))
    }
}

/// Errors that can say whether they are a rate-limit signal.
pub trait RateLimited {
    fn is_rate_limited(&self) -> bool;
}

impl RateLimited for crate::error::ExtractError {
    fn is_rate_limited(&self) -> bool {
        crate::error::ExtractError::is_rate_limited(self)
    }
}

/// Run `operation`, retrying rate-limit failures under `policy`.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    E: RateLimited + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(policy, |e: &E| e.is_rate_limited(), operation).await
}

/// Run `operation`, retrying every failure for which `should_retry` holds.
pub async fn with_retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt > policy.max_retries || !should_retry(&err) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "Retryable model error ({}); retry {}/{} in {}ms",
                    err,
                    attempt,
                    policy.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
        }
    }
}
