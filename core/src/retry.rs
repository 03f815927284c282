//! Retry with exponential backoff around a single service call
//!
//! - Delay before retry `k` is `initial * multiplier^k`, capped at `max_delay`
//! - At most `max_attempts` total calls
//! - Only errors classified as rate-limited are retried

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use thiserror::Error;
use tracing::warn;

/// Retry classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota exhausted; retry after backing off
    RateLimited,
    /// Anything else; propagate immediately
    Permanent,
}

/// Trait for error classification
pub trait RetryClassifiable {
    fn classify(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        matches!(self.classify(), ErrorClass::RateLimited)
    }
}

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f32,
    pub max_delay: Duration,
    /// Total calls, including the first
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.multiplier)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    /// Sleeps taken between attempts when every attempt is rate limited
    pub fn delays(&self) -> Vec<Duration> {
        self.backoff().build().collect()
    }
}

fn saturating_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Terminal outcome of a retried call
#[derive(Debug, Error)]
pub enum RetryFailure<E: std::error::Error + 'static> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: E,
    },

    #[error(transparent)]
    Permanent(E),
}

/// Run `operation`, retrying rate-limited failures per `policy`.
///
/// Returns the first success, the first permanent failure, or the last
/// rate-limit failure once attempts are exhausted.
pub async fn call_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::error::Error + RetryClassifiable + 'static,
{
    let attempts = AtomicUsize::new(0);

    let result = (|| {
        attempts.fetch_add(1, Ordering::SeqCst);
        operation()
    })
    .retry(policy.backoff())
    .sleep(tokio::time::sleep)
    .when(|err: &E| err.is_retryable())
    .notify(|err: &E, delay: Duration| {
        warn!(
            attempt = attempts.load(Ordering::SeqCst),
            delay_ms = saturating_millis(delay),
            error = %err,
            "Rate limited, backing off"
        );
    })
    .await;

    result.map_err(|err| {
        if err.is_retryable() {
            RetryFailure::Exhausted {
                attempts: attempts.load(Ordering::SeqCst),
                last: err,
            }
        } else {
            RetryFailure::Permanent(err)
        }
    })
}
