//! Generic bounded retry loop with jittered delay and cooperative
//! cancellation.
//!
//! Retry transient errors, rethrow permanent ones, sleep between attempts
//! using a flat delay plus jitter rather than exponential backoff, and
//! thread everything through a cancellation token so a caller can abort
//! mid-wait.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CancelReason;
use crate::{Result, RouterError};

/// Percentage spread applied to the base delay: `retryDelay ± 20%`.
const RETRY_JITTER_PERCENT: f64 = 20.0;

/// `jitter(base) = max(0, round(base + uniform(-1,1) * base * RETRY_JITTER_PERCENT/100))`.
pub fn jitter(base_ms: u64) -> u64 {
    let base = base_ms as f64;
    let spread = rand::thread_rng().gen_range(-1.0..=1.0) * base * RETRY_JITTER_PERCENT / 100.0;
    (base + spread).round().max(0.0) as u64
}

/// Sleep for `ms`, aborting early with [`RouterError::RequestCancelled`] if
/// `cancel` fires first.
pub async fn sleep(ms: u64, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
        _ = cancel.cancelled() => Err(RouterError::RequestCancelled(CancelReason::Timeout)),
    }
}

/// Parameters for [`execute_with_retry`].
pub struct RetryPolicy<ShouldRetry, OnRetry> {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub should_retry: ShouldRetry,
    pub on_retry: Option<OnRetry>,
}

/// Run `operation` up to `policy.max_retries + 1` times total.
///
/// For `attempt = 0..=max_retries`: check cancellation, run `operation`; on
/// success return; on error, rethrow immediately if cancellation fired,
/// `attempt == max_retries`, or `should_retry(&err)` is false; otherwise
/// call `on_retry` and sleep a jittered delay before the next attempt.
pub async fn execute_with_retry<F, Fut, T, ShouldRetry, OnRetry>(
    policy: RetryPolicy<ShouldRetry, OnRetry>,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    ShouldRetry: Fn(&RouterError) -> bool,
    OnRetry: Fn(u32, &RouterError),
{
    for attempt in 0..=policy.max_retries {
        if cancel.is_cancelled() {
            return Err(RouterError::RequestCancelled(CancelReason::Shutdown));
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let exhausted = attempt == policy.max_retries;
                if cancel.is_cancelled() {
                    return Err(RouterError::RequestCancelled(CancelReason::Shutdown));
                }
                if exhausted || !(policy.should_retry)(&err) {
                    return Err(err);
                }
                if let Some(on_retry) = &policy.on_retry {
                    on_retry(attempt + 1, &err);
                }
                let delay = jitter(policy.retry_delay_ms);
                warn!(attempt = attempt + 1, delay_ms = delay, error = %err, "retrying after transient error");
                sleep(delay, cancel).await?;
            }
        }
    }
    unreachable!("loop always returns on its final iteration")
}
