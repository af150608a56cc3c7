// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! Exponential backoff retry for transient upstream failures.
//!
//! Used by `ucp-upstream` to retry nonce preflights and mutation calls
//! against both backends when the failure looks transient (connection
//! reset, timeout, `5xx`). Generic over the caller's error type so it
//! carries no dependency on the gateway error taxonomy.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Configuration for retry behaviour against an upstream backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial attempt.
    /// `0` means only the initial attempt (no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Overall wall-clock timeout across all attempts.
    #[serde(with = "duration_millis")]
    pub overall_timeout: Duration,
    /// Jitter factor in `[0.0, 1.0]`. 0 = no jitter, 1 = full jitter.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            overall_timeout: Duration::from_secs(15),
            jitter_factor: 0.5,
        }
    }
}

/// Serde helper — `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        val.as_millis().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Record of a single failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-indexed attempt number.
    pub attempt: u32,
    /// Error message from this attempt.
    pub error: String,
    /// Backoff delay applied before the next attempt.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

/// Metadata captured across all retry attempts, useful for logging and
/// attaching to upstream-error context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// Total number of attempts made (including the successful one).
    pub total_attempts: u32,
    /// Records of each *failed* attempt.
    pub failed_attempts: Vec<RetryAttempt>,
    /// Wall-clock time spanning all attempts.
    #[serde(with = "duration_millis")]
    pub total_duration: Duration,
}

/// Result of a retry-enabled operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The successfully produced value.
    pub value: T,
    /// Retry metadata (empty `failed_attempts` when the first attempt succeeds).
    pub metadata: RetryMetadata,
}

/// Error raised when the overall timeout elapses before an attempt
/// completes, or before any attempt can be made.
#[derive(Debug, thiserror::Error)]
#[error("overall retry timeout of {0:?} exceeded")]
pub struct TimeoutExceeded(pub Duration);

/// Outcome of [`retry_async`]: either the caller's own error (when it was
/// deemed non-retryable or retries were exhausted) or a timeout.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation's own error, surfaced as-is.
    #[error(transparent)]
    Operation(E),
    /// The overall wall-clock budget was exceeded.
    #[error(transparent)]
    Timeout(#[from] TimeoutExceeded),
}

/// Compute the backoff delay for a given zero-indexed attempt number.
#[must_use]
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let delay_ms = (config.base_delay.as_millis() as u64).saturating_mul(exp);
    let capped_ms = delay_ms.min(config.max_delay.as_millis() as u64);

    let jitter_factor = config.jitter_factor.clamp(0.0, 1.0);
    if jitter_factor > 0.0 && capped_ms > 0 {
        let jitter_range = (capped_ms as f64 * jitter_factor) as u64;
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        let pseudo = nanos.wrapping_mul(attempt as u64 + 1);
        let jitter = if jitter_range > 0 { pseudo % jitter_range } else { 0 };
        Duration::from_millis(capped_ms.saturating_sub(jitter))
    } else {
        Duration::from_millis(capped_ms)
    }
}

/// Generic retry loop. Calls `op` up to `max_retries + 1` times with
/// exponential backoff, returning the first successful result along with
/// metadata about failed attempts.
///
/// `retryable` decides whether a given error should trigger a retry; a
/// non-retryable error is returned immediately without backing off.
///
/// # Errors
///
/// Returns [`RetryError::Operation`] if `op` fails with a non-retryable
/// error or retries are exhausted, and [`RetryError::Timeout`] if the
/// overall wall-clock budget elapses first.
pub async fn retry_async<T, E, F, Fut>(
    config: &RetryConfig,
    mut op: F,
    retryable: fn(&E) -> bool,
) -> Result<RetryOutcome<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let max_attempts = config.max_retries + 1;
    let mut failed_attempts = Vec::new();

    for attempt in 0..max_attempts {
        if start.elapsed() >= config.overall_timeout {
            warn!(target: "ucp.retry", attempt, "overall timeout exceeded");
            return Err(TimeoutExceeded(config.overall_timeout).into());
        }

        debug!(target: "ucp.retry", attempt, max_attempts, "attempting upstream call");

        match op().await {
            Ok(value) => {
                let total_duration = start.elapsed();
                debug!(
                    target: "ucp.retry",
                    attempt,
                    total_duration_ms = total_duration.as_millis() as u64,
                    "upstream call succeeded"
                );
                return Ok(RetryOutcome {
                    value,
                    metadata: RetryMetadata {
                        total_attempts: attempt + 1,
                        failed_attempts,
                        total_duration,
                    },
                });
            }
            Err(err) => {
                let is_last = attempt + 1 >= max_attempts;

                if !retryable(&err) {
                    debug!(target: "ucp.retry", error = %err, "non-retryable error, giving up");
                    return Err(RetryError::Operation(err));
                }

                if is_last {
                    warn!(target: "ucp.retry", error = %err, attempt, "max retries exhausted");
                    return Err(RetryError::Operation(err));
                }

                let delay = compute_delay(config, attempt);
                warn!(
                    target: "ucp.retry",
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable error, backing off"
                );

                failed_attempts.push(RetryAttempt {
                    attempt,
                    error: err.to_string(),
                    delay,
                });

                let remaining = config.overall_timeout.saturating_sub(start.elapsed());
                if delay > remaining {
                    return Err(TimeoutExceeded(config.overall_timeout).into());
                }

                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(TimeoutExceeded(config.overall_timeout).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            overall_timeout: Duration::from_secs(5),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn compute_delay_grows_exponentially_and_caps() {
        let config = RetryConfig {
            jitter_factor: 0.0,
            ..fast_config()
        };
        assert_eq!(compute_delay(&config, 0), Duration::from_millis(1));
        assert_eq!(compute_delay(&config, 1), Duration::from_millis(2));
        assert_eq!(compute_delay(&config, 2), Duration::from_millis(4));
        assert_eq!(compute_delay(&config, 10), config.max_delay);
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_retries() {
        let config = fast_config();
        let calls = AtomicU32::new(0);
        let outcome = retry_async::<_, String, _, _>(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(42) }
            },
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.metadata.total_attempts, 1);
        assert!(outcome.metadata.failed_attempts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let config = fast_config();
        let calls = AtomicU32::new(0);
        let outcome = retry_async(
            &config,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("connection reset".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            |_: &String| true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.metadata.total_attempts, 3);
        assert_eq!(outcome.metadata.failed_attempts.len(), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let config = fast_config();
        let calls = AtomicU32::new(0);
        let result = retry_async(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>("validation failed".to_string()) }
            },
            |_: &String| false,
        )
        .await;
        assert!(matches!(result, Err(RetryError::Operation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_the_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            ..fast_config()
        };
        let result = retry_async(
            &config,
            || async { Err::<i32, _>("still failing".to_string()) },
            |_: &String| true,
        )
        .await;
        match result {
            Err(RetryError::Operation(msg)) => assert_eq!(msg, "still failing"),
            other => panic!("expected Operation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let config = RetryConfig {
            max_retries: 0,
            ..fast_config()
        };
        let calls = AtomicU32::new(0);
        let result = retry_async(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>("boom".to_string()) }
            },
            |_: &String| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
