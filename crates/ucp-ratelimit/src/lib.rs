// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! Outbound throttling for upstream backend calls, and the `429` →
//! `RATE_LIMITED` mapping used by the nonce preflight (§4.4.2).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use ucp_error::{ErrorCode, GatewayError};

/// Simple in-memory sliding-window limiter for outbound calls to a single
/// upstream backend, used to stay under the upstream's own rate limit
/// before it has a chance to reject us with `429`.
#[derive(Clone)]
pub struct OutboundLimiter {
    inner: Arc<Mutex<LimiterState>>,
    max_requests: u32,
    window: Duration,
}

struct LimiterState {
    timestamps: VecDeque<Instant>,
}

impl OutboundLimiter {
    /// Create a limiter that allows `max_requests` within a sliding `window`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LimiterState {
                timestamps: VecDeque::new(),
            })),
            max_requests,
            window,
        }
    }

    /// Returns `Ok(())` and records a slot if under the limit, or
    /// `Err(wait)` with how long the caller should back off.
    pub async fn check(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;

        while let Some(&front) = guard.timestamps.front() {
            if now.duration_since(front) > self.window {
                guard.timestamps.pop_front();
            } else {
                break;
            }
        }

        if guard.timestamps.len() as u32 >= self.max_requests {
            let oldest = *guard.timestamps.front().expect("len >= max_requests > 0");
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            return Err(wait);
        }

        guard.timestamps.push_back(now);
        Ok(())
    }
}

/// Parse a `Retry-After` header value as a number of seconds.
///
/// The upstream backends in scope only ever send the delay-seconds form,
/// never an HTTP-date; a malformed value yields `None`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Map an upstream preflight or mutation response into a
/// [`GatewayError`] when it reports `429`, per §4.4.2. Returns `None` for
/// any other status, leaving upstream-generic mapping to the caller.
#[must_use]
pub fn map_upstream_status(status: u16, retry_after: Option<&str>) -> Option<GatewayError> {
    if status != 429 {
        return None;
    }
    let mut err = GatewayError::new(ErrorCode::RateLimited, "upstream rate limit exceeded");
    if let Some(raw) = retry_after {
        if let Some(wait) = parse_retry_after(raw) {
            err = err.with_context("retry_after_seconds", wait.as_secs().to_string());
        }
    }
    Some(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let limiter = OutboundLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check().await.is_ok());
        assert!(limiter.check().await.is_ok());
        assert!(limiter.check().await.is_ok());
    }

    #[tokio::test]
    async fn rejects_requests_over_the_limit_with_a_wait_hint() {
        let limiter = OutboundLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check().await.is_ok());
        let wait = limiter.check().await.unwrap_err();
        assert!(wait <= Duration::from_secs(60));
    }

    #[test]
    fn parses_delay_seconds_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("  7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("not-a-number"), None);
    }

    #[test]
    fn maps_429_to_rate_limited_with_retry_after_context() {
        let err = map_upstream_status(429, Some("12")).unwrap();
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(
            err.context.get("retry_after_seconds").and_then(|v| v.as_str()),
            Some("12")
        );
    }

    #[test]
    fn maps_429_without_retry_after_header() {
        let err = map_upstream_status(429, None).unwrap();
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert!(!err.context.contains_key("retry_after_seconds"));
    }

    #[test]
    fn non_429_status_is_not_mapped() {
        assert!(map_upstream_status(500, None).is_none());
        assert!(map_upstream_status(200, None).is_none());
    }
}
