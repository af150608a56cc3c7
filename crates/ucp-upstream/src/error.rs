//! Upstream HTTP error type and its mapping onto the gateway's closed
//! error taxonomy (§7, propagation policy).

use ucp_error::{ErrorCode, GatewayError};

/// An error raised while talking to an upstream merchant-platform API.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The request never reached the upstream, or the response never
    /// came back (DNS, connect, TLS, timeout).
    #[error("transport error calling {context}: {source}")]
    Transport {
        /// Human-readable call site, e.g. `"GET /cart"`.
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The upstream responded with a status outside the 2xx/3xx range
    /// this client treats as success.
    #[error("upstream {context} returned {status}: {body}")]
    Status {
        /// Human-readable call site.
        context: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated to a reasonable length for logging.
        body: String,
        /// `Retry-After` header value, if present (used for 429 mapping).
        retry_after: Option<String>,
    },
    /// The response body could not be parsed as the expected JSON shape.
    #[error("failed to decode {context} response: {source}")]
    Decode {
        /// Human-readable call site.
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A response header required to continue the nonce chain was absent
    /// (§4.4.2/§4.4.3).
    #[error("upstream {context} response missing required header {header}")]
    MissingHeader {
        /// Human-readable call site.
        context: &'static str,
        /// Name of the missing header.
        header: &'static str,
    },
}

impl UpstreamError {
    /// Map this transport-level error onto the gateway's closed taxonomy
    /// (§7). `429` maps to `RATE_LIMITED` (carrying `retry_after_seconds`
    /// context when available); everything else maps to `UPSTREAM_ERROR`.
    #[must_use]
    pub fn into_gateway_error(self) -> GatewayError {
        match &self {
            Self::Status {
                status,
                retry_after,
                ..
            } => {
                if let Some(mapped) =
                    ucp_ratelimit::map_upstream_status(*status, retry_after.as_deref())
                {
                    return mapped.with_source(self);
                }
                GatewayError::new(ErrorCode::UpstreamError, self.to_string()).with_source(self)
            }
            _ => {
                let message = self.to_string();
                GatewayError::new(ErrorCode::UpstreamError, message).with_source(self)
            }
        }
    }
}
