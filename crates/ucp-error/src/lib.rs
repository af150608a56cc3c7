//! Closed error taxonomy for the UCP gateway.
//!
//! Every gateway error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by
//! [`GatewayError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Whether the caller may retry with different input.
///
/// Attached to every Checkout message of `type = error` (§3.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The caller can fix the request and retry.
    Recoverable,
    /// Retrying with the same or different input will not help.
    Unrecoverable,
    /// The buyer must be routed to a browser-hosted checkout flow.
    Escalation,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Recoverable => "recoverable",
            Self::Unrecoverable => "unrecoverable",
            Self::Escalation => "escalation",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code (§7).
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases. This taxonomy is closed:
/// every failure in the gateway maps onto exactly one of these seven kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request failed input validation (bad body, missing required PUT field).
    ValidationError,
    /// The addressed checkout or resource does not exist upstream.
    NotFound,
    /// Caller lacks valid credentials or the negotiated version is unsupported.
    Unauthorized,
    /// Payment submission was rejected or failed.
    PaymentError,
    /// Upstream or the gateway itself is rate-limiting the caller.
    RateLimited,
    /// The upstream merchant platform returned an unexpected or failure response.
    UpstreamError,
    /// Catch-all for unmapped/unexpected internal failures.
    InternalError,
}

impl ErrorCode {
    /// HTTP status code this error kind maps to (§7).
    ///
    /// `Unauthorized` maps to `401`; callers that need to distinguish `403`
    /// (negotiated-but-forbidden) from `401` (no credentials) should prefer
    /// [`GatewayError::with_http_status`] to override on a per-error basis.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::NotFound => 404,
            Self::Unauthorized => 401,
            Self::PaymentError => 402,
            Self::RateLimited => 429,
            Self::UpstreamError => 502,
            Self::InternalError => 500,
        }
    }

    /// Default [`Severity`] this error kind carries when surfaced as a
    /// Checkout message (§7 table).
    pub fn severity(&self) -> Severity {
        match self {
            Self::ValidationError | Self::PaymentError | Self::RateLimited => {
                Severity::Recoverable
            }
            Self::NotFound | Self::Unauthorized | Self::UpstreamError | Self::InternalError => {
                Severity::Unrecoverable
            }
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"VALIDATION_ERROR"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PaymentError => "PAYMENT_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Unified gateway error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// JSONPath locating the offending field, an optional source error for
/// cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use ucp_error::{ErrorCode, GatewayError};
///
/// let err = GatewayError::new(ErrorCode::UpstreamError, "store API returned 503")
///     .with_context("backend", "woocommerce")
///     .with_path("$.line_items[0]");
/// ```
pub struct GatewayError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// JSONPath pointing at the offending field, if applicable.
    pub path: Option<String>,
    /// Severity override; defaults to `code.severity()` when unset.
    pub severity_override: Option<Severity>,
    /// HTTP status override; defaults to `code.http_status()` when unset.
    pub http_status_override: Option<u16>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl GatewayError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            severity_override: None,
            http_status_override: None,
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Shorthand for [`ErrorCode::ValidationError`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Shorthand for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Shorthand for [`ErrorCode::UpstreamError`].
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamError, message)
    }

    /// Attach a JSONPath locating the offending field.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Override the default severity for this error kind.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity_override = Some(severity);
        self
    }

    /// Override the default HTTP status for this error kind (e.g. 403
    /// instead of 401 for an `Unauthorized` produced after successful
    /// authentication but a denied operation).
    #[must_use]
    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status_override = Some(status);
        self
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Effective severity: the override if set, else `code.severity()`.
    pub fn severity(&self) -> Severity {
        self.severity_override.unwrap_or_else(|| self.code.severity())
    }

    /// Effective HTTP status: the override if set, else `code.http_status()`.
    pub fn http_status(&self) -> u16 {
        self.http_status_override.unwrap_or_else(|| self.code.http_status())
    }
}

impl fmt::Debug for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("GatewayError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref path) = self.path {
            d.field("path", path);
        }
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " at {path}")?;
        }
        if !self.context.is_empty() {
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`GatewayError`] (without the opaque source).
///
/// Used both for the bare `{"error": {...}}` document that discovery and
/// JSON-RPC transports may return, and as the basis for the `messages[]`
/// entry the checkout endpoints always emit instead (§7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// JSONPath pointing at the offending field, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Effective severity.
    pub severity: Severity,
    /// Structured context.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&GatewayError> for GatewayErrorDto {
    fn from(err: &GatewayError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            path: err.path.clone(),
            severity: err.severity(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::ValidationError,
        ErrorCode::NotFound,
        ErrorCode::Unauthorized,
        ErrorCode::PaymentError,
        ErrorCode::RateLimited,
        ErrorCode::UpstreamError,
        ErrorCode::InternalError,
    ];

    #[test]
    fn error_code_count() {
        assert_eq!(ALL_CODES.len(), 7);
    }

    #[test]
    fn http_status_mapping_matches_taxonomy_table() {
        assert_eq!(ErrorCode::ValidationError.http_status(), 400);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::PaymentError.http_status(), 402);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::UpstreamError.http_status(), 502);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn severity_mapping_matches_taxonomy_table() {
        assert_eq!(ErrorCode::ValidationError.severity(), Severity::Recoverable);
        assert_eq!(ErrorCode::NotFound.severity(), Severity::Unrecoverable);
        assert_eq!(ErrorCode::Unauthorized.severity(), Severity::Unrecoverable);
        assert_eq!(ErrorCode::PaymentError.severity(), Severity::Recoverable);
        assert_eq!(ErrorCode::RateLimited.severity(), Severity::Recoverable);
        assert_eq!(ErrorCode::UpstreamError.severity(), Severity::Unrecoverable);
        assert_eq!(ErrorCode::InternalError.severity(), Severity::Unrecoverable);
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()));
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn display_without_context() {
        let err = GatewayError::not_found("no such checkout");
        assert_eq!(err.to_string(), "[NOT_FOUND] no such checkout");
    }

    #[test]
    fn display_with_path_and_context() {
        let err = GatewayError::validation("unknown discount code")
            .with_path("$.discounts.codes[0]")
            .with_context("code", "BOGUS");
        let s = err.to_string();
        assert!(s.contains("VALIDATION_ERROR"));
        assert!(s.contains("$.discounts.codes[0]"));
        assert!(s.contains("BOGUS"));
    }

    #[test]
    fn severity_override_wins() {
        let err = GatewayError::not_found("gone").with_severity(Severity::Escalation);
        assert_eq!(err.severity(), Severity::Escalation);
    }

    #[test]
    fn http_status_override_wins() {
        let err = GatewayError::new(ErrorCode::Unauthorized, "forbidden").with_http_status(403);
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn http_status_default_unaffected_by_other_overrides() {
        let err = GatewayError::not_found("gone").with_severity(Severity::Escalation);
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn source_chain_preserved() {
        let inner = io::Error::new(io::ErrorKind::TimedOut, "upstream timed out");
        let err = GatewayError::upstream("store API unreachable").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "upstream timed out");
    }

    #[test]
    fn dto_roundtrip() {
        let err = GatewayError::validation("bad field")
            .with_path("$.line_items")
            .with_context("reason", "empty");
        let dto: GatewayErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: GatewayErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert_eq!(back.severity, Severity::Recoverable);
    }

    #[test]
    fn dto_omits_empty_context_and_missing_source() {
        let err = GatewayError::not_found("nope");
        let dto: GatewayErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("context"));
        assert!(!json.contains("source_message"));
    }

    #[test]
    fn error_code_serde_roundtrip() {
        let json = serde_json::to_string(&ErrorCode::RateLimited).unwrap();
        assert_eq!(json, r#""RATE_LIMITED""#);
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::RateLimited);
    }

    #[test]
    fn severity_serde_roundtrip() {
        let json = serde_json::to_string(&Severity::Escalation).unwrap();
        assert_eq!(json, r#""escalation""#);
    }
}
