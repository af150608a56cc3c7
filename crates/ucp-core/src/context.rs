//! The negotiated request context (§3.5), attached to each in-flight
//! request after capability negotiation.

use crate::capability::{CapabilityRegistry, HandlerRegistry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of a successful negotiation (§3.5, §4.1).
///
/// Carries the intersected view of what the current request is allowed to
/// see: the negotiated version (always the merchant's), the pruned
/// capability and payment-handler registries, and — when the agent
/// profile fetch degraded to a fallback — the `fetch_error` describing
/// why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NegotiatedContext {
    /// The agent profile URL this context was negotiated against.
    pub profile_url: String,
    /// Negotiated protocol version, always the merchant's own version.
    pub version: String,
    /// Intersected, orphan-pruned capability registry.
    pub capabilities: CapabilityRegistry,
    /// Intersected payment-handler registry.
    pub payment_handlers: HandlerRegistry,
    /// Set when the agent profile fetch failed and no prior cache entry
    /// existed, forcing fallback to the merchant's full profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

impl NegotiatedContext {
    /// Whether this context is operating in degraded (fetch-failed)
    /// fallback mode (§4.1, §9 "Fetch-failure degraded mode").
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.fetch_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn degraded_mode_reports_true_only_with_fetch_error() {
        let ctx = NegotiatedContext {
            profile_url: "https://agent.example/profile".into(),
            version: "2026-01-11".into(),
            capabilities: BTreeMap::new(),
            payment_handlers: BTreeMap::new(),
            fetch_error: Some("connection refused".into()),
        };
        assert!(ctx.is_degraded());
    }

    #[test]
    fn non_degraded_context() {
        let ctx = NegotiatedContext {
            profile_url: "https://agent.example/profile".into(),
            version: "2026-01-11".into(),
            capabilities: BTreeMap::new(),
            payment_handlers: BTreeMap::new(),
            fetch_error: None,
        };
        assert!(!ctx.is_degraded());
    }
}
