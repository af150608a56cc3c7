//! The agent profile document (§3.4): a UCP metadata object fetched from
//! an agent-owned URL, independent of any cache bookkeeping.

use crate::capability::{CapabilityRegistry, HandlerRegistry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// UCP metadata advertised by an agent (or, reported back, by the
/// merchant) at a profile URL: protocol version, supported capabilities,
/// and supported payment handlers.
///
/// Cache bookkeeping (`fetched_at`, `expires_at`, `etag`) is layered on top
/// by the profile cache, not part of this type — the same shape is used
/// for the merchant's own discovery profile, which is never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentProfile {
    /// UCP protocol version this profile was authored against.
    #[serde(default)]
    pub version: String,
    /// Capability families this party supports.
    #[serde(default)]
    pub capabilities: CapabilityRegistry,
    /// Payment handler families this party supports.
    #[serde(default)]
    pub payment_handlers: HandlerRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_capabilities_map_deserializes_from_missing_field() {
        let profile: AgentProfile = serde_json::from_str(r#"{"version":"2026-01-11"}"#).unwrap();
        assert!(profile.capabilities.is_empty());
        assert!(profile.payment_handlers.is_empty());
    }
}
