//! Per-merchant escalation predicate (§4.7): force `requires_escalation`
//! when a cart contains a configured product or a line's server-exposed
//! metadata carries a configured key.

use serde_json::Map;
use std::collections::BTreeSet;

/// Code attached to the escalation [`ucp_core::Message`] (§4.7).
pub const ESCALATION_MESSAGE_CODE: &str = "ESCALATION_REQUIRED";

/// Per-merchant escalation configuration (§4.7, §6.3).
#[derive(Debug, Clone, Default)]
pub struct EscalationConfig {
    /// Product ids that always force escalation.
    pub product_ids: BTreeSet<String>,
    /// Metadata keys that, if present on a line's extensions, force
    /// escalation regardless of product id.
    pub custom_fields: BTreeSet<String>,
}

impl EscalationConfig {
    /// Build a config from the configuration's raw integer product ids and
    /// custom field names (§6.3).
    #[must_use]
    pub fn new(product_ids: impl IntoIterator<Item = i64>, custom_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            product_ids: product_ids.into_iter().map(|id| id.to_string()).collect(),
            custom_fields: custom_fields.into_iter().collect(),
        }
    }

    /// Whether this configuration has no triggers at all (escalation
    /// scanning is skipped entirely when empty).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty() && self.custom_fields.is_empty()
    }
}

/// A single line that triggered escalation, carrying enough to rebuild the
/// shareable upstream link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationTrigger {
    /// Canonical product id.
    pub product_id: String,
    /// Line quantity, carried into the rebuilt link.
    pub quantity: u32,
}

/// Scan `lines` against `config` and return every triggering line, in
/// cart order (§4.7). A line's extensions matching any configured custom
/// field key, or its product id matching a configured id, both trigger.
#[must_use]
pub fn evaluate(
    lines: &[(String, u32, &Map<String, serde_json::Value>)],
    config: &EscalationConfig,
) -> Vec<EscalationTrigger> {
    if config.is_empty() {
        return Vec::new();
    }

    lines
        .iter()
        .filter(|(product_id, _, extensions)| {
            config.product_ids.contains(product_id)
                || extensions.keys().any(|k| config.custom_fields.contains(k))
        })
        .map(|(product_id, quantity, _)| EscalationTrigger {
            product_id: product_id.clone(),
            quantity: *quantity,
        })
        .collect()
}

/// Build the shareable `continue_url` re-adding the triggering products
/// (§4.7): `/checkout-link/?products=ID:QTY,...`.
#[must_use]
pub fn continue_url(triggers: &[EscalationTrigger]) -> String {
    let products = triggers
        .iter()
        .map(|t| format!("{}:{}", t.product_id, t.quantity))
        .collect::<Vec<_>>()
        .join(",");
    format!("/checkout-link/?products={products}")
}
