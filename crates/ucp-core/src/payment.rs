//! Payment instruments submitted on `complete_checkout`.

use crate::checkout::Address;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A submitted payment: a list of instruments, exactly one of which must be
/// marked `selected = true` (§3.3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Payment {
    /// Submitted payment instruments.
    pub instruments: Vec<PaymentInstrument>,
}

impl Payment {
    /// All instruments marked `selected = true`, in iteration order.
    #[must_use]
    pub fn selected(&self) -> Vec<&PaymentInstrument> {
        self.instruments.iter().filter(|i| i.selected).collect()
    }

    /// The first selected instrument, if any. The gateway routes on
    /// `credential.type`, never on `handler_id` (§3.3) — callers that need
    /// the selected instrument should match on its `credential.r#type`.
    #[must_use]
    pub fn first_selected(&self) -> Option<&PaymentInstrument> {
        self.instruments.iter().find(|i| i.selected)
    }
}

/// A single payment instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaymentInstrument {
    /// Stable instrument id.
    pub id: String,
    /// Advertised payment-handler family this instrument was collected by.
    /// Opaque to the gateway — never used for routing (§3.3).
    pub handler_id: String,
    /// Free-form instrument type (e.g. `"card"`, `"wallet"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque credential the gateway forwards upstream unmodified.
    pub credential: Credential,
    /// Whether this is the instrument to charge.
    pub selected: bool,
    /// Optional billing address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
}

/// An opaque payment credential: a type tag and an opaque bearer token.
///
/// The gateway never inspects or transforms `token`; it is passed through
/// to the upstream merchant platform unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Credential {
    /// Credential type (e.g. `"stripe_payment_method"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque token. Never logged.
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(id: &str, selected: bool) -> PaymentInstrument {
        PaymentInstrument {
            id: id.into(),
            handler_id: "dev.ucp.payments.stripe".into(),
            kind: "card".into(),
            credential: Credential {
                kind: "stripe_payment_method".into(),
                token: "pm_123".into(),
            },
            selected,
            billing_address: None,
        }
    }

    #[test]
    fn first_selected_returns_first_in_order() {
        let payment = Payment {
            instruments: vec![instrument("a", false), instrument("b", true), instrument("c", true)],
        };
        assert_eq!(payment.first_selected().unwrap().id, "b");
        assert_eq!(payment.selected().len(), 2);
    }

    #[test]
    fn no_selected_instrument() {
        let payment = Payment {
            instruments: vec![instrument("a", false)],
        };
        assert!(payment.first_selected().is_none());
    }

    #[test]
    fn credential_serializes_type_as_reserved_word() {
        let cred = Credential {
            kind: "stripe_payment_method".into(),
            token: "pm_123".into(),
        };
        let json = serde_json::to_value(&cred).unwrap();
        assert_eq!(json["type"], serde_json::json!("stripe_payment_method"));
    }
}
