// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! Per-backend adapters (§4.6): translate upstream cart/checkout state
//! into the UCP [`Checkout`](ucp_core::Checkout) envelope, enforce PUT
//! semantics at the boundary, and apply the escalation predicate (§4.7).
//!
//! Every backend implements the same [`Adapter`] operation set; the
//! gateway crate dispatches to one or the other purely based on which
//! [`ucp_id::CheckoutId`] variant an incoming id decodes to.

pub mod error;
pub mod escalation;
pub mod oauth;
pub mod wc;

pub use escalation::EscalationConfig;
pub use oauth::OauthAdapter;
pub use wc::WcAdapter;

use async_trait::async_trait;
use ucp_core::{Address, Buyer, Checkout, Message, NegotiatedContext, Payment};
use ucp_error::GatewayError;

/// Input to [`Adapter::create_checkout`] (§6.1 `POST /checkout-sessions`
/// body). Exactly one of `cart_token` or `line_items` drives the create:
/// a `cart_token` resumes an existing upstream cart, `line_items` starts
/// a fresh one.
#[derive(Debug, Clone, Default)]
pub struct CreateCheckoutInput {
    /// Resume an existing cart by its upstream token, bypassing line-item
    /// seeding entirely.
    pub cart_token: Option<String>,
    /// Seed a fresh cart with these lines when no `cart_token` is given.
    pub line_items: Vec<ucp_reconcile::DesiredLineItem>,
    /// Shipping destination, if known at creation time.
    pub shipping_address: Option<Address>,
    /// Billing address, if known at creation time.
    pub billing_address: Option<Address>,
    /// Buyer identity, if known at creation time.
    pub buyer: Option<Buyer>,
}

/// Full desired state for [`Adapter::update_checkout`] (§4.6 PUT
/// semantics). `line_items` and `discount_codes` are `Option` so the
/// adapter can distinguish "field absent" (validation error) from "field
/// present but empty" (line items: validation error; discount codes:
/// remove all).
#[derive(Debug, Clone, Default)]
pub struct UpdateCheckoutInput {
    /// Desired full line-item set. `None` is a validation error; `Some(vec![])`
    /// is also a validation error (§4.6).
    pub line_items: Option<Vec<ucp_reconcile::DesiredLineItem>>,
    /// Desired full discount-code set. `None` is a validation error;
    /// `Some(vec![])` removes every applied code.
    pub discount_codes: Option<Vec<String>>,
    /// Desired shipping address.
    pub shipping_address: Option<Address>,
    /// Desired billing address.
    pub billing_address: Option<Address>,
    /// Desired buyer identity.
    pub buyer: Option<Buyer>,
    /// Selected fulfillment option id.
    pub fulfillment_option_id: Option<String>,
}

/// The single operation set every backend adapter implements (§4.6).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Fetch the merchant's discovery profile (§6.1 `/.well-known/ucp`).
    /// No negotiation is performed for this operation.
    async fn get_profile(&self) -> Result<ucp_core::AgentProfile, GatewayError>;

    /// Start or resume a checkout session.
    async fn create_checkout(
        &self,
        input: CreateCheckoutInput,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError>;

    /// Read the current state of a checkout session.
    async fn get_checkout(&self, id: &str, ctx: &NegotiatedContext) -> Result<Checkout, GatewayError>;

    /// Reconcile a checkout session to the given full desired state.
    async fn update_checkout(
        &self,
        id: &str,
        input: UpdateCheckoutInput,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError>;

    /// Submit payment and attempt to complete the checkout.
    async fn complete_checkout(
        &self,
        id: &str,
        payment: Payment,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError>;

    /// Cancel a checkout session.
    async fn cancel_checkout(&self, id: &str, ctx: &NegotiatedContext) -> Result<Checkout, GatewayError>;
}

/// Validate PUT semantics at the adapter entrance (§4.6). Returns the
/// concrete line-item and discount-code sets, or the first validation
/// failure encountered.
///
/// # Errors
///
/// Returns a [`GatewayError::validation`] when `line_items` is absent or
/// empty, or when `discount_codes` is absent.
pub fn validate_put_semantics(
    input: &UpdateCheckoutInput,
) -> Result<(&[ucp_reconcile::DesiredLineItem], &[String]), GatewayError> {
    let line_items = input
        .line_items
        .as_deref()
        .ok_or_else(|| GatewayError::validation("line_items is required for PUT").with_path("$.line_items"))?;
    if line_items.is_empty() {
        return Err(GatewayError::validation("line_items must contain at least one item")
            .with_path("$.line_items"));
    }

    let discount_codes = input
        .discount_codes
        .as_deref()
        .ok_or_else(|| GatewayError::validation("discount_codes is required for PUT").with_path("$.discount_codes"))?;

    Ok((line_items, discount_codes))
}

/// Enforce the "prefer erroring out" resolution (§9 open question) for a
/// submitted [`Payment`]: validation fails unless exactly one instrument
/// is `selected`.
///
/// # Errors
///
/// Returns a [`GatewayError::validation`] when zero or more than one
/// instrument is selected.
pub fn require_single_selected_instrument(
    payment: &Payment,
) -> Result<&ucp_core::PaymentInstrument, GatewayError> {
    let selected = payment.selected();
    match selected.len() {
        1 => Ok(selected[0]),
        0 => Err(GatewayError::validation("no payment instrument is selected").with_path("$.payment.instruments")),
        _ => Err(GatewayError::validation("more than one payment instrument is selected")
            .with_path("$.payment.instruments")),
    }
}

/// Append a degraded-mode advisory to `checkout` when negotiation fell back
/// to the merchant's full profile after an agent-profile fetch failure
/// (§4.1, §9 "Fetch-failure degraded mode"). A no-op when `ctx` is not
/// degraded.
pub fn push_degraded_notice(checkout: &mut Checkout, ctx: &NegotiatedContext) {
    if let Some(reason) = &ctx.fetch_error {
        checkout.messages.push(Message::warning(
            "AGENT_PROFILE_DEGRADED",
            format!("agent profile could not be fetched, proceeding with the merchant's full profile: {reason}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_degraded_notice_is_noop_without_fetch_error() {
        let mut checkout = Checkout::error_envelope("id", "USD", ucp_core::Message::info("X", "x"));
        let before = checkout.messages.len();
        let ctx = NegotiatedContext {
            profile_url: "https://agent.example/profile".into(),
            version: "2026-01-11".into(),
            capabilities: Default::default(),
            payment_handlers: Default::default(),
            fetch_error: None,
        };
        push_degraded_notice(&mut checkout, &ctx);
        assert_eq!(checkout.messages.len(), before);
    }

    #[test]
    fn push_degraded_notice_appends_warning_when_degraded() {
        let mut checkout = Checkout::error_envelope("id", "USD", ucp_core::Message::info("X", "x"));
        let ctx = NegotiatedContext {
            profile_url: "https://agent.example/profile".into(),
            version: "2026-01-11".into(),
            capabilities: Default::default(),
            payment_handlers: Default::default(),
            fetch_error: Some("connection refused".into()),
        };
        push_degraded_notice(&mut checkout, &ctx);
        let last = checkout.messages.last().unwrap();
        assert_eq!(last.code, "AGENT_PROFILE_DEGRADED");
    }

    #[test]
    fn missing_line_items_is_validation_error() {
        let input = UpdateCheckoutInput {
            discount_codes: Some(vec![]),
            ..Default::default()
        };
        let err = validate_put_semantics(&input).unwrap_err();
        assert_eq!(err.message, "line_items is required for PUT");
    }

    #[test]
    fn empty_line_items_is_validation_error() {
        let input = UpdateCheckoutInput {
            line_items: Some(vec![]),
            discount_codes: Some(vec![]),
            ..Default::default()
        };
        let err = validate_put_semantics(&input).unwrap_err();
        assert_eq!(err.message, "line_items must contain at least one item");
    }

    #[test]
    fn missing_discount_codes_is_validation_error() {
        let input = UpdateCheckoutInput {
            line_items: Some(vec![ucp_reconcile::DesiredLineItem {
                product_id: "p1".into(),
                variant_id: None,
                quantity: 1,
            }]),
            ..Default::default()
        };
        let err = validate_put_semantics(&input).unwrap_err();
        assert_eq!(err.message, "discount_codes is required for PUT");
    }

    #[test]
    fn empty_discount_codes_is_accepted_as_remove_all() {
        let input = UpdateCheckoutInput {
            line_items: Some(vec![ucp_reconcile::DesiredLineItem {
                product_id: "p1".into(),
                variant_id: None,
                quantity: 1,
            }]),
            discount_codes: Some(vec![]),
            ..Default::default()
        };
        assert!(validate_put_semantics(&input).is_ok());
    }

    fn instrument(id: &str, selected: bool) -> ucp_core::PaymentInstrument {
        ucp_core::PaymentInstrument {
            id: id.into(),
            handler_id: "dev.ucp.payments.stripe".into(),
            kind: "card".into(),
            credential: ucp_core::Credential {
                kind: "stripe_payment_method".into(),
                token: "pm_1".into(),
            },
            selected,
            billing_address: None,
        }
    }

    #[test]
    fn single_selected_instrument_is_accepted() {
        let payment = Payment {
            instruments: vec![instrument("a", false), instrument("b", true)],
        };
        let picked = require_single_selected_instrument(&payment).unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn zero_selected_instruments_is_rejected() {
        let payment = Payment {
            instruments: vec![instrument("a", false)],
        };
        assert!(require_single_selected_instrument(&payment).is_err());
    }

    #[test]
    fn multiple_selected_instruments_is_rejected() {
        let payment = Payment {
            instruments: vec![instrument("a", true), instrument("b", true)],
        };
        assert!(require_single_selected_instrument(&payment).is_err());
    }
}
