//! The [`Checkout`] response envelope returned by every gateway operation.

use crate::capability::{CapabilityRegistry, HandlerRegistry};
use crate::payment::Payment;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ucp_error::Severity;

/// Lifecycle state of a checkout session (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Still being assembled; not yet ready for payment.
    Incomplete,
    /// All required fields are present; payment may be submitted.
    ReadyForComplete,
    /// Payment has been submitted and is being processed upstream.
    CompleteInProgress,
    /// Payment succeeded and the order was placed.
    Completed,
    /// The session was canceled.
    Canceled,
    /// The buyer must be routed to a browser-hosted upstream flow.
    RequiresEscalation,
}

/// A typed, ordered amount line in [`Checkout::totals`] (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TotalType {
    /// Sum of per-line discounts.
    ItemsDiscount,
    /// Sum of line items before order-level discounts, fees, tax.
    Subtotal,
    /// Order-level discount amount.
    Discount,
    /// Shipping/fulfillment charge.
    Fulfillment,
    /// Tax amount.
    Tax,
    /// Miscellaneous fee.
    Fee,
    /// Grand total.
    Total,
}

/// A single typed amount entry. Amounts are always integer minor units
/// (e.g. cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Total {
    /// The kind of amount this entry represents.
    #[serde(rename = "type")]
    pub kind: TotalType,
    /// Amount in integer minor units.
    pub amount: i64,
}

impl Total {
    /// Construct a total entry.
    #[must_use]
    pub fn new(kind: TotalType, amount: i64) -> Self {
        Self { kind, amount }
    }
}

/// Push `total` onto `totals`, honoring the suppression rule: `subtotal`
/// and `total` are always emitted; every other zero-valued total is
/// dropped (§3.1).
pub fn push_total(totals: &mut Vec<Total>, total: Total) {
    let always_emit = matches!(total.kind, TotalType::Subtotal | TotalType::Total);
    if always_emit || total.amount != 0 {
        totals.push(total);
    }
}

/// A product reference embedded in a [`LineItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProductRef {
    /// Canonical product id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Unit price in integer minor units.
    pub unit_price: i64,
    /// Optional product image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A single cart/checkout line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    /// Per-session line id (stable within one checkout's lifetime).
    pub id: String,
    /// The referenced product.
    pub product: ProductRef,
    /// Quantity ordered.
    pub quantity: u32,
    /// `unit_price * quantity`, in minor units.
    pub base_amount: i64,
    /// Per-line discount amount, in minor units.
    pub discount: i64,
    /// `base_amount - discount`, in minor units.
    pub subtotal: i64,
    /// Final line total (after any line-level tax/fees), in minor units.
    pub total: i64,
}

/// Buyer identity fields, all optional (§3.1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Buyer {
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A postal address, used for both fulfillment and billing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Address {
    /// Recipient name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Street address, line 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    /// Street address, line 2.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    /// City/locality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State/province/region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Postal/ZIP code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A fulfillment (shipping) method option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FulfillmentOption {
    /// Stable option id, referenced by `fulfillment_option_id`.
    pub id: String,
    /// Display title (e.g. "Standard shipping").
    pub title: String,
    /// Charge for this option, in minor units.
    pub amount: i64,
}

/// A discount code allocation: the code and the amount it contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiscountAllocation {
    /// The applied discount code.
    pub code: String,
    /// Amount allocated to this code, in minor units.
    pub amount: i64,
}

/// Applied discount codes and their allocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Discounts {
    /// Applied discount codes, with their allocated amounts.
    pub applied: Vec<DiscountAllocation>,
}

/// Feedback message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A hard failure; `severity` is required.
    Error,
    /// A non-fatal issue the caller should know about.
    Warning,
    /// Informational note.
    Info,
}

/// A single typed feedback message attached to a [`Checkout`] (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Stable machine code (e.g. `"ESCALATION_REQUIRED"`).
    pub code: String,
    /// Human-readable content.
    pub content: String,
    /// JSONPath pointing at the offending field, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Required when `type = error`: whether the caller may retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Message {
    /// Build an error message. `severity` is mandatory for errors (§3.1).
    #[must_use]
    pub fn error(code: impl Into<String>, content: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: MessageType::Error,
            code: code.into(),
            content: content.into(),
            path: None,
            severity: Some(severity),
        }
    }

    /// Build a warning message.
    #[must_use]
    pub fn warning(code: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Warning,
            code: code.into(),
            content: content.into(),
            path: None,
            severity: None,
        }
    }

    /// Build an info message.
    #[must_use]
    pub fn info(code: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Info,
            code: code.into(),
            content: content.into(),
            path: None,
            severity: None,
        }
    }

    /// Attach a JSONPath to an existing message.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Protocol metadata reported in every [`Checkout`] response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UcpMeta {
    /// Negotiated protocol version (always the merchant's version; §4.1).
    pub version: String,
    /// Capabilities filtered to what the negotiated context allows.
    pub capabilities: CapabilityRegistry,
    /// Payment handlers filtered to what the negotiated context allows.
    pub payment_handlers: HandlerRegistry,
}

/// The domain object returned by every checkout operation (§3.1).
///
/// **Invariant.** Even error paths emit a `Checkout` (with a single error
/// message and `status = incomplete`); callers never see a bare error
/// document on any `/checkout-sessions/*` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Checkout {
    /// Opaque checkout id (§4.2).
    pub id: String,
    /// Lifecycle status.
    pub status: CheckoutStatus,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Line items.
    pub line_items: Vec<LineItem>,
    /// Ordered typed amounts.
    pub totals: Vec<Total>,
    /// Buyer identity, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,
    /// Available fulfillment options.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fulfillment_options: Vec<FulfillmentOption>,
    /// Selected fulfillment option id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_option_id: Option<String>,
    /// Shipping destination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_address: Option<Address>,
    /// Applied discount codes.
    #[serde(default)]
    pub discounts: Discounts,
    /// Submitted payment instruments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    /// Feedback messages.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Set when `status = requires_escalation` or on a post-payment redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_url: Option<String>,
    /// Set after successful completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Set after successful completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_permalink_url: Option<String>,
    /// Protocol metadata.
    pub ucp: UcpMeta,
}

impl Checkout {
    /// Minimal error-path envelope satisfying the §3.1 invariant: a single
    /// error message and `status = incomplete`.
    #[must_use]
    pub fn error_envelope(id: impl Into<String>, currency: impl Into<String>, message: Message) -> Self {
        Self {
            id: id.into(),
            status: CheckoutStatus::Incomplete,
            currency: currency.into(),
            line_items: Vec::new(),
            totals: Vec::new(),
            buyer: None,
            fulfillment_options: Vec::new(),
            fulfillment_option_id: None,
            fulfillment_address: None,
            discounts: Discounts::default(),
            payment: None,
            messages: vec![message],
            continue_url: None,
            order_id: None,
            order_permalink_url: None,
            ucp: UcpMeta::default(),
        }
    }

    /// Whether `messages` satisfies the checkout-envelope error rule
    /// (property 12, §8): a leading `error` message carries a severity.
    #[must_use]
    pub fn has_well_formed_error(&self) -> bool {
        match self.messages.first() {
            Some(m) if m.kind == MessageType::Error => m.severity.is_some(),
            _ => true,
        }
    }
}

/// Builder for constructing [`Checkout`]s ergonomically, e.g. in adapters
/// translating upstream state into the UCP shape.
#[derive(Debug)]
pub struct CheckoutBuilder {
    id: String,
    status: CheckoutStatus,
    currency: String,
    line_items: Vec<LineItem>,
    totals: Vec<Total>,
    buyer: Option<Buyer>,
    fulfillment_options: Vec<FulfillmentOption>,
    fulfillment_option_id: Option<String>,
    fulfillment_address: Option<Address>,
    discounts: Discounts,
    payment: Option<Payment>,
    messages: Vec<Message>,
    continue_url: Option<String>,
    order_id: Option<String>,
    order_permalink_url: Option<String>,
    ucp: UcpMeta,
}

impl CheckoutBuilder {
    /// Create a new builder for a checkout with the given id and currency,
    /// defaulting to `status = incomplete`.
    #[must_use]
    pub fn new(id: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: CheckoutStatus::Incomplete,
            currency: currency.into(),
            line_items: Vec::new(),
            totals: Vec::new(),
            buyer: None,
            fulfillment_options: Vec::new(),
            fulfillment_option_id: None,
            fulfillment_address: None,
            discounts: Discounts::default(),
            payment: None,
            messages: Vec::new(),
            continue_url: None,
            order_id: None,
            order_permalink_url: None,
            ucp: UcpMeta::default(),
        }
    }

    /// Set the lifecycle status.
    #[must_use]
    pub fn status(mut self, status: CheckoutStatus) -> Self {
        self.status = status;
        self
    }
    /// Replace the line items.
    #[must_use]
    pub fn line_items(mut self, line_items: Vec<LineItem>) -> Self {
        self.line_items = line_items;
        self
    }
    /// Add one total, honoring the zero-suppression rule (§3.1).
    #[must_use]
    pub fn total(mut self, total: Total) -> Self {
        push_total(&mut self.totals, total);
        self
    }
    /// Set the buyer.
    #[must_use]
    pub fn buyer(mut self, buyer: Buyer) -> Self {
        self.buyer = Some(buyer);
        self
    }
    /// Replace the fulfillment options.
    #[must_use]
    pub fn fulfillment_options(mut self, options: Vec<FulfillmentOption>) -> Self {
        self.fulfillment_options = options;
        self
    }
    /// Set the selected fulfillment option id.
    #[must_use]
    pub fn fulfillment_option_id(mut self, id: impl Into<String>) -> Self {
        self.fulfillment_option_id = Some(id.into());
        self
    }
    /// Set the fulfillment address.
    #[must_use]
    pub fn fulfillment_address(mut self, address: Address) -> Self {
        self.fulfillment_address = Some(address);
        self
    }
    /// Set the applied discounts.
    #[must_use]
    pub fn discounts(mut self, discounts: Discounts) -> Self {
        self.discounts = discounts;
        self
    }
    /// Set the submitted payment.
    #[must_use]
    pub fn payment(mut self, payment: Payment) -> Self {
        self.payment = Some(payment);
        self
    }
    /// Append a feedback message.
    #[must_use]
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }
    /// Set the continuation URL.
    #[must_use]
    pub fn continue_url(mut self, url: impl Into<String>) -> Self {
        self.continue_url = Some(url.into());
        self
    }
    /// Set the order id and permalink after successful completion.
    #[must_use]
    pub fn order(mut self, order_id: impl Into<String>, permalink_url: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self.order_permalink_url = Some(permalink_url.into());
        self
    }
    /// Set the protocol metadata.
    #[must_use]
    pub fn ucp(mut self, ucp: UcpMeta) -> Self {
        self.ucp = ucp;
        self
    }

    /// Finalize the [`Checkout`].
    #[must_use]
    pub fn build(self) -> Checkout {
        Checkout {
            id: self.id,
            status: self.status,
            currency: self.currency,
            line_items: self.line_items,
            totals: self.totals,
            buyer: self.buyer,
            fulfillment_options: self.fulfillment_options,
            fulfillment_option_id: self.fulfillment_option_id,
            fulfillment_address: self.fulfillment_address,
            discounts: self.discounts,
            payment: self.payment,
            messages: self.messages,
            continue_url: self.continue_url,
            order_id: self.order_id,
            order_permalink_url: self.order_permalink_url,
            ucp: self.ucp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_total_always_emits_subtotal_and_total_even_when_zero() {
        let mut totals = Vec::new();
        push_total(&mut totals, Total::new(TotalType::Subtotal, 0));
        push_total(&mut totals, Total::new(TotalType::Total, 0));
        push_total(&mut totals, Total::new(TotalType::Tax, 0));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn push_total_suppresses_zero_valued_others() {
        let mut totals = Vec::new();
        push_total(&mut totals, Total::new(TotalType::Fee, 0));
        push_total(&mut totals, Total::new(TotalType::Fee, 150));
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].amount, 150);
    }

    #[test]
    fn error_envelope_satisfies_invariant() {
        let co = Checkout::error_envelope(
            "",
            "USD",
            Message::error("ucp_agent_required", "missing header", Severity::Recoverable),
        );
        assert_eq!(co.status, CheckoutStatus::Incomplete);
        assert!(co.has_well_formed_error());
    }

    #[test]
    fn error_message_without_severity_fails_well_formed_check() {
        let mut co = CheckoutBuilder::new("id", "USD").build();
        co.messages.push(Message {
            kind: MessageType::Error,
            code: "X".into(),
            content: "bad".into(),
            path: None,
            severity: None,
        });
        assert!(!co.has_well_formed_error());
    }

    #[test]
    fn builder_produces_expected_shape() {
        let co = CheckoutBuilder::new("gid://shop.test/Cart/abc", "USD")
            .status(CheckoutStatus::ReadyForComplete)
            .total(Total::new(TotalType::Subtotal, 1000))
            .total(Total::new(TotalType::Total, 1000))
            .build();
        assert_eq!(co.id, "gid://shop.test/Cart/abc");
        assert_eq!(co.totals.len(), 2);
        assert_eq!(co.status, CheckoutStatus::ReadyForComplete);
    }

    #[test]
    fn checkout_serializes_optional_fields_away_when_absent() {
        let co = CheckoutBuilder::new("id", "USD").build();
        let json = serde_json::to_string(&co).unwrap();
        assert!(!json.contains("buyer"));
        assert!(!json.contains("continue_url"));
        assert!(!json.contains("order_id"));
    }
}
