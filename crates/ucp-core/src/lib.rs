//! ucp-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract types for the Universal Commerce Protocol gateway:
//! the [`Checkout`] response envelope, the polymorphic capability registry,
//! payment instruments, the cached agent profile, and the negotiated
//! request context.
//!
//! If you only take one dependency from this workspace, take this one.

/// Checkout envelope, line items, totals, messages.
pub mod checkout;
/// Capability registry and the polymorphic `extends` field.
pub mod capability;
/// Payment instruments and credentials.
pub mod payment;
/// Agent profile as fetched from an agent-owned URL.
pub mod profile;
/// Negotiated request context.
pub mod context;

pub use capability::{Capability, CapabilityRegistry, Extends, Handler, HandlerRegistry};
pub use checkout::{
    Address, Buyer, Checkout, CheckoutBuilder, CheckoutStatus, Discounts, DiscountAllocation,
    FulfillmentOption, LineItem, Message, MessageType, Total, TotalType,
};
pub use context::NegotiatedContext;
pub use payment::{Credential, Payment, PaymentInstrument};
pub use profile::AgentProfile;

/// Current UCP protocol version string this gateway implements.
///
/// Reported back on every `ucp.version` field; the negotiator never reports
/// a version newer than this one regardless of what the agent profile or
/// merchant configuration advertise.
pub const PROTOCOL_VERSION: &str = "2026-01-11";
