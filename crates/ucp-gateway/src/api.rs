// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request/response envelopes for the REST surface (§6.1) and the `/mcp`
//! JSON-RPC surface (§6.2).

use serde::{Deserialize, Serialize};
use ucp_core::{Address, Buyer, Payment};
use ucp_reconcile::DesiredLineItem;

/// `POST /checkout-sessions` body. Exactly one of `cart_token` or
/// `line_items` drives the create (§6.1).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Resume an existing upstream cart by its opaque token.
    #[serde(default)]
    pub cart_token: Option<String>,
    /// Seed a fresh cart with these lines when no `cart_token` is given.
    #[serde(default)]
    pub line_items: Vec<DesiredLineItem>,
    /// Shipping destination, if known at creation time.
    #[serde(default)]
    pub shipping_address: Option<Address>,
    /// Billing address, if known at creation time.
    #[serde(default)]
    pub billing_address: Option<Address>,
    /// Buyer identity, if known at creation time.
    #[serde(default)]
    pub buyer: Option<Buyer>,
}

/// `PUT /checkout-sessions/{id}` body: full desired state (§4.6).
///
/// `line_items` and `discount_codes` are `Option` so the adapter can tell
/// "field absent" (validation error) apart from "field present but empty"
/// (line items: validation error; discount codes: remove all).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCheckoutRequest {
    /// Desired full line-item set.
    #[serde(default)]
    pub line_items: Option<Vec<DesiredLineItem>>,
    /// Desired full discount-code set.
    #[serde(default)]
    pub discount_codes: Option<Vec<String>>,
    /// Desired shipping address.
    #[serde(default)]
    pub shipping_address: Option<Address>,
    /// Desired billing address.
    #[serde(default)]
    pub billing_address: Option<Address>,
    /// Desired buyer identity.
    #[serde(default)]
    pub buyer: Option<Buyer>,
    /// Selected fulfillment option id.
    #[serde(default)]
    pub fulfillment_option_id: Option<String>,
}

/// `POST /checkout-sessions/{id}/complete` body (§6.1).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteCheckoutRequest {
    /// Submitted payment.
    #[serde(default)]
    pub payment: Payment,
}

impl From<CreateCheckoutRequest> for ucp_adapter::CreateCheckoutInput {
    fn from(req: CreateCheckoutRequest) -> Self {
        Self {
            cart_token: req.cart_token,
            line_items: req.line_items,
            shipping_address: req.shipping_address,
            billing_address: req.billing_address,
            buyer: req.buyer,
        }
    }
}

impl From<UpdateCheckoutRequest> for ucp_adapter::UpdateCheckoutInput {
    fn from(req: UpdateCheckoutRequest) -> Self {
        Self {
            line_items: req.line_items,
            discount_codes: req.discount_codes,
            shipping_address: req.shipping_address,
            billing_address: req.billing_address,
            buyer: req.buyer,
            fulfillment_option_id: req.fulfillment_option_id,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC / MCP surface (§6.2)
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 request framing for the single `/mcp` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`; not enforced, accepted for compatibility.
    #[serde(default)]
    pub jsonrpc: String,
    /// One of the five tool names (§6.2).
    pub method: String,
    /// Tool input.
    #[serde(default)]
    pub params: RpcParams,
    /// Request correlation id, echoed back verbatim.
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// The five tools' shared input shape: `{meta, id?, checkout?}`. `checkout`
/// carries whichever of create/update/complete's fields apply to the
/// invoked tool; unused fields are ignored by that tool's handler.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcParams {
    /// Negotiation metadata, carrying the agent profile URL.
    #[serde(default)]
    pub meta: RpcMeta,
    /// Checkout id, required by every tool except `create_checkout`.
    #[serde(default)]
    pub id: Option<String>,
    /// Cart-seeding / full-state-update fields, shaped like the REST
    /// create/update bodies.
    #[serde(default)]
    pub checkout: RpcCheckoutParams,
}

/// `meta` member of a tool call: `{"ucp-agent": {"profile": "..."}, "idempotency-key"?: "..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcMeta {
    /// Agent negotiation metadata.
    #[serde(rename = "ucp-agent", default)]
    pub ucp_agent: RpcAgentMeta,
    /// Optional idempotency key; accepted but not yet enforced server-side.
    #[serde(rename = "idempotency-key", default)]
    pub idempotency_key: Option<String>,
}

/// `meta["ucp-agent"]`: the header-equivalent carrying the profile URL
/// (§6.2 — travels in `meta` instead of the `UCP-Agent` HTTP header).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcAgentMeta {
    /// Agent profile URL.
    #[serde(default)]
    pub profile: Option<String>,
}

/// Union of the create/update/complete body shapes, since a single
/// `checkout` member serves all five tools.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcCheckoutParams {
    /// See [`CreateCheckoutRequest::cart_token`].
    #[serde(default)]
    pub cart_token: Option<String>,
    /// See [`CreateCheckoutRequest::line_items`] / [`UpdateCheckoutRequest::line_items`].
    ///
    /// `None` distinguishes "absent" from `Some(vec![])` for PUT semantics;
    /// `create_checkout` treats `None` the same as an empty cart seed.
    #[serde(default)]
    pub line_items: Option<Vec<DesiredLineItem>>,
    /// See [`UpdateCheckoutRequest::discount_codes`].
    #[serde(default)]
    pub discount_codes: Option<Vec<String>>,
    /// See [`CreateCheckoutRequest::shipping_address`].
    #[serde(default)]
    pub shipping_address: Option<Address>,
    /// See [`CreateCheckoutRequest::billing_address`].
    #[serde(default)]
    pub billing_address: Option<Address>,
    /// See [`CreateCheckoutRequest::buyer`].
    #[serde(default)]
    pub buyer: Option<Buyer>,
    /// See [`UpdateCheckoutRequest::fulfillment_option_id`].
    #[serde(default)]
    pub fulfillment_option_id: Option<String>,
    /// See [`CompleteCheckoutRequest::payment`].
    #[serde(default)]
    pub payment: Payment,
}

impl From<RpcCheckoutParams> for CreateCheckoutRequest {
    fn from(p: RpcCheckoutParams) -> Self {
        Self {
            cart_token: p.cart_token,
            line_items: p.line_items.unwrap_or_default(),
            shipping_address: p.shipping_address,
            billing_address: p.billing_address,
            buyer: p.buyer,
        }
    }
}

impl From<RpcCheckoutParams> for UpdateCheckoutRequest {
    fn from(p: RpcCheckoutParams) -> Self {
        Self {
            line_items: p.line_items,
            discount_codes: p.discount_codes,
            shipping_address: p.shipping_address,
            billing_address: p.billing_address,
            buyer: p.buyer,
            fulfillment_option_id: p.fulfillment_option_id,
        }
    }
}

/// JSON-RPC 2.0 response framing: exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Tool output (a Checkout envelope), on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// JSON-RPC-level error, on transport/framing failure (an unknown
    /// method or malformed params) rather than a domain-level error —
    /// domain errors still yield a `result` carrying a Checkout envelope
    /// per §3.1's invariant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Echo of the request's `id`.
    pub id: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Build a success response wrapping `result`.
    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Build a JSON-RPC framing-level error response.
    #[must_use]
    pub fn framing_error(id: Option<serde_json::Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    /// JSON-RPC error code (standard `-32601` for unknown method, etc.).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Standard JSON-RPC "method not found" code.
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;
/// Standard JSON-RPC "invalid params" code.
pub const RPC_INVALID_PARAMS: i64 = -32602;
