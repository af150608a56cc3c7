//! WooCommerce Store API client: cart-token lifecycle, nonce preflight,
//! and batch dispatch (§4.4).

use crate::error::UpstreamError;
use rand::RngCore;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ucp_ratelimit::OutboundLimiter;
use ucp_retry::{retry_async, RetryConfig, RetryError};

const PREFLIGHT: &str = "GET /cart";
const READ: &str = "POST /cart/update-customer";
const BATCH: &str = "POST /batch";
const CHECKOUT: &str = "POST /checkout";
const NONCE_HEADER: &str = "Nonce";
const CART_TOKEN_HEADER: &str = "Cart-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Outbound self-throttle: this store is assumed to tolerate this many
/// calls per second before we'd rather back off locally than draw a real
/// `429` from it.
const OUTBOUND_MAX_PER_SECOND: u32 = 10;
const OUTBOUND_WINDOW: Duration = Duration::from_secs(1);

fn is_transient(err: &UpstreamError) -> bool {
    match err {
        UpstreamError::Transport { .. } => true,
        UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
        UpstreamError::Decode { .. } | UpstreamError::MissingHeader { .. } => false,
    }
}

fn unwrap_retry_error(err: RetryError<UpstreamError>) -> UpstreamError {
    match err {
        RetryError::Operation(e) => e,
        RetryError::Timeout(e) => UpstreamError::Status {
            context: "retry budget",
            status: 0,
            body: e.to_string(),
            retry_after: None,
        },
    }
}

/// Configuration for a [`WcClient`] (§6.3 WC backend fields).
#[derive(Debug, Clone)]
pub struct WcConfig {
    /// Store base URL, e.g. `https://shop.example.com`.
    pub store_url: String,
    /// API consumer key, sent as HTTP basic auth.
    pub api_key: String,
    /// API consumer secret, sent as HTTP basic auth.
    pub api_secret: String,
}

/// Client for the nonce-authenticated WooCommerce Store API.
#[derive(Clone)]
pub struct WcClient {
    http: Client,
    store_url: String,
    api_key: String,
    api_secret: String,
    limiter: OutboundLimiter,
    retry: RetryConfig,
}

/// Nonce and cart token obtained from a preflight request (§4.4.2).
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Nonce required on the next mutation.
    pub nonce: String,
    /// Cart token returned by the upstream, which may differ from the
    /// one sent — callers must prefer their own token (§9).
    pub cart_token: String,
}

/// A single line item as represented by the WooCommerce cart document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WcLineItem {
    /// Opaque per-line backend handle used to address remove/update ops.
    pub key: String,
    /// Canonical product id.
    pub id: i64,
    /// Variation id, if this is a variable product.
    #[serde(default)]
    pub variation_id: Option<i64>,
    /// Line quantity.
    pub quantity: u32,
    /// Product display name.
    #[serde(default)]
    pub name: String,
    /// Product image URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Line subtotal, minor units.
    #[serde(default)]
    pub totals_subtotal: i64,
    /// Line total after discounts, minor units.
    #[serde(default)]
    pub totals_total: i64,
    /// Server-exposed metadata keys/values attached to the line (§4.7
    /// escalation predicate scans these for configured trigger keys).
    #[serde(default)]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// Cart-level totals block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcCartTotals {
    /// Subtotal before discounts, minor units.
    #[serde(default)]
    pub total_items: i64,
    /// Total discount applied by coupons, minor units.
    #[serde(default)]
    pub total_discount: i64,
    /// Shipping total, minor units.
    #[serde(default)]
    pub total_shipping: i64,
    /// Tax total, minor units.
    #[serde(default)]
    pub total_tax: i64,
    /// Grand total, minor units.
    #[serde(default)]
    pub total_price: i64,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency_code: String,
}

/// A single applied coupon and its per-code allocation, as nested in the
/// WooCommerce cart document's `coupons` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WcCartCoupon {
    /// The applied discount code.
    pub code: String,
    /// This coupon's own totals block.
    #[serde(default)]
    pub totals: WcCouponTotals,
}

/// Per-coupon totals nested in [`WcCartCoupon`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcCouponTotals {
    /// Amount this coupon discounted off the cart, minor units.
    #[serde(default)]
    pub total_discount: i64,
}

/// The cart document returned by `read_cart` and batch dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcCart {
    /// Line items currently in the cart.
    #[serde(default)]
    pub items: Vec<WcLineItem>,
    /// Applied coupons, each with its own allocated amount.
    #[serde(default)]
    pub coupons: Vec<WcCartCoupon>,
    /// Aggregate totals.
    #[serde(default)]
    pub totals: WcCartTotals,
    /// Buyer email, if known.
    #[serde(default)]
    pub billing_email: Option<String>,
}

/// Result of the upstream `payment_status` field (§4.4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Payment succeeded outright.
    Success,
    /// Payment requires further buyer action (e.g. 3-D Secure).
    Pending,
    /// Payment was rejected.
    Failure,
}

/// Upstream checkout-completion response (§4.4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct WcCheckoutResponse {
    /// Upstream order id.
    pub order_id: i64,
    /// Upstream order key, carried in the checkout id.
    pub order_key: String,
    /// Payment outcome.
    pub payment_result: WcPaymentResult,
}

/// Payment outcome nested in [`WcCheckoutResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct WcPaymentResult {
    /// Result status.
    pub payment_status: PaymentStatus,
    /// Redirect URL, present for `pending`/3-D-Secure flows.
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// What a [`WooBatchOp`] is for, beyond its raw path/method/body — lets
/// dispatch distinguish sub-operations that may fail without aborting the
/// rest of the plan from ones that can't (§4.3, §8 "discount failure is a
/// warning").
#[derive(Debug, Clone, PartialEq, Eq)]
enum OpKind {
    /// Applying a discount code; a rejection downgrades to a warning
    /// rather than failing the whole plan.
    ApplyCoupon(String),
    /// Everything else: a failure here is fatal to the plan.
    Other,
}

/// A single batch sub-operation (§4.4.3).
#[derive(Debug, Clone, Serialize)]
pub struct WooBatchOp {
    path: String,
    method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
    #[serde(skip)]
    kind: OpKind,
}

/// A discount code that a coupon-apply sub-operation rejected, carried
/// alongside the otherwise-successful [`DispatchOutcome::cart`] instead of
/// failing the whole plan (§4.3, §8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCoupon {
    /// The code the upstream rejected.
    pub code: String,
    /// The upstream's status for the rejection, for diagnostics.
    pub status: u16,
}

/// Result of dispatching a mutation plan: the resulting cart, plus any
/// coupon codes rejected along the way (§4.3, §8).
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The cart after applying every sub-operation that succeeded.
    pub cart: WcCart,
    /// Discount codes rejected by their apply-coupon sub-operation.
    pub rejected_coupons: Vec<RejectedCoupon>,
}

/// Fluent builder for a mutation plan dispatched as either a `multi`
/// batch or a `sequential` chain (§4.4.3). Operations are appended in
/// the order they should execute.
#[derive(Debug, Clone, Default)]
pub struct WooBatchRequest {
    ops: Vec<WooBatchOp>,
}

impl WooBatchRequest {
    /// Start an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this plan has no operations (callers must treat an empty
    /// reconciler plan as a no-op rather than dispatching, per §4.3).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Remove a line by its backend key.
    #[must_use]
    pub fn remove_line_item(mut self, key: &str) -> Self {
        self.ops.push(WooBatchOp {
            path: format!("/wc/store/v1/cart/items/{key}"),
            method: Method::DELETE,
            body: None,
            kind: OpKind::Other,
        });
        self
    }

    /// Set a line's quantity by its backend key.
    #[must_use]
    pub fn update_line_item(mut self, key: &str, quantity: u32) -> Self {
        self.ops.push(WooBatchOp {
            path: format!("/wc/store/v1/cart/items/{key}"),
            method: Method::POST,
            body: Some(serde_json::json!({ "quantity": quantity })),
            kind: OpKind::Other,
        });
        self
    }

    /// Add a product (and optional variation) at the given quantity.
    #[must_use]
    pub fn add_line_item(mut self, product_id: i64, variant_id: Option<i64>, quantity: u32) -> Self {
        let mut body = serde_json::json!({ "id": product_id, "quantity": quantity });
        if let Some(variation_id) = variant_id {
            body["variation_id"] = serde_json::json!(variation_id);
        }
        self.ops.push(WooBatchOp {
            path: "/wc/store/v1/cart/add-item".into(),
            method: Method::POST,
            body: Some(body),
            kind: OpKind::Other,
        });
        self
    }

    /// Apply a discount code. A rejection of this specific sub-operation
    /// downgrades to a warning rather than aborting the whole plan (§4.3,
    /// §8 "discount failure is a warning").
    #[must_use]
    pub fn apply_coupon(mut self, code: &str) -> Self {
        self.ops.push(WooBatchOp {
            path: "/wc/store/v1/cart/apply-coupon".into(),
            method: Method::POST,
            body: Some(serde_json::json!({ "code": code })),
            kind: OpKind::ApplyCoupon(code.to_string()),
        });
        self
    }

    /// Remove a previously applied discount code.
    #[must_use]
    pub fn remove_coupon(mut self, code: &str) -> Self {
        self.ops.push(WooBatchOp {
            path: "/wc/store/v1/cart/remove-coupon".into(),
            method: Method::POST,
            body: Some(serde_json::json!({ "code": code })),
            kind: OpKind::Other,
        });
        self
    }

    /// Set the shipping and/or billing address on the cart customer record.
    #[must_use]
    pub fn set_customer(mut self, shipping: Option<serde_json::Value>, billing: Option<serde_json::Value>) -> Self {
        let mut body = serde_json::Map::new();
        if let Some(s) = shipping {
            body.insert("shipping_address".into(), s);
        }
        if let Some(b) = billing {
            body.insert("billing_address".into(), b);
        }
        self.ops.push(WooBatchOp {
            path: "/wc/store/v1/cart/update-customer".into(),
            method: Method::POST,
            body: Some(serde_json::Value::Object(body)),
            kind: OpKind::Other,
        });
        self
    }

    /// Select a fulfillment (shipping rate) option.
    #[must_use]
    pub fn select_shipping_rate(mut self, package_id: &str, rate_id: &str) -> Self {
        self.ops.push(WooBatchOp {
            path: "/wc/store/v1/cart/select-shipping-rate".into(),
            method: Method::POST,
            body: Some(serde_json::json!({ "package_id": package_id, "rate_id": rate_id })),
            kind: OpKind::Other,
        });
        self
    }
}

impl WcClient {
    /// Construct a client for the given store configuration.
    #[must_use]
    pub fn new(config: WcConfig) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self {
            http,
            store_url: config.store_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            api_secret: config.api_secret,
            limiter: OutboundLimiter::new(OUTBOUND_MAX_PER_SECOND, OUTBOUND_WINDOW),
            retry: RetryConfig::default(),
        }
    }

    /// Self-throttle before issuing a request, so this client backs off on
    /// its own before the upstream ever has to answer with a `429`.
    async fn throttle(&self, context: &'static str) -> Result<(), UpstreamError> {
        match self.limiter.check().await {
            Ok(()) => Ok(()),
            Err(wait) => Err(UpstreamError::Status {
                context,
                status: 429,
                body: String::new(),
                retry_after: Some(wait.as_secs().to_string()),
            }),
        }
    }

    /// Generate a fresh cart token: 16 random bytes, hex-encoded (§4.4.1).
    ///
    /// The gateway mints its own token rather than letting the upstream
    /// choose, to avoid cross-request session pollution.
    #[must_use]
    pub fn generate_cart_token() -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.store_url, path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.api_key, Some(&self.api_secret))
    }

    fn read_headers(resp: &reqwest::Response, context: &'static str) -> Result<Preflight, UpstreamError> {
        let nonce = resp
            .headers()
            .get(NONCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(UpstreamError::MissingHeader {
                context,
                header: NONCE_HEADER,
            })?
            .to_string();
        let cart_token = resp
            .headers()
            .get(CART_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_default();
        Ok(Preflight { nonce, cart_token })
    }

    async fn map_error_status(
        resp: reqwest::Response,
        context: &'static str,
    ) -> UpstreamError {
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();
        UpstreamError::Status {
            context,
            status,
            body,
            retry_after,
        }
    }

    /// Preflight a nonce for the given cart token (§4.4.2). Maps `429`
    /// at this boundary rather than surfacing a generic upstream error.
    /// Retries transient failures with exponential backoff (§4.4.2).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, or
    /// a missing `Nonce` header.
    pub async fn preflight(&self, cart_token: &str) -> Result<Preflight, UpstreamError> {
        retry_async(&self.retry, || self.preflight_attempt(cart_token), is_transient)
            .await
            .map(|outcome| outcome.value)
            .map_err(unwrap_retry_error)
    }

    async fn preflight_attempt(&self, cart_token: &str) -> Result<Preflight, UpstreamError> {
        self.throttle(PREFLIGHT).await?;
        let resp = self
            .request(Method::GET, "/wc/store/v1/cart")
            .header(CART_TOKEN_HEADER, cart_token)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: PREFLIGHT,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error_status(resp, PREFLIGHT).await);
        }

        Self::read_headers(&resp, PREFLIGHT)
    }

    /// Read the current cart via the mutation-based read path (§4.4.2):
    /// `GET /cart` must not be used for reads since the upstream returns
    /// stale data under token-only auth. Retries transient failures with
    /// exponential backoff (§4.4.2).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, a
    /// missing `Nonce` header, or a body that does not decode as
    /// [`WcCart`].
    pub async fn read_cart(
        &self,
        cart_token: &str,
        nonce: &str,
    ) -> Result<(WcCart, Preflight), UpstreamError> {
        retry_async(&self.retry, || self.read_cart_attempt(cart_token, nonce), is_transient)
            .await
            .map(|outcome| outcome.value)
            .map_err(unwrap_retry_error)
    }

    async fn read_cart_attempt(
        &self,
        cart_token: &str,
        nonce: &str,
    ) -> Result<(WcCart, Preflight), UpstreamError> {
        self.throttle(READ).await?;
        let resp = self
            .request(Method::POST, "/wc/store/v1/cart/update-customer")
            .header(CART_TOKEN_HEADER, cart_token)
            .header(NONCE_HEADER, nonce)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: READ,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error_status(resp, READ).await);
        }

        let next = Self::read_headers(&resp, READ)?;
        let bytes = resp.bytes().await.map_err(|source| UpstreamError::Transport {
            context: READ,
            source,
        })?;
        let cart: WcCart = serde_json::from_slice(&bytes).map_err(|source| UpstreamError::Decode {
            context: READ,
            source,
        })?;
        Ok((cart, next))
    }

    /// Dispatch a mutation plan as a single `multi` batch (default
    /// strategy, §4.4.3): preflight once, inject the resulting nonce and
    /// cart token into every sub-operation's headers, `POST /batch`, and
    /// parse the ordered sub-response array. A rejected coupon-apply
    /// sub-operation is collected as a [`RejectedCoupon`] rather than
    /// aborting the batch (§4.3, §8 "discount failure is a warning"); any
    /// other sub-operation with `status >= 400` still aborts it. Retries
    /// transient failures with exponential backoff (§4.4.3).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, a fatal
    /// sub-operation failure, or a malformed response.
    pub async fn dispatch_multi(
        &self,
        cart_token: &str,
        plan: &WooBatchRequest,
    ) -> Result<DispatchOutcome, UpstreamError> {
        retry_async(&self.retry, || self.dispatch_multi_attempt(cart_token, plan), is_transient)
            .await
            .map(|outcome| outcome.value)
            .map_err(unwrap_retry_error)
    }

    async fn dispatch_multi_attempt(
        &self,
        cart_token: &str,
        plan: &WooBatchRequest,
    ) -> Result<DispatchOutcome, UpstreamError> {
        if plan.is_empty() {
            let preflight = self.preflight(cart_token).await?;
            let (cart, _) = self.read_cart(cart_token, &preflight.nonce).await?;
            return Ok(DispatchOutcome {
                cart,
                rejected_coupons: Vec::new(),
            });
        }

        let preflight = self.preflight(cart_token).await?;
        let token = if cart_token.is_empty() {
            preflight.cart_token.as_str()
        } else {
            cart_token
        };

        let requests: Vec<serde_json::Value> = plan
            .ops
            .iter()
            .map(|op| {
                serde_json::json!({
                    "path": op.path,
                    "method": op.method.as_str(),
                    "body": op.body,
                    "headers": {
                        NONCE_HEADER: preflight.nonce,
                        CART_TOKEN_HEADER: token,
                    },
                })
            })
            .collect();

        self.throttle(BATCH).await?;
        let resp = self
            .request(Method::POST, "/wc/store/v1/batch")
            .header(CART_TOKEN_HEADER, token)
            .header(NONCE_HEADER, &preflight.nonce)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: BATCH,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error_status(resp, BATCH).await);
        }

        let body: serde_json::Value = resp.json().await.map_err(|source| UpstreamError::Transport {
            context: BATCH,
            source,
        })?;
        let sub_responses = body
            .as_array()
            .ok_or_else(|| UpstreamError::Decode {
                context: BATCH,
                source: serde::de::Error::custom("batch response is not a JSON array"),
            })?;

        let mut last_body: Option<serde_json::Value> = None;
        let mut rejected_coupons = Vec::new();
        for (op, sub) in plan.ops.iter().zip(sub_responses.iter()) {
            let status = sub.get("status").and_then(serde_json::Value::as_u64).unwrap_or(200);
            if status >= 400 {
                if let OpKind::ApplyCoupon(code) = &op.kind {
                    rejected_coupons.push(RejectedCoupon {
                        code: code.clone(),
                        status: status as u16,
                    });
                    continue;
                }
                let body_text = sub
                    .get("body")
                    .map(serde_json::Value::to_string)
                    .unwrap_or_default();
                return Err(UpstreamError::Status {
                    context: BATCH,
                    status: status as u16,
                    body: body_text,
                    retry_after: None,
                });
            }
            if let Some(b) = sub.get("body") {
                last_body = Some(b.clone());
            }
        }

        let cart = match last_body {
            Some(b) => serde_json::from_value(b).map_err(|source| UpstreamError::Decode {
                context: BATCH,
                source,
            })?,
            None if !rejected_coupons.is_empty() => {
                // Every sub-operation was a rejected coupon apply; no
                // mutation succeeded, so re-read the cart for its current
                // state rather than treating this as fatal.
                let (cart, _) = self.read_cart(token, &preflight.nonce).await?;
                cart
            }
            None => {
                return Err(UpstreamError::Decode {
                    context: BATCH,
                    source: serde::de::Error::custom("batch response carried no sub-response body"),
                })
            }
        };

        Ok(DispatchOutcome { cart, rejected_coupons })
    }

    /// Dispatch a mutation plan sequentially (fallback strategy,
    /// §4.4.3): preflight once, then issue each operation with the
    /// current nonce/token, reading the response headers for the next
    /// pair before issuing the following operation. A rejected
    /// coupon-apply operation is collected as a [`RejectedCoupon`] rather
    /// than aborting the rest of the plan (§4.3, §8). Retries transient
    /// failures with exponential backoff (§4.4.3).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, a fatal non-2xx
    /// status from any other operation, or a malformed final response
    /// body.
    pub async fn dispatch_sequential(
        &self,
        cart_token: &str,
        plan: &WooBatchRequest,
    ) -> Result<DispatchOutcome, UpstreamError> {
        retry_async(&self.retry, || self.dispatch_sequential_attempt(cart_token, plan), is_transient)
            .await
            .map(|outcome| outcome.value)
            .map_err(unwrap_retry_error)
    }

    async fn dispatch_sequential_attempt(
        &self,
        cart_token: &str,
        plan: &WooBatchRequest,
    ) -> Result<DispatchOutcome, UpstreamError> {
        let preflight = self.preflight(cart_token).await?;
        let mut current = if cart_token.is_empty() {
            preflight
        } else {
            Preflight {
                nonce: preflight.nonce,
                cart_token: cart_token.to_string(),
            }
        };

        if plan.is_empty() {
            let (cart, _) = self.read_cart(&current.cart_token, &current.nonce).await?;
            return Ok(DispatchOutcome {
                cart,
                rejected_coupons: Vec::new(),
            });
        }

        let mut last_body: Option<serde_json::Value> = None;
        let mut rejected_coupons = Vec::new();
        for op in &plan.ops {
            self.throttle("sequential operation").await?;
            let mut req = self
                .request(op.method.clone(), &op.path)
                .header(CART_TOKEN_HEADER, &current.cart_token)
                .header(NONCE_HEADER, &current.nonce);
            if let Some(ref body) = op.body {
                req = req.json(body);
            }

            let resp = req.send().await.map_err(|source| UpstreamError::Transport {
                context: "sequential operation",
                source,
            })?;

            if !resp.status().is_success() {
                if let OpKind::ApplyCoupon(code) = &op.kind {
                    let status = resp.status().as_u16();
                    if let Ok(next) = Self::read_headers(&resp, "sequential operation") {
                        current = next;
                    }
                    rejected_coupons.push(RejectedCoupon { code: code.clone(), status });
                    continue;
                }
                return Err(Self::map_error_status(resp, "sequential operation").await);
            }

            current = Self::read_headers(&resp, "sequential operation")?;
            let body: serde_json::Value = resp.json().await.map_err(|source| UpstreamError::Transport {
                context: "sequential operation",
                source,
            })?;
            last_body = Some(body);
        }

        let cart = match last_body {
            Some(b) => serde_json::from_value(b).map_err(|source| UpstreamError::Decode {
                context: "sequential operation",
                source,
            })?,
            None => self.read_cart(&current.cart_token, &current.nonce).await?.0,
        };

        Ok(DispatchOutcome { cart, rejected_coupons })
    }

    /// Complete checkout (§4.4.4): capture the current cart before
    /// payment (since the upstream clears it on success), then submit
    /// payment via `POST /checkout`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, or
    /// a malformed response.
    pub async fn complete(
        &self,
        cart_token: &str,
        payment: &serde_json::Value,
    ) -> Result<(WcCart, WcCheckoutResponse), UpstreamError> {
        let preflight = self.preflight(cart_token).await?;
        let (pre_payment_cart, current) = self.read_cart(cart_token, &preflight.nonce).await?;

        // Not retried: resubmitting a payment capture on a transient
        // failure risks a double charge upstream.
        self.throttle(CHECKOUT).await?;
        let resp = self
            .request(Method::POST, "/wc/store/v1/checkout")
            .header(CART_TOKEN_HEADER, &current.cart_token)
            .header(NONCE_HEADER, &current.nonce)
            .json(payment)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: CHECKOUT,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error_status(resp, CHECKOUT).await);
        }

        let checkout: WcCheckoutResponse = resp.json().await.map_err(|source| UpstreamError::Transport {
            context: CHECKOUT,
            source,
        })?;

        Ok((pre_payment_cart, checkout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_cart_tokens_are_32_hex_chars() {
        let token = WcClient::generate_cart_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_cart_tokens_are_distinct() {
        let a = WcClient::generate_cart_token();
        let b = WcClient::generate_cart_token();
        assert_ne!(a, b);
    }

    #[test]
    fn batch_builder_preserves_op_order() {
        let plan = WooBatchRequest::new()
            .remove_line_item("line-1")
            .update_line_item("line-2", 5)
            .add_line_item(3, None, 1);
        assert_eq!(plan.ops.len(), 3);
        assert_eq!(plan.ops[0].path, "/wc/store/v1/cart/items/line-1");
        assert_eq!(plan.ops[0].method, Method::DELETE);
        assert_eq!(plan.ops[1].path, "/wc/store/v1/cart/items/line-2");
        assert_eq!(plan.ops[2].path, "/wc/store/v1/cart/add-item");
    }

    #[test]
    fn empty_plan_has_no_ops() {
        assert!(WooBatchRequest::new().is_empty());
    }

    #[test]
    fn add_line_item_includes_variation_when_present() {
        let plan = WooBatchRequest::new().add_line_item(3, Some(7), 2);
        let body = plan.ops[0].body.as_ref().unwrap();
        assert_eq!(body["variation_id"], serde_json::json!(7));
    }

    #[test]
    fn apply_coupon_op_is_tagged_for_partial_failure() {
        let plan = WooBatchRequest::new().apply_coupon("BOGUS").remove_line_item("line-1");
        assert_eq!(plan.ops[0].kind, OpKind::ApplyCoupon("BOGUS".to_string()));
        assert_eq!(plan.ops[1].kind, OpKind::Other);
    }
}
