//! Hosted-store OAuth client: anonymous visitor tokens and redirect-only
//! checkout completion (§4.5).

use crate::error::UpstreamError;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ucp_ratelimit::OutboundLimiter;
use ucp_retry::{retry_async, RetryConfig, RetryError};

const MINT: &str = "POST /oauth/token (anonymous)";
const REFRESH: &str = "POST /oauth/token (refresh)";
const GET_CART: &str = "GET /cart";
const UPDATE_CART: &str = "PATCH /cart";
const APPLY_COUPON: &str = "PATCH /cart (apply coupon)";
const CREATE_CHECKOUT: &str = "POST /checkout";
const CREATE_REDIRECT: &str = "POST /checkout/redirect-session";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound self-throttle for the hosted-store API.
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

/// Anonymous-visitor token lifetime advertised by the upstream (§4.5): 4
/// hours. Callers compare against this when deciding whether to refresh
/// before use rather than reacting to a `401`.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(4 * 60 * 60);

/// Configuration for an [`OauthClient`] (§6.3 OAuth backend fields).
#[derive(Debug, Clone)]
pub struct OauthConfig {
    /// Store base URL.
    pub store_url: String,
    /// OAuth client id used for the anonymous grant.
    pub client_id: String,
}

/// Client for the hosted-store OAuth-authenticated API.
#[derive(Clone)]
pub struct OauthClient {
    http: Client,
    store_url: String,
    client_id: String,
    limiter: OutboundLimiter,
    retry: RetryConfig,
}

/// A minted or refreshed access token (§4.5).
#[derive(Debug, Clone, Deserialize)]
pub struct OauthToken {
    /// Bearer token carried in the checkout id.
    pub access_token: String,
    /// Refresh token, when the upstream issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds as reported by the upstream.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// A cart line item in the hosted-store model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthLineItem {
    /// Line id used to address update/remove operations.
    pub id: String,
    /// Canonical product id (referred to as `catalog_item_id` upstream).
    pub product_id: String,
    /// Variant id, if any.
    #[serde(default)]
    pub variant_id: Option<String>,
    /// Line quantity.
    pub quantity: u32,
    /// Line total, minor units.
    #[serde(default)]
    pub total_price: i64,
}

/// Cart-level totals in the hosted-store model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OauthTotals {
    /// Subtotal before discounts, minor units.
    #[serde(default)]
    pub subtotal: i64,
    /// Total discount applied, minor units.
    #[serde(default)]
    pub discount: i64,
    /// Grand total, minor units.
    #[serde(default)]
    pub total: i64,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency: String,
}

/// A single applied coupon and its own allocated amount, as nested in the
/// hosted-store cart document's `appliedCoupons` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthCoupon {
    /// The applied discount code.
    #[serde(rename = "code")]
    pub code: String,
    /// Amount this coupon discounted off the cart, minor units.
    #[serde(default, rename = "discountAmount")]
    pub amount: i64,
}

/// Cart document returned by [`OauthClient::get_cart`] and
/// [`OauthClient::update_cart`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OauthCart {
    /// Cart id, embedded in the checkout id.
    #[serde(default)]
    pub id: String,
    /// Current line items.
    #[serde(default)]
    pub line_items: Vec<OauthLineItem>,
    /// Applied coupons, each with its own allocated amount.
    #[serde(default)]
    pub applied_coupons: Vec<OauthCoupon>,
    /// Aggregate totals.
    #[serde(default)]
    pub totals: OauthTotals,
}

/// Response from creating a checkout from a cart.
#[derive(Debug, Clone, Deserialize)]
pub struct OauthCheckout {
    /// Checkout id, embedded in the checkout id alongside the access
    /// token.
    pub id: String,
}

impl OauthClient {
    /// Construct a client for the given store configuration.
    #[must_use]
    pub fn new(config: OauthConfig) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self {
            http,
            store_url: config.store_url.trim_end_matches('/').to_string(),
            client_id: config.client_id,
            limiter: OutboundLimiter::new(OUTBOUND_MAX_PER_SECOND, OUTBOUND_WINDOW),
            retry: RetryConfig::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.store_url, path)
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

    async fn token_request(
        &self,
        context: &'static str,
        form: &[(&str, &str)],
    ) -> Result<OauthToken, UpstreamError> {
        self.throttle(context).await?;
        let resp = self
            .http
            .post(self.url("/oauth/token"))
            .form(form)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport { context, source })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                context,
                status,
                body,
                retry_after,
            });
        }

        resp.json().await.map_err(|source| UpstreamError::Transport { context, source })
    }

    /// Mint a new anonymous visitor token (§4.5): `grantType=anonymous`
    /// plus the configured `clientId`, no end-user credentials involved.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, or
    /// a malformed response.
    pub async fn mint_anonymous_token(&self) -> Result<OauthToken, UpstreamError> {
        let form = [("grantType", "anonymous"), ("clientId", self.client_id.as_str())];
        retry_async(&self.retry, || self.token_request(MINT, &form), is_transient)
            .await
            .map(|outcome| outcome.value)
            .map_err(unwrap_retry_error)
    }

    /// Refresh an existing token (§4.5): `grantType=refresh_token`. Used
    /// opportunistically when a caller holds a refresh token close to
    /// expiry; callers without one simply mint a fresh anonymous token
    /// instead.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, or
    /// a malformed response.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OauthToken, UpstreamError> {
        let form = [
            ("grantType", "refresh_token"),
            ("clientId", self.client_id.as_str()),
            ("refreshToken", refresh_token),
        ];
        retry_async(&self.retry, || self.token_request(REFRESH, &form), is_transient)
            .await
            .map(|outcome| outcome.value)
            .map_err(unwrap_retry_error)
    }

    fn bearer(&self, access_token: &str) -> String {
        format!("Bearer {access_token}")
    }

    /// Fetch the current cart.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, or
    /// a malformed response.
    pub async fn get_cart(&self, access_token: &str, cart_id: &str) -> Result<OauthCart, UpstreamError> {
        retry_async(&self.retry, || self.get_cart_attempt(access_token, cart_id), is_transient)
            .await
            .map(|outcome| outcome.value)
            .map_err(unwrap_retry_error)
    }

    async fn get_cart_attempt(&self, access_token: &str, cart_id: &str) -> Result<OauthCart, UpstreamError> {
        self.throttle(GET_CART).await?;
        let resp = self
            .http
            .get(self.url(&format!("/carts/{cart_id}")))
            .header(reqwest::header::AUTHORIZATION, self.bearer(access_token))
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: GET_CART,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp, GET_CART).await);
        }

        resp.json().await.map_err(|source| UpstreamError::Transport {
            context: GET_CART,
            source,
        })
    }

    /// Apply a mutation to the cart (add/remove/update line items or
    /// discount codes). Individual HTTP calls only; this backend has no
    /// batch endpoint (§4.5).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, or
    /// a malformed response.
    pub async fn update_cart(
        &self,
        access_token: &str,
        cart_id: &str,
        mutation: &serde_json::Value,
    ) -> Result<OauthCart, UpstreamError> {
        retry_async(
            &self.retry,
            || self.update_cart_attempt(access_token, cart_id, mutation),
            is_transient,
        )
        .await
        .map(|outcome| outcome.value)
        .map_err(unwrap_retry_error)
    }

    async fn update_cart_attempt(
        &self,
        access_token: &str,
        cart_id: &str,
        mutation: &serde_json::Value,
    ) -> Result<OauthCart, UpstreamError> {
        self.throttle(UPDATE_CART).await?;
        let resp = self
            .http
            .request(Method::PATCH, self.url(&format!("/carts/{cart_id}")))
            .header(reqwest::header::AUTHORIZATION, self.bearer(access_token))
            .json(mutation)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: UPDATE_CART,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp, UPDATE_CART).await);
        }

        resp.json().await.map_err(|source| UpstreamError::Transport {
            context: UPDATE_CART,
            source,
        })
    }

    /// Apply a single discount code (§4.3, §8 "discount failure is a
    /// warning"). Issued as its own call, separate from the structural
    /// line-item/address mutation, so the adapter can catch a rejection
    /// and downgrade it to a warning without losing the rest of the
    /// reconciled cart — this backend has no batch endpoint to carry that
    /// distinction for us.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status
    /// (including a rejected code), or a malformed response.
    pub async fn apply_coupon(
        &self,
        access_token: &str,
        cart_id: &str,
        code: &str,
    ) -> Result<OauthCart, UpstreamError> {
        retry_async(
            &self.retry,
            || self.apply_coupon_attempt(access_token, cart_id, code),
            is_transient,
        )
        .await
        .map(|outcome| outcome.value)
        .map_err(unwrap_retry_error)
    }

    async fn apply_coupon_attempt(
        &self,
        access_token: &str,
        cart_id: &str,
        code: &str,
    ) -> Result<OauthCart, UpstreamError> {
        self.throttle(APPLY_COUPON).await?;
        let resp = self
            .http
            .request(Method::PATCH, self.url(&format!("/carts/{cart_id}")))
            .header(reqwest::header::AUTHORIZATION, self.bearer(access_token))
            .json(&serde_json::json!({ "applyCoupon": code }))
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: APPLY_COUPON,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp, APPLY_COUPON).await);
        }

        resp.json().await.map_err(|source| UpstreamError::Transport {
            context: APPLY_COUPON,
            source,
        })
    }

    /// Create a checkout from a cart.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, or
    /// a malformed response.
    pub async fn create_checkout(
        &self,
        access_token: &str,
        cart_id: &str,
    ) -> Result<OauthCheckout, UpstreamError> {
        self.throttle(CREATE_CHECKOUT).await?;
        let resp = self
            .http
            .post(self.url("/checkouts"))
            .header(reqwest::header::AUTHORIZATION, self.bearer(access_token))
            .json(&serde_json::json!({ "cartId": cart_id }))
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: CREATE_CHECKOUT,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp, CREATE_CHECKOUT).await);
        }

        resp.json().await.map_err(|source| UpstreamError::Transport {
            context: CREATE_CHECKOUT,
            source,
        })
    }

    /// Create a redirect session for the checkout and return its
    /// `continue_url`. This backend never accepts payment instruments
    /// directly: completion always hands the buyer off to a hosted page
    /// (§4.5, always `requires_escalation`).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure, non-2xx status, a
    /// malformed response, or a response missing the continuation URL.
    pub async fn create_redirect_session(
        &self,
        access_token: &str,
        checkout_id: &str,
    ) -> Result<String, UpstreamError> {
        self.throttle(CREATE_REDIRECT).await?;
        let resp = self
            .http
            .post(self.url("/checkout/redirect-session"))
            .header(reqwest::header::AUTHORIZATION, self.bearer(access_token))
            .json(&serde_json::json!({ "checkoutId": checkout_id }))
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                context: CREATE_REDIRECT,
                source,
            })?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp, CREATE_REDIRECT).await);
        }

        let body: serde_json::Value = resp.json().await.map_err(|source| UpstreamError::Transport {
            context: CREATE_REDIRECT,
            source,
        })?;
        body.get("continueUrl")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or(UpstreamError::MissingHeader {
                context: CREATE_REDIRECT,
                header: "continueUrl",
            })
    }

    async fn map_error(resp: reqwest::Response, context: &'static str) -> UpstreamError {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifetime_matches_four_hours() {
        assert_eq!(TOKEN_LIFETIME, Duration::from_secs(14_400));
    }

    #[test]
    fn client_trims_trailing_slash_from_store_url() {
        let client = OauthClient::new(OauthConfig {
            store_url: "https://shop.example.com/".into(),
            client_id: "abc".into(),
        });
        assert_eq!(client.url("/carts/1"), "https://shop.example.com/carts/1");
    }
}
