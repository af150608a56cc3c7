// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! HTTP clients for the two merchant-platform backends this gateway
//! talks to: a nonce-authenticated WooCommerce Store API (§4.4) and a
//! token-authenticated hosted-store OAuth API (§4.5).
//!
//! Neither client holds server-side session state; all continuation
//! state (cart tokens, access tokens) is handed back to the caller to
//! embed in an opaque checkout id (§4.2).

pub mod error;
pub mod oauth;
pub mod wc;

pub use error::UpstreamError;
pub use oauth::{
    OauthCart, OauthCheckout, OauthClient, OauthConfig, OauthCoupon, OauthLineItem, OauthToken, OauthTotals,
};
pub use wc::{
    DispatchOutcome, PaymentStatus, Preflight, RejectedCoupon, WcCart, WcCartCoupon, WcCartTotals,
    WcCheckoutResponse, WcClient, WcConfig, WcCouponTotals, WcLineItem, WcPaymentResult, WooBatchRequest,
};
