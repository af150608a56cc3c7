//! Pure encode/decode of opaque checkout IDs (§4.2).
//!
//! A checkout ID is a `gid://`-prefixed URI-shaped string that embeds all
//! the state the stateless gateway needs to re-address the upstream
//! session: no server-side session storage exists, so the cart token or
//! access token travels inside the id itself.
//!
//! Parsing is pure (no I/O) and linear in the input length (property 1,
//! §8). Treat every [`CheckoutId`] as a bearer credential: it is secret
//! even though it looks URL-shaped (§9), and must never be logged.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;

/// Failure modes for [`parse`], mirroring the rejection rules of §4.2.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Input did not start with `gid://`.
    #[error("checkout id missing gid:// prefix")]
    MissingPrefix,
    /// No `/{segment}/...` found after the domain.
    #[error("checkout id missing path segment")]
    MissingSegment,
    /// Path segment was neither `Cart` nor `Checkout`, or was illegal for
    /// this domain's backend (e.g. `Cart` under a hosted-store domain).
    #[error("unknown or illegal path segment: {0}")]
    UnknownSegment(String),
    /// A token (cart token, access token, or checkout id) was empty.
    #[error("empty token")]
    EmptyToken,
    /// A required `:`-separated token pair was not colon-delimited.
    #[error("missing required ':' separator")]
    MissingColon,
    /// The order id segment did not parse as an integer.
    #[error("order id is not an integer: {0}")]
    NonIntegerOrderId(String),
}

/// A decoded checkout id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutId {
    /// WC backend, cart phase: `gid://{domain}/Cart/{cart_token}`.
    WcCart {
        /// Store domain.
        domain: String,
        /// Generated cart token (§4.4.1).
        cart_token: String,
    },
    /// WC backend, post-checkout phase:
    /// `gid://{domain}/Checkout/{order_id}:{cart_token}`.
    WcCheckout {
        /// Store domain.
        domain: String,
        /// Upstream order id.
        order_id: i64,
        /// Cart token that created this order.
        cart_token: String,
    },
    /// Hosted-store backend:
    /// `gid://wix.{site_id}/Checkout/{checkout_id}:{access_token}`.
    HostedCheckout {
        /// Hosted-store site id.
        site_id: String,
        /// Upstream checkout id.
        checkout_id: String,
        /// Short-lived OAuth anonymous access token.
        access_token: String,
    },
}

impl CheckoutId {
    /// The domain segment as it appears on the wire (e.g. `"wix.abc123"`
    /// for a hosted-store id).
    #[must_use]
    pub fn domain(&self) -> String {
        match self {
            Self::WcCart { domain, .. } | Self::WcCheckout { domain, .. } => domain.clone(),
            Self::HostedCheckout { site_id, .. } => format!("wix.{site_id}"),
        }
    }
}

impl fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WcCart { domain, cart_token } => {
                write!(f, "gid://{domain}/Cart/{cart_token}")
            }
            Self::WcCheckout {
                domain,
                order_id,
                cart_token,
            } => write!(f, "gid://{domain}/Checkout/{order_id}:{cart_token}"),
            Self::HostedCheckout {
                site_id,
                checkout_id,
                access_token,
            } => write!(f, "gid://wix.{site_id}/Checkout/{checkout_id}:{access_token}"),
        }
    }
}

const PREFIX: &str = "gid://";
const WIX_DOMAIN_PREFIX: &str = "wix.";

/// Parse a checkout id. Pure, no I/O, `O(n)` in `input.len()`.
///
/// # Errors
///
/// Returns [`IdError`] for any of the rejection rules in §4.2: missing
/// `gid://` prefix, an unknown or domain-illegal path segment, an empty
/// token, a missing required colon, or a non-integer order id.
pub fn parse(input: &str) -> Result<CheckoutId, IdError> {
    let rest = input.strip_prefix(PREFIX).ok_or(IdError::MissingPrefix)?;

    let (domain, after_domain) = rest.split_once('/').ok_or(IdError::MissingSegment)?;
    let (segment, token_part) = after_domain
        .split_once('/')
        .ok_or(IdError::MissingSegment)?;

    if let Some(site_id) = domain.strip_prefix(WIX_DOMAIN_PREFIX) {
        if segment != "Checkout" {
            return Err(IdError::UnknownSegment(segment.to_string()));
        }
        let (checkout_id, access_token) = token_part
            .split_once(':')
            .ok_or(IdError::MissingColon)?;
        if checkout_id.is_empty() || access_token.is_empty() {
            return Err(IdError::EmptyToken);
        }
        return Ok(CheckoutId::HostedCheckout {
            site_id: site_id.to_string(),
            checkout_id: checkout_id.to_string(),
            access_token: access_token.to_string(),
        });
    }

    match segment {
        "Cart" => {
            if token_part.is_empty() {
                return Err(IdError::EmptyToken);
            }
            Ok(CheckoutId::WcCart {
                domain: domain.to_string(),
                cart_token: token_part.to_string(),
            })
        }
        "Checkout" => {
            let (order_id_str, cart_token) = token_part
                .split_once(':')
                .ok_or(IdError::MissingColon)?;
            if cart_token.is_empty() {
                return Err(IdError::EmptyToken);
            }
            let order_id = order_id_str
                .parse::<i64>()
                .map_err(|_| IdError::NonIntegerOrderId(order_id_str.to_string()))?;
            Ok(CheckoutId::WcCheckout {
                domain: domain.to_string(),
                order_id,
                cart_token: cart_token.to_string(),
            })
        }
        other => Err(IdError::UnknownSegment(other.to_string())),
    }
}

/// Build a WC cart-phase id. No validation beyond non-empty inputs is
/// performed; callers are expected to supply a well-formed domain and a
/// freshly generated cart token.
#[must_use]
pub fn build_wc_cart(domain: &str, cart_token: &str) -> String {
    CheckoutId::WcCart {
        domain: domain.to_string(),
        cart_token: cart_token.to_string(),
    }
    .to_string()
}

/// Build a WC post-checkout id.
#[must_use]
pub fn build_wc_checkout(domain: &str, order_id: i64, cart_token: &str) -> String {
    CheckoutId::WcCheckout {
        domain: domain.to_string(),
        order_id,
        cart_token: cart_token.to_string(),
    }
    .to_string()
}

/// Build a hosted-store checkout id.
#[must_use]
pub fn build_hosted_checkout(site_id: &str, checkout_id: &str, access_token: &str) -> String {
    CheckoutId::HostedCheckout {
        site_id: site_id.to_string(),
        checkout_id: checkout_id.to_string(),
        access_token: access_token.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_wc_cart() {
        let id = parse("gid://shop.example.com/Cart/abc123").unwrap();
        assert_eq!(
            id,
            CheckoutId::WcCart {
                domain: "shop.example.com".into(),
                cart_token: "abc123".into(),
            }
        );
    }

    #[test]
    fn parses_wc_checkout() {
        let id = parse("gid://shop.example.com/Checkout/42:abc123").unwrap();
        assert_eq!(
            id,
            CheckoutId::WcCheckout {
                domain: "shop.example.com".into(),
                order_id: 42,
                cart_token: "abc123".into(),
            }
        );
    }

    #[test]
    fn parses_hosted_checkout() {
        let id = parse("gid://wix.site123/Checkout/co_1:tok_2").unwrap();
        assert_eq!(
            id,
            CheckoutId::HostedCheckout {
                site_id: "site123".into(),
                checkout_id: "co_1".into(),
                access_token: "tok_2".into(),
            }
        );
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(parse("shop.example.com/Cart/abc"), Err(IdError::MissingPrefix));
    }

    #[test]
    fn rejects_unknown_segment_for_wc_domain() {
        assert_eq!(
            parse("gid://shop.example.com/Order/abc"),
            Err(IdError::UnknownSegment("Order".into()))
        );
    }

    #[test]
    fn rejects_cart_segment_for_hosted_domain() {
        assert_eq!(
            parse("gid://wix.site123/Cart/abc"),
            Err(IdError::UnknownSegment("Cart".into()))
        );
    }

    #[test]
    fn rejects_empty_cart_token() {
        assert_eq!(
            parse("gid://shop.example.com/Cart/"),
            Err(IdError::EmptyToken)
        );
    }

    #[test]
    fn rejects_missing_colon_in_checkout_form() {
        assert_eq!(
            parse("gid://shop.example.com/Checkout/abc123"),
            Err(IdError::MissingColon)
        );
    }

    #[test]
    fn rejects_non_integer_order_id() {
        assert_eq!(
            parse("gid://shop.example.com/Checkout/abc:def"),
            Err(IdError::NonIntegerOrderId("abc".into()))
        );
    }

    #[test]
    fn rejects_empty_token_after_colon() {
        assert_eq!(
            parse("gid://shop.example.com/Checkout/42:"),
            Err(IdError::EmptyToken)
        );
    }

    #[test]
    fn rejects_missing_colon_in_hosted_form() {
        assert_eq!(
            parse("gid://wix.site123/Checkout/co_1"),
            Err(IdError::MissingColon)
        );
    }

    #[test]
    fn rejects_missing_domain_segment() {
        assert_eq!(parse("gid://onlydomain"), Err(IdError::MissingSegment));
    }

    #[test]
    fn build_then_parse_round_trips_wc_cart() {
        let built = build_wc_cart("shop.example.com", "deadbeef");
        assert_eq!(parse(&built).unwrap(), parse(&built).unwrap());
        assert_eq!(
            parse(&built).unwrap(),
            CheckoutId::WcCart {
                domain: "shop.example.com".into(),
                cart_token: "deadbeef".into(),
            }
        );
    }

    fn token_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9]{1,32}"
    }

    proptest! {
        #[test]
        fn prop_wc_cart_round_trips(domain in "[a-z]{3,12}\\.(com|test)", token in token_strategy()) {
            let built = build_wc_cart(&domain, &token);
            let parsed = parse(&built).unwrap();
            prop_assert_eq!(
                parsed,
                CheckoutId::WcCart { domain, cart_token: token }
            );
        }

        #[test]
        fn prop_wc_checkout_round_trips(domain in "[a-z]{3,12}\\.(com|test)", order_id in 1i64..1_000_000_000, token in token_strategy()) {
            let built = build_wc_checkout(&domain, order_id, &token);
            let parsed = parse(&built).unwrap();
            prop_assert_eq!(
                parsed,
                CheckoutId::WcCheckout { domain, order_id, cart_token: token }
            );
        }

        #[test]
        fn prop_hosted_checkout_round_trips(site_id in "[a-z0-9]{3,16}", checkout_id in token_strategy(), token in token_strategy()) {
            let built = build_hosted_checkout(&site_id, &checkout_id, &token);
            let parsed = parse(&built).unwrap();
            prop_assert_eq!(
                parsed,
                CheckoutId::HostedCheckout { site_id, checkout_id, access_token: token }
            );
        }
    }
}
