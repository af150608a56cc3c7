//! Hosted-store OAuth backend adapter (§4.5, §4.6).

use crate::escalation::{self, EscalationConfig};
use crate::{Adapter, CreateCheckoutInput, UpdateCheckoutInput};
use async_trait::async_trait;
use ucp_core::{
    Address, Checkout, CheckoutBuilder, CheckoutStatus, Discounts, DiscountAllocation, LineItem,
    Message, NegotiatedContext, Payment, ProductRef, Total, TotalType, UcpMeta,
};
use ucp_error::GatewayError;
use ucp_reconcile::{CurrentLineItem, DesiredLineItem};
use ucp_upstream::{OauthCart, OauthClient, OauthConfig, RejectedCoupon};

/// Adapter for the token-authenticated hosted-store OAuth API.
pub struct OauthAdapter {
    client: OauthClient,
    site_id: String,
    merchant_profile: ucp_core::AgentProfile,
    escalation: EscalationConfig,
}

impl OauthAdapter {
    /// Construct an adapter for the given store.
    #[must_use]
    pub fn new(
        config: OauthConfig,
        site_id: impl Into<String>,
        merchant_profile: ucp_core::AgentProfile,
        escalation: EscalationConfig,
    ) -> Self {
        Self {
            client: OauthClient::new(config),
            site_id: site_id.into(),
            merchant_profile,
            escalation,
        }
    }

    fn checkout_from_cart(&self, id: String, cart: &OauthCart, ctx: &NegotiatedContext) -> Checkout {
        let mut line_items = Vec::with_capacity(cart.line_items.len());
        let mut subtotal = 0i64;

        for item in &cart.line_items {
            subtotal += item.total_price;
            let unit_price = if item.quantity > 0 {
                item.total_price / i64::from(item.quantity)
            } else {
                0
            };
            line_items.push(LineItem {
                id: item.id.clone(),
                product: ProductRef {
                    id: item.product_id.clone(),
                    title: String::new(),
                    unit_price,
                    image_url: None,
                },
                quantity: item.quantity,
                base_amount: item.total_price,
                discount: 0,
                subtotal: item.total_price,
                total: item.total_price,
            });
        }

        let empty_map = serde_json::Map::new();
        let escalation_lines: Vec<(String, u32, &serde_json::Map<String, serde_json::Value>)> = cart
            .line_items
            .iter()
            .map(|i| (i.product_id.clone(), i.quantity, &empty_map))
            .collect();
        let triggers = escalation::evaluate(&escalation_lines, &self.escalation);

        let status = if !triggers.is_empty() {
            CheckoutStatus::RequiresEscalation
        } else if line_items.is_empty() {
            CheckoutStatus::Incomplete
        } else {
            CheckoutStatus::ReadyForComplete
        };

        let mut builder = CheckoutBuilder::new(id, cart.totals.currency.clone())
            .status(status)
            .line_items(line_items)
            .total(Total::new(TotalType::Subtotal, subtotal))
            .total(Total::new(TotalType::Discount, cart.totals.discount))
            .total(Total::new(TotalType::Total, cart.totals.total))
            .discounts(Discounts {
                applied: cart
                    .applied_coupons
                    .iter()
                    .map(|c| DiscountAllocation { code: c.code.clone(), amount: c.amount })
                    .collect(),
            })
            .ucp(UcpMeta {
                version: ctx.version.clone(),
                capabilities: ctx.capabilities.clone(),
                payment_handlers: ctx.payment_handlers.clone(),
            });

        if !triggers.is_empty() {
            tracing::debug!(target: "ucp.escalation", count = triggers.len(), "cart read triggered escalation");
            builder = builder
                .continue_url(escalation::continue_url(&triggers))
                .message(Message::error(
                    escalation::ESCALATION_MESSAGE_CODE,
                    "this cart contains a product that requires browser checkout",
                    ucp_error::Severity::Escalation,
                ));
        }

        let mut checkout = builder.build();
        crate::push_degraded_notice(&mut checkout, ctx);
        checkout
    }

    fn line_items_to_mutation(line_items: &[DesiredLineItem]) -> serde_json::Value {
        serde_json::json!({
            "lineItems": line_items
                .iter()
                .map(|i| serde_json::json!({
                    "productId": i.product_id,
                    "variantId": i.variant_id,
                    "quantity": i.quantity,
                }))
                .collect::<Vec<_>>(),
        })
    }

    /// Apply each desired-but-missing discount code as its own call,
    /// collecting whichever ones the upstream rejects rather than failing
    /// the whole update (§4.3, §8). Returns the cart left behind by the
    /// last successful apply, or `cart` unchanged if none applied cleanly.
    async fn apply_coupons(
        &self,
        access_token: &str,
        checkout_id: &str,
        codes: &[String],
        mut cart: OauthCart,
    ) -> (OauthCart, Vec<RejectedCoupon>) {
        let mut rejected = Vec::new();
        for code in codes {
            match self.client.apply_coupon(access_token, checkout_id, code).await {
                Ok(next) => cart = next,
                Err(err) => {
                    let status = match &err {
                        ucp_upstream::UpstreamError::Status { status, .. } => *status,
                        _ => 0,
                    };
                    rejected.push(RejectedCoupon { code: code.clone(), status });
                }
            }
        }
        (cart, rejected)
    }

    /// Build a `$.discounts.codes[i]` warning for each coupon the upstream
    /// rejected (§4.3, §8), indexed against the full desired
    /// `discount_codes` array rather than the diffed apply subset.
    fn rejected_coupon_messages(rejected: &[RejectedCoupon], discount_codes: &[String]) -> Vec<Message> {
        rejected
            .iter()
            .map(|r| {
                let mut message = Message::warning(
                    "DISCOUNT_CODE_REJECTED",
                    format!("discount code '{}' was rejected by the store (status {})", r.code, r.status),
                );
                if let Some(index) = discount_codes.iter().position(|c| c == &r.code) {
                    message = message.with_path(format!("$.discounts.codes[{index}]"));
                }
                message
            })
            .collect()
    }
}

#[async_trait]
impl Adapter for OauthAdapter {
    async fn get_profile(&self) -> Result<ucp_core::AgentProfile, GatewayError> {
        Ok(self.merchant_profile.clone())
    }

    async fn create_checkout(
        &self,
        input: CreateCheckoutInput,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError> {
        let token = self
            .client
            .mint_anonymous_token()
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;

        let cart = if input.line_items.is_empty() {
            self.client
                .get_cart(&token.access_token, "")
                .await
                .map_err(ucp_upstream::UpstreamError::into_gateway_error)?
        } else {
            let mutation = Self::line_items_to_mutation(&input.line_items);
            self.client
                .update_cart(&token.access_token, "", &mutation)
                .await
                .map_err(ucp_upstream::UpstreamError::into_gateway_error)?
        };

        let id = ucp_id::build_hosted_checkout(&self.site_id, &cart.id, &token.access_token);
        Ok(self.checkout_from_cart(id, &cart, ctx))
    }

    async fn get_checkout(&self, id: &str, ctx: &NegotiatedContext) -> Result<Checkout, GatewayError> {
        let (checkout_id, access_token) = match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::HostedCheckout { checkout_id, access_token, .. } => (checkout_id, access_token),
            _ => return Err(GatewayError::not_found("checkout id does not belong to this backend")),
        };
        let cart = self
            .client
            .get_cart(&access_token, &checkout_id)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;
        Ok(self.checkout_from_cart(id.to_string(), &cart, ctx))
    }

    async fn update_checkout(
        &self,
        id: &str,
        input: UpdateCheckoutInput,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError> {
        let (line_items, discount_codes) = crate::validate_put_semantics(&input)?;

        let (checkout_id, access_token) = match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::HostedCheckout { checkout_id, access_token, .. } => (checkout_id, access_token),
            _ => return Err(GatewayError::validation("checkout id does not belong to this backend")),
        };

        let current_cart = self
            .client
            .get_cart(&access_token, &checkout_id)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;

        let current: Vec<CurrentLineItem> = current_cart
            .line_items
            .iter()
            .map(|i| CurrentLineItem {
                product_id: i.product_id.clone(),
                backend_id: i.id.clone(),
                variant_id: i.variant_id.clone(),
                quantity: i.quantity,
            })
            .collect();
        let line_plan = ucp_reconcile::diff_line_items(&current, line_items);
        let current_codes: Vec<String> = current_cart.applied_coupons.iter().map(|c| c.code.clone()).collect();
        let discount_plan = ucp_reconcile::diff_discount_codes(&current_codes, discount_codes);

        let cart = if line_plan.is_empty() && discount_plan.to_remove.is_empty() && input.shipping_address.is_none() {
            current_cart
        } else {
            let mutation = serde_json::json!({
                "removeLineItems": line_plan.to_remove.iter().map(|r| &r.backend_id).collect::<Vec<_>>(),
                "updateLineItems": line_plan.to_update.iter().map(|u| serde_json::json!({
                    "id": u.backend_id,
                    "quantity": u.new_quantity,
                })).collect::<Vec<_>>(),
                "addLineItems": line_plan.to_add.iter().map(|a| serde_json::json!({
                    "productId": a.product_id,
                    "variantId": a.variant_id,
                    "quantity": a.quantity,
                })).collect::<Vec<_>>(),
                "removeCoupons": discount_plan.to_remove,
                "shippingAddress": input.shipping_address.as_ref().map(address_to_json),
            });
            self.client
                .update_cart(&access_token, &checkout_id, &mutation)
                .await
                .map_err(ucp_upstream::UpstreamError::into_gateway_error)?
        };

        let (cart, rejected_coupons) = self
            .apply_coupons(&access_token, &checkout_id, &discount_plan.to_apply, cart)
            .await;

        let mut checkout = self.checkout_from_cart(id.to_string(), &cart, ctx);
        checkout
            .messages
            .extend(Self::rejected_coupon_messages(&rejected_coupons, discount_codes));
        Ok(checkout)
    }

    async fn complete_checkout(
        &self,
        id: &str,
        payment: Payment,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError> {
        // This backend never accepts payment instruments directly (§4.5);
        // a submitted payment is still validated so the caller gets a
        // consistent error surface if it selects zero or multiple.
        crate::require_single_selected_instrument(&payment)?;

        let (checkout_id, access_token) = match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::HostedCheckout { checkout_id, access_token, .. } => (checkout_id, access_token),
            _ => return Err(GatewayError::validation("checkout id does not belong to this backend")),
        };

        let cart = self
            .client
            .get_cart(&access_token, &checkout_id)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;
        let remote_checkout = self
            .client
            .create_checkout(&access_token, &cart.id)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;
        let continue_url = self
            .client
            .create_redirect_session(&access_token, &remote_checkout.id)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;

        let mut checkout = self.checkout_from_cart(id.to_string(), &cart, ctx);
        checkout.status = CheckoutStatus::RequiresEscalation;
        checkout.continue_url = Some(continue_url);
        checkout.messages.push(Message::info(
            "REDIRECT_REQUIRED",
            "this backend completes payment on a hosted page",
        ));
        Ok(checkout)
    }

    async fn cancel_checkout(&self, id: &str, ctx: &NegotiatedContext) -> Result<Checkout, GatewayError> {
        match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::HostedCheckout { .. } => {
                let mut checkout = CheckoutBuilder::new(id, "")
                    .status(CheckoutStatus::Canceled)
                    .ucp(UcpMeta {
                        version: ctx.version.clone(),
                        capabilities: ctx.capabilities.clone(),
                        payment_handlers: ctx.payment_handlers.clone(),
                    })
                    .build();
                crate::push_degraded_notice(&mut checkout, ctx);
                Ok(checkout)
            }
            _ => Err(GatewayError::validation("checkout id does not belong to this backend")),
        }
    }
}

fn address_to_json(addr: &Address) -> serde_json::Value {
    serde_json::json!({
        "name": addr.name,
        "line1": addr.line1,
        "line2": addr.line2,
        "city": addr.city,
        "region": addr.region,
        "postalCode": addr.postal_code,
        "country": addr.country,
        "phone": addr.phone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_to_json_carries_fields() {
        let addr = Address {
            country: Some("US".into()),
            ..Default::default()
        };
        let json = address_to_json(&addr);
        assert_eq!(json["country"], serde_json::json!("US"));
    }
}
