//! WooCommerce backend adapter (§4.4, §4.6).

use crate::escalation::{self, EscalationConfig};
use crate::{Adapter, CreateCheckoutInput, UpdateCheckoutInput};
use async_trait::async_trait;
use ucp_core::{
    Address, Buyer, Checkout, CheckoutBuilder, CheckoutStatus, Discounts, DiscountAllocation,
    LineItem, Message, NegotiatedContext, Payment, ProductRef, Total, TotalType, UcpMeta,
};
use ucp_error::{ErrorCode, GatewayError, Severity};
use ucp_reconcile::{CurrentLineItem, DesiredLineItem};
use ucp_upstream::{DispatchOutcome, PaymentStatus, RejectedCoupon, WcCart, WcClient, WcConfig, WooBatchRequest};

/// Batch-dispatch strategy for mutation plans (§4.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStrategy {
    /// Single `POST /batch` round trip (default).
    #[default]
    Multi,
    /// Chained individual operations (fallback).
    Sequential,
}

/// Adapter for the nonce-authenticated WooCommerce Store API.
pub struct WcAdapter {
    client: WcClient,
    domain: String,
    merchant_profile: ucp_core::AgentProfile,
    escalation: EscalationConfig,
    strategy: BatchStrategy,
}

impl WcAdapter {
    /// Construct an adapter for the given store.
    #[must_use]
    pub fn new(
        config: WcConfig,
        domain: impl Into<String>,
        merchant_profile: ucp_core::AgentProfile,
        escalation: EscalationConfig,
        strategy: BatchStrategy,
    ) -> Self {
        Self {
            client: WcClient::new(config),
            domain: domain.into(),
            merchant_profile,
            escalation,
            strategy,
        }
    }

    async fn dispatch(&self, cart_token: &str, plan: &WooBatchRequest) -> Result<DispatchOutcome, GatewayError> {
        let result = match self.strategy {
            BatchStrategy::Multi => self.client.dispatch_multi(cart_token, plan).await,
            BatchStrategy::Sequential => self.client.dispatch_sequential(cart_token, plan).await,
        };
        result.map_err(ucp_upstream::UpstreamError::into_gateway_error)
    }

    /// Build a `$.discounts.codes[i]` warning for each coupon the upstream
    /// rejected (§4.3, §8 "discount failure is a warning"), indexed against
    /// the full desired `discount_codes` array rather than the diffed
    /// apply subset.
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

    async fn read(&self, cart_token: &str) -> Result<WcCart, GatewayError> {
        let preflight = self
            .client
            .preflight(cart_token)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;
        let (cart, _) = self
            .client
            .read_cart(cart_token, &preflight.nonce)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;
        Ok(cart)
    }

    fn parse_product_id(product_id: &str) -> Result<i64, GatewayError> {
        product_id.parse::<i64>().map_err(|_| {
            GatewayError::validation(format!("product id '{product_id}' is not numeric on this backend"))
                .with_path("$.line_items")
        })
    }

    fn checkout_from_cart(&self, id: String, cart: &WcCart, ctx: &NegotiatedContext) -> Checkout {
        let mut line_items = Vec::with_capacity(cart.items.len());
        let mut items_discount = 0i64;
        let mut subtotal = 0i64;

        for item in &cart.items {
            let unit_price = if item.quantity > 0 {
                item.totals_subtotal / i64::from(item.quantity)
            } else {
                0
            };
            let discount = (item.totals_subtotal - item.totals_total).max(0);
            items_discount += discount;
            subtotal += item.totals_subtotal;

            line_items.push(LineItem {
                id: item.key.clone(),
                product: ProductRef {
                    id: item.id.to_string(),
                    title: item.name.clone(),
                    unit_price,
                    image_url: item.image_url.clone(),
                },
                quantity: item.quantity,
                base_amount: item.totals_subtotal,
                discount,
                subtotal: item.totals_subtotal,
                total: item.totals_total,
            });
        }

        let escalation_lines: Vec<(String, u32, &serde_json::Map<String, serde_json::Value>)> = cart
            .items
            .iter()
            .map(|i| (i.id.to_string(), i.quantity, &i.extensions))
            .collect();
        let triggers = escalation::evaluate(&escalation_lines, &self.escalation);

        let status = if !triggers.is_empty() {
            CheckoutStatus::RequiresEscalation
        } else if line_items.is_empty() {
            CheckoutStatus::Incomplete
        } else {
            CheckoutStatus::ReadyForComplete
        };

        let mut builder = CheckoutBuilder::new(id, cart.totals.currency_code.clone())
            .status(status)
            .line_items(line_items)
            .total(Total::new(TotalType::ItemsDiscount, items_discount))
            .total(Total::new(TotalType::Subtotal, subtotal))
            .total(Total::new(TotalType::Discount, cart.totals.total_discount))
            .total(Total::new(TotalType::Fulfillment, cart.totals.total_shipping))
            .total(Total::new(TotalType::Tax, cart.totals.total_tax))
            .total(Total::new(TotalType::Total, cart.totals.total_price))
            .discounts(Discounts {
                applied: cart
                    .coupons
                    .iter()
                    .map(|c| DiscountAllocation { code: c.code.clone(), amount: c.totals.total_discount })
                    .collect(),
            })
            .ucp(UcpMeta {
                version: ctx.version.clone(),
                capabilities: ctx.capabilities.clone(),
                payment_handlers: ctx.payment_handlers.clone(),
            });

        if let Some(email) = &cart.billing_email {
            builder = builder.buyer(Buyer { email: Some(email.clone()), name: None, phone: None });
        }

        if !triggers.is_empty() {
            tracing::debug!(target: "ucp.escalation", count = triggers.len(), "cart read triggered escalation");
            builder = builder
                .continue_url(escalation::continue_url(&triggers))
                .message(Message::error(
                    escalation::ESCALATION_MESSAGE_CODE,
                    "this cart contains a product that requires browser checkout",
                    Severity::Escalation,
                ));
        }

        let mut checkout = builder.build();
        crate::push_degraded_notice(&mut checkout, ctx);
        checkout
    }

    async fn seed_plan(
        &self,
        cart_token: &str,
        line_items: &[DesiredLineItem],
        shipping: Option<&Address>,
        billing: Option<&Address>,
    ) -> Result<WcCart, GatewayError> {
        let mut plan = WooBatchRequest::new();
        for item in line_items {
            let product_id = Self::parse_product_id(&item.product_id)?;
            let variant_id = item
                .variant_id
                .as_deref()
                .map(Self::parse_product_id)
                .transpose()?;
            plan = plan.add_line_item(product_id, variant_id, item.quantity);
        }
        if shipping.is_some() || billing.is_some() {
            plan = plan.set_customer(
                shipping.map(address_to_json),
                billing.map(address_to_json),
            );
        }
        Ok(self.dispatch(cart_token, &plan).await?.cart)
    }
}

fn address_to_json(addr: &Address) -> serde_json::Value {
    serde_json::json!({
        "first_name": addr.name,
        "address_1": addr.line1,
        "address_2": addr.line2,
        "city": addr.city,
        "state": addr.region,
        "postcode": addr.postal_code,
        "country": addr.country,
        "phone": addr.phone,
    })
}

#[async_trait]
impl Adapter for WcAdapter {
    async fn get_profile(&self) -> Result<ucp_core::AgentProfile, GatewayError> {
        Ok(self.merchant_profile.clone())
    }

    async fn create_checkout(
        &self,
        input: CreateCheckoutInput,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError> {
        let (cart_token, cart) = if let Some(token) = input.cart_token {
            let cart = if input.shipping_address.is_some() || input.billing_address.is_some() {
                self.seed_plan(&token, &[], input.shipping_address.as_ref(), input.billing_address.as_ref())
                    .await?
            } else {
                self.read(&token).await?
            };
            (token, cart)
        } else {
            let token = WcClient::generate_cart_token();
            let cart = self
                .seed_plan(
                    &token,
                    &input.line_items,
                    input.shipping_address.as_ref(),
                    input.billing_address.as_ref(),
                )
                .await?;
            (token, cart)
        };

        let id = ucp_id::build_wc_cart(&self.domain, &cart_token);
        Ok(self.checkout_from_cart(id, &cart, ctx))
    }

    async fn get_checkout(&self, id: &str, ctx: &NegotiatedContext) -> Result<Checkout, GatewayError> {
        match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::WcCart { cart_token, .. } => {
                let cart = self.read(&cart_token).await?;
                Ok(self.checkout_from_cart(id.to_string(), &cart, ctx))
            }
            ucp_id::CheckoutId::WcCheckout { order_id, .. } => {
                let mut checkout = CheckoutBuilder::new(id, "")
                    .status(CheckoutStatus::Completed)
                    .order(order_id.to_string(), format!("https://{}/order/{order_id}", self.domain))
                    .ucp(UcpMeta {
                        version: ctx.version.clone(),
                        capabilities: ctx.capabilities.clone(),
                        payment_handlers: ctx.payment_handlers.clone(),
                    })
                    .build();
                crate::push_degraded_notice(&mut checkout, ctx);
                Ok(checkout)
            }
            ucp_id::CheckoutId::HostedCheckout { .. } => {
                Err(GatewayError::not_found("checkout id does not belong to this backend"))
            }
        }
    }

    async fn update_checkout(
        &self,
        id: &str,
        input: UpdateCheckoutInput,
        ctx: &NegotiatedContext,
    ) -> Result<Checkout, GatewayError> {
        let (line_items, discount_codes) = crate::validate_put_semantics(&input)?;

        let cart_token = match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::WcCart { cart_token, .. } => cart_token,
            _ => return Err(GatewayError::validation("checkout has already been completed")),
        };

        let current_cart = self.read(&cart_token).await?;
        let current: Vec<CurrentLineItem> = current_cart
            .items
            .iter()
            .map(|i| CurrentLineItem {
                product_id: i.id.to_string(),
                backend_id: i.key.clone(),
                variant_id: i.variation_id.map(|v| v.to_string()),
                quantity: i.quantity,
            })
            .collect();
        let line_plan = ucp_reconcile::diff_line_items(&current, line_items);
        let current_codes: Vec<String> = current_cart.coupons.iter().map(|c| c.code.clone()).collect();
        let discount_plan = ucp_reconcile::diff_discount_codes(&current_codes, discount_codes);

        let mut plan = WooBatchRequest::new();
        for r in &line_plan.to_remove {
            plan = plan.remove_line_item(&r.backend_id);
        }
        for u in &line_plan.to_update {
            plan = plan.update_line_item(&u.backend_id, u.new_quantity);
        }
        for a in &line_plan.to_add {
            let product_id = Self::parse_product_id(&a.product_id)?;
            let variant_id = a.variant_id.as_deref().map(Self::parse_product_id).transpose()?;
            plan = plan.add_line_item(product_id, variant_id, a.quantity);
        }
        if input.shipping_address.is_some() || input.billing_address.is_some() {
            plan = plan.set_customer(
                input.shipping_address.as_ref().map(address_to_json),
                input.billing_address.as_ref().map(address_to_json),
            );
        }
        for code in &discount_plan.to_remove {
            plan = plan.remove_coupon(code);
        }
        for code in &discount_plan.to_apply {
            plan = plan.apply_coupon(code);
        }
        if let Some(option_id) = &input.fulfillment_option_id {
            plan = plan.select_shipping_rate("default", option_id);
        }

        let (cart, rejected_coupons) = if plan.is_empty() {
            (current_cart, Vec::new())
        } else {
            let outcome = self.dispatch(&cart_token, &plan).await?;
            (outcome.cart, outcome.rejected_coupons)
        };

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
        let instrument = crate::require_single_selected_instrument(&payment)?;

        let cart_token = match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::WcCart { cart_token, .. } => cart_token,
            _ => return Err(GatewayError::validation("checkout has already been completed")),
        };

        let payment_body = serde_json::json!({
            "payment_method": instrument.credential.kind,
            "payment_data": { "token": instrument.credential.token },
        });

        let (pre_payment_cart, response) = self
            .client
            .complete(&cart_token, &payment_body)
            .await
            .map_err(ucp_upstream::UpstreamError::into_gateway_error)?;

        let mut checkout = self.checkout_from_cart(id.to_string(), &pre_payment_cart, ctx);

        match response.payment_result.payment_status {
            PaymentStatus::Success => {
                checkout.status = CheckoutStatus::Completed;
                checkout.id = ucp_id::build_wc_checkout(&self.domain, response.order_id, &cart_token);
                checkout.order_id = Some(response.order_id.to_string());
                checkout.order_permalink_url =
                    Some(format!("https://{}/order/{}", self.domain, response.order_id));
            }
            PaymentStatus::Pending => {
                checkout.status = CheckoutStatus::RequiresEscalation;
                checkout.continue_url = response.payment_result.redirect_url.clone();
                checkout
                    .messages
                    .push(Message::info("3DS_REQUIRED", "additional authentication is required"));
            }
            PaymentStatus::Failure => {
                checkout.status = CheckoutStatus::ReadyForComplete;
                checkout.messages.push(Message::error(
                    ErrorCode::PaymentError.as_str(),
                    "payment was declined",
                    Severity::Recoverable,
                ));
            }
        }

        tracing::debug!(target: "ucp.complete", status = ?checkout.status, "checkout completion settled");
        Ok(checkout)
    }

    async fn cancel_checkout(&self, id: &str, ctx: &NegotiatedContext) -> Result<Checkout, GatewayError> {
        match ucp_id::parse(id).map_err(|e| GatewayError::validation(e.to_string()))? {
            ucp_id::CheckoutId::WcCart { .. } => {
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
            _ => Err(GatewayError::validation("a completed checkout cannot be canceled")),
        }
    }
}
