// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The gateway's Axum wiring: shared state, route table, and the
//! negotiation pipeline every checkout operation runs through (§6.1, §6.2).

pub mod api;
pub mod middleware;

use crate::api::{
    CompleteCheckoutRequest, CreateCheckoutRequest, RpcParams, RpcRequest, RpcResponse,
    UpdateCheckoutRequest, RPC_INVALID_PARAMS, RPC_METHOD_NOT_FOUND,
};
use crate::middleware::{request_id_middleware, CorsConfig, RateLimiter, RequestLogger};
use axum::{
    extract::{Path as AxPath, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use ucp_adapter::Adapter;
use ucp_core::{AgentProfile, Checkout, Message, NegotiatedContext};
use ucp_error::{GatewayError, GatewayErrorDto, Severity};
use ucp_profile_cache::ProfileCache;

/// Request body size limit (§5).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Inbound request budget per caller IP class before `429` kicks in (§5,
/// §10.6). Distinct from `ucp_ratelimit::OutboundLimiter`, which throttles
/// this gateway's own calls to the upstream merchant platform.
pub const INBOUND_RATE_LIMIT_MAX_REQUESTS: u32 = 120;
/// Window the inbound rate limit is evaluated over.
pub const INBOUND_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Shared state handed to every handler.
pub struct AppState {
    /// The single backend adapter this gateway instance was configured for
    /// (§6.3: one `GatewayConfig.backend` per deployment).
    pub adapter: Arc<dyn Adapter>,
    /// This merchant's own discovery profile, used both to answer
    /// `GET /.well-known/ucp` and as the `business` side of every
    /// negotiation (§4.1).
    pub merchant_profile: AgentProfile,
    /// Shared cache of fetched agent profiles (§4.1, §5).
    pub profile_cache: ProfileCache,
    /// CORS policy for the HTTP surface.
    pub cors: CorsConfig,
}

/// Build the Axum router exposing the REST and `/mcp` surfaces.
///
/// `/health` and `/healthz` are merged in after the negotiation-bearing
/// routes have their layers applied, so health checks stay exempt from the
/// body-size limit, CORS policy, and request logging (§10.6).
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = state.cors.to_cors_layer();

    let negotiated = Router::new()
        .route("/.well-known/ucp", get(well_known_profile))
        .route("/checkout-sessions", post(create_checkout))
        .route(
            "/checkout-sessions/{id}",
            get(get_checkout).put(update_checkout),
        )
        .route("/checkout-sessions/{id}/complete", post(complete_checkout))
        .route("/checkout-sessions/{id}/cancel", post(cancel_checkout))
        .route("/mcp", post(rpc_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(RequestLogger::layer))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .layer(RateLimiter::new(INBOUND_RATE_LIMIT_MAX_REQUESTS, INBOUND_RATE_LIMIT_WINDOW).into_layer());

    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .merge(negotiated)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn well_known_profile(State(state): State<Arc<AppState>>) -> Response {
    match state.adapter.get_profile().await {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => {
            let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(GatewayErrorDto::from(&err))).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Negotiation pipeline (§4.1, §6.1)
// ---------------------------------------------------------------------------

/// Extract the `UCP-Agent` header, fetch the agent's profile (falling back
/// to the degraded path on fetch failure), and run capability negotiation.
///
/// On any failure, returns the fully-formed error [`Response`] the caller
/// should return directly — every failure here is a protocol-level error
/// under `/checkout-sessions/*` and must still carry a well-formed Checkout
/// envelope (§8 property 12).
async fn negotiate_request(
    state: &AppState,
    headers: &HeaderMap,
    id_for_error: &str,
) -> Result<NegotiatedContext, (StatusCode, Checkout)> {
    let Some(header_value) = headers.get("ucp-agent").and_then(|v| v.to_str().ok()) else {
        return Err(protocol_error(id_for_error, "ucp_agent_required", "UCP-Agent header is required"));
    };

    let profile_url = match ucp_headers::parse_ucp_agent_profile(header_value) {
        Ok(url) => url,
        Err(err) => return Err(protocol_error(id_for_error, "ucp_agent_required", err.to_string())),
    };

    let (agent_profile, fetch_error) = match state.profile_cache.fetch(&profile_url).await {
        Ok(profile) => (Some(profile), None),
        Err(err) => (None, Some(err.to_string())),
    };

    ucp_negotiate::negotiate(profile_url, &state.merchant_profile, agent_profile.as_ref(), fetch_error)
        .map_err(|err| protocol_error(id_for_error, err.code, err.to_string()))
}

/// Build a `400` status/Checkout pair for a protocol-level negotiation
/// failure (§8 property 12).
fn protocol_error(id: &str, code: &str, message: impl Into<String>) -> (StatusCode, Checkout) {
    let checkout = Checkout::error_envelope(
        id,
        "",
        Message::error(code, message, Severity::Recoverable),
    );
    (StatusCode::BAD_REQUEST, checkout)
}

/// Convert a [`GatewayError`] surfaced by an adapter into the Checkout
/// envelope (§7, §8 property 12).
fn gateway_error_response(id: &str, currency: &str, err: GatewayError) -> (StatusCode, Checkout) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let severity = err.severity();
    let mut message = Message::error(err.code.as_str(), err.message.clone(), severity);
    if let Some(path) = &err.path {
        message = message.with_path(path.clone());
    }
    let checkout = Checkout::error_envelope(id, currency, message);
    (status, checkout)
}

// ---------------------------------------------------------------------------
// REST handlers (§6.1)
// ---------------------------------------------------------------------------

async fn create_checkout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCheckoutRequest>,
) -> Response {
    let ctx = match negotiate_request(&state, &headers, "").await {
        Ok(ctx) => ctx,
        Err((status, checkout)) => return (status, Json(checkout)).into_response(),
    };

    match state.adapter.create_checkout(req.into(), &ctx).await {
        Ok(checkout) => (StatusCode::CREATED, Json(checkout)).into_response(),
        Err(err) => {
            let (status, checkout) = gateway_error_response("", "", err);
            (status, Json(checkout)).into_response()
        }
    }
}

async fn get_checkout(
    State(state): State<Arc<AppState>>,
    AxPath(id): AxPath<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match negotiate_request(&state, &headers, &id).await {
        Ok(ctx) => ctx,
        Err((status, checkout)) => return (status, Json(checkout)).into_response(),
    };

    match state.adapter.get_checkout(&id, &ctx).await {
        Ok(checkout) => Json(checkout).into_response(),
        Err(err) => {
            let (status, checkout) = gateway_error_response(&id, "", err);
            (status, Json(checkout)).into_response()
        }
    }
}

async fn update_checkout(
    State(state): State<Arc<AppState>>,
    AxPath(id): AxPath<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateCheckoutRequest>,
) -> Response {
    let ctx = match negotiate_request(&state, &headers, &id).await {
        Ok(ctx) => ctx,
        Err((status, checkout)) => return (status, Json(checkout)).into_response(),
    };

    match state.adapter.update_checkout(&id, req.into(), &ctx).await {
        Ok(checkout) => Json(checkout).into_response(),
        Err(err) => {
            let (status, checkout) = gateway_error_response(&id, "", err);
            (status, Json(checkout)).into_response()
        }
    }
}

async fn complete_checkout(
    State(state): State<Arc<AppState>>,
    AxPath(id): AxPath<String>,
    headers: HeaderMap,
    Json(req): Json<CompleteCheckoutRequest>,
) -> Response {
    let ctx = match negotiate_request(&state, &headers, &id).await {
        Ok(ctx) => ctx,
        Err((status, checkout)) => return (status, Json(checkout)).into_response(),
    };

    match state.adapter.complete_checkout(&id, req.payment, &ctx).await {
        Ok(checkout) => {
            let status = if checkout.status == ucp_core::CheckoutStatus::RequiresEscalation {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            };
            (status, Json(checkout)).into_response()
        }
        Err(err) => {
            let (status, checkout) = gateway_error_response(&id, "", err);
            (status, Json(checkout)).into_response()
        }
    }
}

async fn cancel_checkout(
    State(state): State<Arc<AppState>>,
    AxPath(id): AxPath<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match negotiate_request(&state, &headers, &id).await {
        Ok(ctx) => ctx,
        Err((status, checkout)) => return (status, Json(checkout)).into_response(),
    };

    match state.adapter.cancel_checkout(&id, &ctx).await {
        Ok(checkout) => Json(checkout).into_response(),
        Err(err) => {
            let (status, checkout) = gateway_error_response(&id, "", err);
            (status, Json(checkout)).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC `/mcp` handler (§6.2)
// ---------------------------------------------------------------------------

async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RpcRequest>,
) -> Response {
    let RpcRequest { params, method, id: rpc_id, .. } = req;
    let RpcParams { meta, id: checkout_id, checkout } = params;

    let Some(profile_url) = meta.ucp_agent.profile else {
        return Json(RpcResponse::framing_error(
            rpc_id,
            RPC_INVALID_PARAMS,
            "meta['ucp-agent']['profile'] is required",
        ))
        .into_response();
    };

    let header_value = format!("profile=\"{profile_url}\"");
    let mut headers = HeaderMap::new();
    if let Ok(value) = axum::http::HeaderValue::from_str(&header_value) {
        headers.insert("ucp-agent", value);
    }

    let id_for_error = checkout_id.clone().unwrap_or_default();
    let ctx = match negotiate_request(&state, &headers, &id_for_error).await {
        Ok(ctx) => ctx,
        Err((_status, checkout)) => {
            // `/mcp` never uses HTTP status codes to signal protocol or
            // domain failures (§6.2): the Checkout envelope always travels
            // as a JSON-RPC success result.
            let value = serde_json::to_value(checkout).unwrap_or(serde_json::Value::Null);
            return Json(RpcResponse::success(rpc_id, value)).into_response();
        }
    };

    let result: Result<Checkout, GatewayError> = match method.as_str() {
        "create_checkout" => {
            state
                .adapter
                .create_checkout(CreateCheckoutRequest::from(checkout).into(), &ctx)
                .await
        }
        "get_checkout" => {
            let Some(id) = checkout_id else {
                return Json(RpcResponse::framing_error(rpc_id, RPC_INVALID_PARAMS, "params.id is required"))
                    .into_response();
            };
            state.adapter.get_checkout(&id, &ctx).await
        }
        "update_checkout" => {
            let Some(id) = checkout_id else {
                return Json(RpcResponse::framing_error(rpc_id, RPC_INVALID_PARAMS, "params.id is required"))
                    .into_response();
            };
            state
                .adapter
                .update_checkout(&id, UpdateCheckoutRequest::from(checkout).into(), &ctx)
                .await
        }
        "complete_checkout" => {
            let Some(id) = checkout_id else {
                return Json(RpcResponse::framing_error(rpc_id, RPC_INVALID_PARAMS, "params.id is required"))
                    .into_response();
            };
            state.adapter.complete_checkout(&id, checkout.payment, &ctx).await
        }
        "cancel_checkout" => {
            let Some(id) = checkout_id else {
                return Json(RpcResponse::framing_error(rpc_id, RPC_INVALID_PARAMS, "params.id is required"))
                    .into_response();
            };
            state.adapter.cancel_checkout(&id, &ctx).await
        }
        other => {
            return Json(RpcResponse::framing_error(
                rpc_id,
                RPC_METHOD_NOT_FOUND,
                format!("unknown tool '{other}'"),
            ))
            .into_response();
        }
    };

    match result {
        Ok(checkout) => {
            let value = serde_json::to_value(checkout).unwrap_or(serde_json::Value::Null);
            Json(RpcResponse::success(rpc_id, value)).into_response()
        }
        Err(err) => {
            // Domain errors still yield a `result` carrying a Checkout
            // envelope (§3.1 invariant) rather than a JSON-RPC `error`,
            // which is reserved for transport/framing failures.
            let checkout = {
                let status = err.http_status();
                let severity = err.severity();
                let mut message = Message::error(err.code.as_str(), err.message.clone(), severity);
                if let Some(path) = &err.path {
                    message = message.with_path(path.clone());
                }
                tracing::debug!(http.status = status, "adapter returned error for rpc call");
                Checkout::error_envelope(id_for_error, "", message)
            };
            let value = serde_json::to_value(checkout).unwrap_or(serde_json::Value::Null);
            Json(RpcResponse::success(rpc_id, value)).into_response()
        }
    }
}
