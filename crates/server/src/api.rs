//! HTTP surface for the routing runtime.
//!
//! - `POST /v1/route`                                    - gates + routing for one message
//! - `POST /v1/rate-limit/check`                         - read-only quota lookup
//! - `GET  /v1/business-hours/{entity_id}`               - schedule evaluation for now
//! - `POST /v1/routing-config/{organization_id}/invalidate` - drop cached rules

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dialroute_agent::{InboundMessage, MessageOutcome};
use dialroute_core::domain::conversation::OrganizationId;
use dialroute_core::ratelimit::RateLimitType;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bootstrap::SqlRoutingRuntime;

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<SqlRoutingRuntime>,
}

impl ApiState {
    pub fn new(runtime: Arc<SqlRoutingRuntime>) -> Self {
        Self { runtime }
    }
}

#[derive(Debug, Deserialize)]
pub struct RateLimitCheckRequest {
    pub identity: String,
    pub limit_type: RateLimitType,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub organization_id: u64,
    pub invalidated: bool,
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.into() })).into_response()
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/route", post(route_message))
        .route("/v1/rate-limit/check", post(check_rate_limit))
        .route("/v1/business-hours/{entity_id}", get(business_hours))
        .route("/v1/routing-config/{organization_id}/invalidate", post(invalidate_configs))
        .with_state(state)
}

async fn route_message(State(state): State<ApiState>, Json(inbound): Json<InboundMessage>) -> Response {
    if inbound.identity.trim().is_empty() {
        return bad_request("identity must not be empty");
    }
    if inbound.entity_id.trim().is_empty() {
        return bad_request("entity_id must not be empty");
    }

    let outcome = state.runtime.handle_message(&inbound).await;
    let status = match outcome {
        MessageOutcome::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

async fn check_rate_limit(
    State(state): State<ApiState>,
    Json(request): Json<RateLimitCheckRequest>,
) -> Response {
    if request.identity.trim().is_empty() {
        return bad_request("identity must not be empty");
    }

    let result = state.runtime.guard().limiter().check(&request.identity, request.limit_type).await;
    Json(result).into_response()
}

async fn business_hours(State(state): State<ApiState>, Path(entity_id): Path<String>) -> Response {
    let result = state.runtime.guard().hours().evaluate(&entity_id).await;
    Json(result).into_response()
}

async fn invalidate_configs(
    State(state): State<ApiState>,
    Path(organization_id): Path<String>,
) -> Response {
    let Some(organization) = OrganizationId::parse(&organization_id) else {
        return bad_request(format!("`{organization_id}` is not a valid organization id"));
    };

    state.runtime.resolver().invalidate(&organization).await;
    info!(
        event_name = "routing.config.invalidated",
        organization_id = organization.0,
        "routing rules cache invalidated"
    );
    Json(InvalidateResponse { organization_id: organization.0, invalidated: true }).into_response()
}
