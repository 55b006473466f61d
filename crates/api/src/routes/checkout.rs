//! Checkout and direct-buy endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::CheckoutOutcome;
use common::{ProductId, RequestToken, UserId};
use record_store::RecordStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use super::orders::OrderResponse;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub user_id: u64,
    /// Idempotency key. Requests without one are never deduplicated.
    pub request_token: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct DirectBuyRequest {
    pub user_id: u64,
    pub product_id: u64,
    pub quantity: u32,
    pub request_token: Option<Uuid>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    /// True when the token had already produced this order.
    pub replayed: bool,
}

fn token(raw: Option<Uuid>) -> RequestToken {
    raw.map(RequestToken::from_uuid).unwrap_or_default()
}

fn respond(outcome: CheckoutOutcome) -> (StatusCode, Json<CheckoutResponse>) {
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let response = CheckoutResponse {
        order: outcome.order.into(),
        replayed: outcome.replayed,
    };
    (status, Json(response))
}

// -- Handlers --

/// POST /checkout: turn the user's cart into an order.
#[tracing::instrument(skip(state, req), fields(user_id = req.user_id))]
pub async fn checkout<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let outcome = state
        .coordinator
        .checkout(UserId::new(req.user_id), token(req.request_token))
        .await?;

    Ok(respond(outcome))
}

/// POST /direct-buy: order a single product without touching the cart.
#[tracing::instrument(skip(state, req), fields(user_id = req.user_id, product_id = req.product_id))]
pub async fn direct_buy<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<DirectBuyRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let outcome = state
        .coordinator
        .direct_buy(
            UserId::new(req.user_id),
            ProductId::new(req.product_id),
            req.quantity,
            token(req.request_token),
        )
        .await?;

    Ok(respond(outcome))
}
