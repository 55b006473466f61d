//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{ProductId, UserId};
use domain::Cart;
use record_store::RecordStore;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub user_id: u64,
    pub product_id: u64,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    /// Zero or negative removes the line.
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub user_id: UserId,
    pub items: Vec<CartItemResponse>,
    pub total_count: u64,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub quantity: u32,
    pub price_cents: i64,
    pub line_total_cents: i64,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            user_id: cart.user_id,
            total_count: cart.total_quantity(),
            total_cents: cart.total().cents(),
            items: cart
                .items()
                .iter()
                .map(|item| CartItemResponse {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    image: item.image.clone(),
                    quantity: item.quantity,
                    price_cents: item.price.cents(),
                    line_total_cents: item.total_price().cents(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// GET /cart/:user_id: the user's cart; empty if never used.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<u64>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .coordinator
        .carts()
        .get_cart(UserId::new(user_id))
        .await?;
    Ok(Json(cart.into()))
}

/// POST /cart: add units of a product, merging with an existing line.
#[tracing::instrument(skip(state, req), fields(user_id = req.user_id, product_id = req.product_id))]
pub async fn add_item<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .coordinator
        .carts()
        .add_item(
            UserId::new(req.user_id),
            ProductId::new(req.product_id),
            req.quantity,
        )
        .await?;
    Ok(Json(cart.into()))
}

/// PUT /cart/:user_id/:product_id: set a line's quantity.
#[tracing::instrument(skip(state, req))]
pub async fn update_quantity<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, product_id)): Path<(u64, u64)>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .coordinator
        .carts()
        .update_quantity(
            UserId::new(user_id),
            ProductId::new(product_id),
            req.quantity,
        )
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/:user_id/:product_id: drop a line.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, product_id)): Path<(u64, u64)>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .coordinator
        .carts()
        .remove_item(UserId::new(user_id), ProductId::new(product_id))
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/:user_id: empty the cart.
#[tracing::instrument(skip(state))]
pub async fn clear<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<u64>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.coordinator.carts().clear(UserId::new(user_id)).await?;
    Ok(Json(cart.into()))
}
