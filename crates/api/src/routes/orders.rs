//! Order history and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{Order, OrderStatus};
use record_store::RecordStore;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Option<u64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub direct_buy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_cents: order.total.cents(),
            direct_buy: order.direct_buy,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    name: item.name,
                    image: item.image,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// GET /orders/:id: load a single order.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .coordinator
        .orders()
        .get_order(OrderId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(order.into()))
}

/// GET /orders?user_id=: list orders, optionally for one user.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .coordinator
        .orders()
        .list_orders(query.user_id.map(UserId::new))
        .await?;

    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// PUT /orders/:id/status: move an order along its fulfilment lifecycle.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .coordinator
        .orders()
        .update_status(OrderId::new(id), req.status)
        .await?;

    Ok(Json(order.into()))
}
