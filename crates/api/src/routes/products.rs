//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{Money, NewProduct, Product};
use record_store::RecordStore;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub image: Option<String>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
    pub category: String,
    pub description: String,
    pub image: String,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            price_cents: product.price.cents(),
            stock: product.stock,
            category: product.category,
            description: product.description,
            image: product.image,
        }
    }
}

/// GET /products: the whole catalog, ordered by id.
#[tracing::instrument(skip(state))]
pub async fn list<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.coordinator.catalog().list_products().await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// GET /products/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .coordinator
        .catalog()
        .get_product(ProductId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;
    Ok(Json(product.into()))
}

/// POST /products: register a product under the next id.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let new = NewProduct {
        name: req.name,
        price: Money::from_cents(req.price_cents),
        stock: req.stock,
        category: req.category,
        description: req.description,
        image: req.image,
    };
    let product = state.coordinator.catalog().register_product(new).await?;

    Ok((StatusCode::CREATED, Json(product.into())))
}
