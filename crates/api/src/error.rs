//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::{CartError, DomainError, OrderError};
use serde_json::{Value, json};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout or direct-buy failure.
    Checkout(CheckoutError),
    /// Cart, catalog or order failure.
    Domain(DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Domain(err) => domain_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(%status, body = %body, "request failed");
        }
        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string())
            .increment(1);

        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, Value) {
    let message = err.to_string();
    match err {
        CheckoutError::Validation(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
        CheckoutError::NotFound { product_id } => (
            StatusCode::NOT_FOUND,
            json!({ "error": message, "missingProductId": product_id }),
        ),
        CheckoutError::InsufficientStock(shortfalls) => (
            StatusCode::CONFLICT,
            json!({ "error": message, "insufficientItems": shortfalls }),
        ),
        CheckoutError::ConcurrencyConflict(_) | CheckoutError::Persistence(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": message, "transient": true }),
        ),
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, Value) {
    let message = err.to_string();
    match &err {
        DomainError::ProductNotFound(id) => (
            StatusCode::NOT_FOUND,
            json!({ "error": message, "missingProductId": id }),
        ),
        DomainError::OrderNotFound(_) | DomainError::Cart(CartError::ItemNotFound { .. }) => {
            (StatusCode::NOT_FOUND, json!({ "error": message }))
        }
        DomainError::Cart(CartError::InvalidQuantity { .. }) | DomainError::InvalidProduct(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": message }))
        }
        DomainError::Order(OrderError::InvalidStatusTransition { .. }) => {
            (StatusCode::CONFLICT, json!({ "error": message }))
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": message, "transient": err.is_transient() }),
        ),
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}
