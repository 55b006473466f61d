//! Checkout error types.

use common::ProductId;
use domain::DomainError;
use record_store::RecordStoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A line that could not be reserved, with what was asked for and what was
/// left at the time of the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
}

/// Errors that can occur during checkout.
///
/// Every variant except a failed stock commit is raised before anything is
/// written, so the caller may safely retry.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request is malformed (empty cart, zero quantity, reused token).
    #[error("Invalid checkout request: {0}")]
    Validation(String),

    /// A referenced product does not exist.
    #[error("Product not found: {product_id}")]
    NotFound { product_id: ProductId },

    /// At least one line exceeds available stock. Lists every such line.
    #[error("Insufficient stock for {} item(s)", .0.len())]
    InsufficientStock(Vec<Shortfall>),

    /// Lock wait timed out or an optimistic write lost a race.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The store failed to read or write.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl CheckoutError {
    /// Returns true when the same request may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CheckoutError::ConcurrencyConflict(_) | CheckoutError::Persistence(_)
        )
    }

    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation",
            CheckoutError::NotFound { .. } => "not_found",
            CheckoutError::InsufficientStock(_) => "insufficient_stock",
            CheckoutError::ConcurrencyConflict(_) => "conflict",
            CheckoutError::Persistence(_) => "persistence",
        }
    }
}

impl From<RecordStoreError> for CheckoutError {
    fn from(err: RecordStoreError) -> Self {
        if err.is_conflict() {
            CheckoutError::ConcurrencyConflict(err.to_string())
        } else {
            CheckoutError::Persistence(err.to_string())
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Store(e) => e.into(),
            DomainError::ProductNotFound(product_id) => CheckoutError::NotFound { product_id },
            DomainError::Cart(e) => CheckoutError::Validation(e.to_string()),
            DomainError::InvalidProduct(msg) => CheckoutError::Validation(msg),
            DomainError::Contended { .. } => CheckoutError::ConcurrencyConflict(err.to_string()),
            DomainError::OrderNotFound(_) | DomainError::Order(_) => {
                CheckoutError::Persistence(err.to_string())
            }
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
