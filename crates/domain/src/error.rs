//! Domain error types.

use common::{OrderId, ProductId};
use record_store::RecordStoreError;
use thiserror::Error;

use crate::cart::CartError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Record store error: {0}")]
    Store(#[from] RecordStoreError),

    /// A cart operation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// An order operation was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A new product failed validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// Optimistic writes kept losing races.
    #[error("Gave up after {attempts} conflicting writes to {resource}")]
    Contended { resource: String, attempts: u32 },
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Store(RecordStoreError::Serialization(err))
    }
}

impl DomainError {
    /// Returns true for failures worth retrying (conflicts and I/O).
    pub fn is_transient(&self) -> bool {
        match self {
            DomainError::Store(e) => !matches!(
                e,
                RecordStoreError::InvalidBatch(_) | RecordStoreError::Serialization(_)
            ),
            DomainError::Contended { .. } => true,
            _ => false,
        }
    }
}
