//! HTTP handlers, grouped by resource.

pub mod carts;
pub mod checkout;
pub mod ops;
pub mod orders;
pub mod products;

use ::checkout::CheckoutCoordinator;
use record_store::RecordStore;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RecordStore> {
    pub coordinator: CheckoutCoordinator<S>,
    /// Backend name reported by `/health`.
    pub backend: &'static str,
}
