//! Checkout core for storefront orders.
//!
//! This crate turns carts into orders while decrementing shared product
//! stock, correctly under concurrent checkouts:
//! 1. Validate the lines against the catalog
//! 2. Reserve stock for every line at once
//! 3. Persist the order and commit the stock decrement
//! 4. Take the ordered lines out of the cart
//!
//! A failure before step 3 leaves no trace; a failure after it never
//! unwinds the order.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod state;

pub use config::{CheckoutConfig, RetryPolicy};
pub use coordinator::{CheckoutCoordinator, CheckoutOutcome};
pub use error::{CheckoutError, Result, Shortfall};
pub use ledger::{InventoryLedger, Reservation, ReservedItem};
pub use locks::{LockSet, ProductLocks};
pub use state::CheckoutState;
