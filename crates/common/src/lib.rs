//! Identifiers shared by every crate in the storefront workspace.

mod types;

pub use types::{OrderId, ProductId, RequestToken, UserId};
