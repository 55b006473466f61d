//! Storefront domain layer.
//!
//! This crate provides the documents the checkout core works on:
//! - Product catalog with sequential ids
//! - Cart aggregate and its persistence service
//! - Committed orders and their status machine
//! - Persisted id sequences shared by the services

pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod product;
pub mod sequence;

pub use cart::{Cart, CartError, CartItem, CartService, PendingCartClears};
pub use error::DomainError;
pub use money::Money;
pub use order::{Order, OrderError, OrderItem, OrderRepository, OrderStatus};
pub use product::{Catalog, NewProduct, PLACEHOLDER_IMAGE, Product};
pub use sequence::{Sequence, SequenceClaim};
