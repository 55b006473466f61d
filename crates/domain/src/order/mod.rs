//! Committed orders.

mod repository;
mod status;

pub use repository::OrderRepository;
pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use record_store::{Collection, RecordKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Money;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested status change is not allowed.
    #[error("Invalid status transition for order {order_id}: cannot go from {from} to {to}")]
    InvalidStatusTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
}

/// A line of a committed order.
///
/// Name, image and unit price are frozen at commit time and never re-derived
/// from the live product afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total: Money,
    /// Placed through direct buy rather than from the cart.
    #[serde(default)]
    pub direct_buy: bool,
}

impl Order {
    /// Record key of the order document.
    pub fn key(id: OrderId) -> RecordKey {
        RecordKey::new(Collection::Orders, id)
    }

    /// Builds a new pending order, computing the total from the items.
    pub fn pending(
        id: OrderId,
        user_id: UserId,
        items: Vec<OrderItem>,
        direct_buy: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let total = items.iter().map(OrderItem::total_price).sum();
        Self {
            id,
            user_id,
            items,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            total,
            direct_buy,
        }
    }

    /// Returns the total number of units ordered.
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Moves the order to `next`, stamping `updated_at`.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStatusTransition {
                order_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
