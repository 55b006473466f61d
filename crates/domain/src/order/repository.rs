use chrono::Utc;
use common::{OrderId, UserId};
use record_store::{Collection, RecordStore, RecordStoreExt, WriteOp};

use super::{Order, OrderStatus};
use crate::error::DomainError;

const MAX_STATUS_ATTEMPTS: u32 = 5;

/// Reads committed orders and drives their post-checkout status changes.
#[derive(Debug, Clone)]
pub struct OrderRepository<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> OrderRepository<S> {
    /// Creates a repository over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads an order. Returns None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self
            .store
            .get_as::<Order>(&Order::key(id))
            .await?
            .map(|o| o.value))
    }

    /// Lists orders by ascending id, optionally restricted to one user.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>, DomainError> {
        let mut orders: Vec<Order> = self
            .store
            .list_as::<Order>(Collection::Orders)
            .await?
            .into_iter()
            .map(|o| o.value)
            .filter(|o| user_id.is_none_or(|user| o.user_id == user))
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    /// Moves an order to a new status.
    ///
    /// The write is conditional on the version that was read; a concurrent
    /// update makes it re-read and re-validate the transition.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let key = Order::key(id);

        for _ in 0..MAX_STATUS_ATTEMPTS {
            let mut current = self
                .store
                .get_as::<Order>(&key)
                .await?
                .ok_or(DomainError::OrderNotFound(id))?;

            let from = current.value.status;
            current.value.transition_to(status, Utc::now())?;

            let op = WriteOp::upsert_as(key.clone(), current.version, &current.value)?;
            match self.store.write_batch(vec![op]).await {
                Ok(_) => {
                    tracing::info!(order_id = %id, %from, to = %status, "order status updated");
                    return Ok(current.value);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(order_id = %id, "order changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Contended {
            resource: key.to_string(),
            attempts: MAX_STATUS_ATTEMPTS,
        })
    }
}
