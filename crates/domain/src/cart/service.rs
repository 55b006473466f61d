use common::{OrderId, ProductId, UserId};
use record_store::{RecordStore, RecordStoreExt, Version, WriteOp};

use super::{Cart, CartError, CartItem, PendingCartClears};
use crate::error::DomainError;
use crate::order::Order;
use crate::product::Product;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Persists carts and keeps them consistent with committed orders.
///
/// Every operation follows the same cycle: load the cart at some version,
/// take out the lines of committed orders listed in `cart_clears`, apply
/// the change, then write the cart and drop the pending clears in one
/// conditional batch. A lost race reloads and replays the change.
#[derive(Debug, Clone)]
pub struct CartService<S: RecordStore> {
    store: S,
    max_attempts: u32,
}

impl<S: RecordStore> CartService<S> {
    /// Creates a cart service over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how many conflicting writes are tolerated before giving up.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns the user's cart, reconciled with committed orders.
    ///
    /// A user who never added anything gets an empty cart.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.modify(user_id, |_| Ok(())).await
    }

    /// Adds `quantity` units of a catalog product, capturing its current
    /// name, price and image.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, DomainError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 }.into());
        }

        let product = self
            .store
            .get_as::<Product>(&Product::key(product_id))
            .await?
            .ok_or(DomainError::ProductNotFound(product_id))?
            .value;
        let item = CartItem::from_product(&product, quantity);

        self.modify(user_id, |cart| cart.add_item(item.clone()))
            .await
    }

    /// Removes a product's line. Absent products are ignored.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Cart, DomainError> {
        self.modify(user_id, |cart| {
            cart.remove_item(product_id);
            Ok(())
        })
        .await
    }

    /// Sets a line's quantity; zero or negative removes it.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart, DomainError> {
        self.modify(user_id, |cart| cart.update_quantity(product_id, quantity))
            .await
    }

    /// Empties the cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.modify(user_id, |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    /// Takes a committed order's lines out of the user's cart.
    ///
    /// The order must have been registered through [`Self::pending_clear_op`];
    /// once its lines are gone this is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn remove_committed(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Cart, DomainError> {
        self.modify(user_id, |_| Ok(())).await
    }

    /// Builds the write that registers `order_id` as pending removal from
    /// the user's cart.
    ///
    /// Only orders whose stock is committed may be registered: include it in
    /// the same batch as the stock decrement, never ahead of it.
    pub async fn pending_clear_op(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<WriteOp, DomainError> {
        let key = PendingCartClears::key(user_id);
        let (mut pending, version) = match self.store.get_as::<PendingCartClears>(&key).await? {
            Some(current) => (current.value, current.version),
            None => (PendingCartClears::default(), Version::initial()),
        };
        if !pending.orders.contains(&order_id) {
            pending.orders.push(order_id);
        }
        Ok(WriteOp::upsert_as(key, version, &pending)?)
    }

    async fn modify<F>(&self, user_id: UserId, mut change: F) -> Result<Cart, DomainError>
    where
        F: FnMut(&mut Cart) -> Result<(), CartError>,
    {
        let cart_key = Cart::key(user_id);
        let clears_key = PendingCartClears::key(user_id);

        for attempt in 1..=self.max_attempts {
            let (mut cart, cart_version) = match self.store.get_as::<Cart>(&cart_key).await? {
                Some(stored) => (stored.value, stored.version),
                None => (Cart::new(user_id), Version::initial()),
            };
            let original = cart.clone();

            let pending = self
                .store
                .get_as::<PendingCartClears>(&clears_key)
                .await?;
            if let Some(pending) = &pending {
                for order_id in &pending.value.orders {
                    match self.store.get_as::<Order>(&Order::key(*order_id)).await? {
                        Some(order) => cart.subtract(
                            order
                                .value
                                .items
                                .iter()
                                .map(|item| (item.product_id, item.quantity)),
                        ),
                        None => {
                            tracing::warn!(%user_id, %order_id, "pending cart clear references missing order")
                        }
                    }
                }
            }

            change(&mut cart)?;

            let mut ops = Vec::with_capacity(2);
            if pending.is_some() || cart != original {
                ops.push(WriteOp::upsert_as(cart_key.clone(), cart_version, &cart)?);
            }
            if let Some(pending) = &pending {
                ops.push(WriteOp::delete(clears_key.clone(), pending.version));
            }
            if ops.is_empty() {
                return Ok(cart);
            }

            match self.store.write_batch(ops).await {
                Ok(_) => {
                    if let Some(pending) = &pending {
                        tracing::info!(
                            %user_id,
                            orders = pending.value.orders.len(),
                            "removed committed orders from cart"
                        );
                    }
                    return Ok(cart);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(%user_id, attempt, "cart changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Contended {
            resource: cart_key.to_string(),
            attempts: self.max_attempts,
        })
    }
}
