//! Shopping cart aggregate.
//!
//! `Cart` is a plain value type; persistence and reconciliation with
//! committed orders live in [`CartService`].

mod service;

pub use service::CartService;

use common::{OrderId, ProductId, UserId};
use record_store::{Collection, RecordKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Money;
use crate::product::Product;

/// Errors that can occur when mutating a cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity is zero or outside the representable range.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// The cart has no line for this product.
    #[error("Product {product_id} is not in the cart")]
    ItemNotFound { product_id: ProductId },
}

/// A cart line.
///
/// Name, price and image are captured when the product is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub image: String,
    pub quantity: u32,
}

impl CartItem {
    /// Builds a line for `quantity` units of `product`.
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
            quantity,
        }
    }

    /// Returns the line total at the captured price.
    pub fn total_price(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A user's cart. At most one line per product, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: UserId,
    #[serde(default)]
    items: Vec<CartItem>,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
        }
    }

    /// Record key of the cart document.
    pub fn key(user_id: UserId) -> RecordKey {
        RecordKey::new(Collection::Carts, user_id)
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the line for a product, if present.
    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Sum of quantities over all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of line totals at the captured prices.
    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::total_price).sum()
    }

    /// Adds a line, merging quantities into an existing line for the
    /// same product. The existing line keeps its captured details.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 });
        }

        match self
            .items
            .iter_mut()
            .find(|i| i.product_id == item.product_id)
        {
            Some(existing) => {
                let merged = existing.quantity.checked_add(item.quantity).ok_or(
                    CartError::InvalidQuantity {
                        quantity: i64::from(existing.quantity) + i64::from(item.quantity),
                    },
                )?;
                existing.quantity = merged;
            }
            None => self.items.push(item),
        }
        Ok(())
    }

    /// Removes the line for a product. Removing an absent product is a
    /// no-op and returns None.
    pub fn remove_item(&mut self, product_id: ProductId) -> Option<CartItem> {
        let index = self.items.iter().position(|i| i.product_id == product_id)?;
        Some(self.items.remove(index))
    }

    /// Sets a line's quantity; zero or negative removes the line.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove_item(product_id);
            return Ok(());
        }

        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;
        let line = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CartError::ItemNotFound { product_id })?;
        line.quantity = quantity;
        Ok(())
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Takes ordered quantities out of the cart, dropping lines that reach
    /// zero. Units added after the order was placed remain.
    pub fn subtract(&mut self, ordered: impl IntoIterator<Item = (ProductId, u32)>) {
        for (product_id, quantity) in ordered {
            if let Some(line) = self.items.iter_mut().find(|i| i.product_id == product_id) {
                line.quantity = line.quantity.saturating_sub(quantity);
            }
        }
        self.items.retain(|i| i.quantity > 0);
    }
}

/// Committed orders whose lines have not yet been taken out of the cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCartClears {
    pub orders: Vec<OrderId>,
}

impl PendingCartClears {
    /// Record key of a user's pending clears.
    pub fn key(user_id: UserId) -> RecordKey {
        RecordKey::new(Collection::CartClears, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product: u64, quantity: u32, cents: i64) -> CartItem {
        CartItem {
            product_id: ProductId::new(product),
            name: format!("product-{product}"),
            price: Money::from_cents(cents),
            image: String::new(),
            quantity,
        }
    }

    #[test]
    fn add_merges_same_product() {
        let mut cart = Cart::new(UserId::new(1));
        cart.add_item(line(1, 2, 1000)).unwrap();
        cart.add_item(line(2, 1, 500)).unwrap();
        cart.add_item(line(1, 3, 9999)).unwrap();

        assert_eq!(cart.items().len(), 2);
        let first = cart.item(ProductId::new(1)).unwrap();
        assert_eq!(first.quantity, 5);
        assert_eq!(first.price, Money::from_cents(1000));
        assert_eq!(cart.total_quantity(), 6);
        assert_eq!(cart.total(), Money::from_cents(5500));
    }

    #[test]
    fn add_rejects_zero_quantity() {
        let mut cart = Cart::new(UserId::new(1));
        let result = cart.add_item(line(1, 0, 100));
        assert_eq!(result, Err(CartError::InvalidQuantity { quantity: 0 }));
        assert!(cart.is_empty());
    }

    #[test]
    fn add_rejects_overflowing_merge() {
        let mut cart = Cart::new(UserId::new(1));
        cart.add_item(line(1, u32::MAX, 1)).unwrap();
        let result = cart.add_item(line(1, 1, 1));
        assert!(matches!(result, Err(CartError::InvalidQuantity { .. })));
        assert_eq!(cart.total_quantity(), u64::from(u32::MAX));
    }

    #[test]
    fn update_quantity_to_zero_removes_line() {
        let mut cart = Cart::new(UserId::new(1));
        cart.add_item(line(1, 2, 100)).unwrap();
        cart.add_item(line(2, 2, 100)).unwrap();

        cart.update_quantity(ProductId::new(1), 0).unwrap();
        cart.update_quantity(ProductId::new(2), 7).unwrap();
        cart.update_quantity(ProductId::new(5), -1).unwrap();

        assert!(cart.item(ProductId::new(1)).is_none());
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item(ProductId::new(2)).unwrap().quantity, 7);
    }

    #[test]
    fn update_quantity_of_missing_line() {
        let mut cart = Cart::new(UserId::new(1));
        let result = cart.update_quantity(ProductId::new(3), 1);
        assert_eq!(
            result,
            Err(CartError::ItemNotFound {
                product_id: ProductId::new(3)
            })
        );
    }

    #[test]
    fn remove_absent_item_is_noop() {
        let mut cart = Cart::new(UserId::new(1));
        cart.add_item(line(1, 1, 100)).unwrap();
        assert!(cart.remove_item(ProductId::new(2)).is_none());
        assert_eq!(cart.items().len(), 1);
    }

    #[test]
    fn subtract_keeps_units_added_later() {
        let mut cart = Cart::new(UserId::new(1));
        cart.add_item(line(1, 5, 100)).unwrap();
        cart.add_item(line(2, 1, 100)).unwrap();
        cart.add_item(line(3, 1, 100)).unwrap();

        cart.subtract([(ProductId::new(1), 2), (ProductId::new(2), 1), (ProductId::new(9), 4)]);

        assert_eq!(cart.item(ProductId::new(1)).unwrap().quantity, 3);
        assert!(cart.item(ProductId::new(2)).is_none());
        assert_eq!(cart.item(ProductId::new(3)).unwrap().quantity, 1);
    }
}
