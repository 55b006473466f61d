//! Catalog products and the catalog service.

use common::ProductId;
use record_store::{Collection, RecordKey, RecordStore, RecordStoreExt, Version, WriteOp};
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::error::DomainError;
use crate::sequence::Sequence;

/// Image used when a product is registered without one.
pub const PLACEHOLDER_IMAGE: &str = "https://placehold.co/400x400";

/// A catalog product.
///
/// `stock` is the only field contended by concurrent checkouts; it is
/// unsigned so it can never be stored below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    pub description: String,
    pub image: String,
}

impl Product {
    /// Record key of the product document.
    pub fn key(id: ProductId) -> RecordKey {
        RecordKey::new(Collection::Products, id)
    }
}

/// Fields supplied when registering a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub stock: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl NewProduct {
    /// Creates a product description with the required fields.
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            name: name.into(),
            price,
            stock,
            ..Self::default()
        }
    }

    /// Sets the category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidProduct(
                "name must not be empty".to_string(),
            ));
        }
        if self.price.is_negative() {
            return Err(DomainError::InvalidProduct(format!(
                "price must not be negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// Read access to the product catalog, plus registration used for seeding.
///
/// Stock is never written here; only the inventory ledger decrements it.
#[derive(Debug, Clone)]
pub struct Catalog<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> Catalog<S> {
    /// Creates a catalog over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads a product. Returns None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, DomainError> {
        Ok(self
            .store
            .get_as::<Product>(&Product::key(id))
            .await?
            .map(|p| p.value))
    }

    /// Lists every product ordered by id.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, DomainError> {
        let mut products: Vec<Product> = self
            .store
            .list_as::<Product>(Collection::Products)
            .await?
            .into_iter()
            .map(|p| p.value)
            .collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    /// Registers a new product under the next product id.
    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn register_product(&self, new: NewProduct) -> Result<Product, DomainError> {
        new.validate()?;

        loop {
            let claim = Sequence::PRODUCTS.claim(&self.store).await?;
            let product = Product {
                id: ProductId::new(claim.id),
                name: new.name.clone(),
                price: new.price,
                stock: new.stock,
                category: new.category.clone(),
                description: new.description.clone(),
                image: new
                    .image
                    .clone()
                    .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            };

            let ops = vec![
                claim.op,
                WriteOp::upsert_as(Product::key(product.id), Version::initial(), &product)?,
            ];
            match self.store.write_batch(ops).await {
                Ok(_) => {
                    tracing::info!(product_id = %product.id, stock = product.stock, "product registered");
                    return Ok(product);
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_store::InMemoryRecordStore;

    #[tokio::test]
    async fn register_assigns_sequential_ids() {
        let catalog = Catalog::new(InMemoryRecordStore::new());

        let a = catalog
            .register_product(NewProduct::new("Widget", Money::from_cents(1000), 5))
            .await
            .unwrap();
        let b = catalog
            .register_product(NewProduct::new("Gadget", Money::from_cents(500), 1))
            .await
            .unwrap();

        assert_eq!(a.id, ProductId::new(1));
        assert_eq!(b.id, ProductId::new(2));
        assert_eq!(a.image, PLACEHOLDER_IMAGE);
    }

    #[tokio::test]
    async fn get_and_list_products() {
        let catalog = Catalog::new(InMemoryRecordStore::new());
        for name in ["a", "b", "c"] {
            catalog
                .register_product(NewProduct::new(name, Money::from_cents(1), 1))
                .await
                .unwrap();
        }

        let product = catalog.get_product(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(product.name, "b");
        assert!(catalog.get_product(ProductId::new(9)).await.unwrap().is_none());

        let names: Vec<_> = catalog
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn rejects_negative_price_and_blank_name() {
        let catalog = Catalog::new(InMemoryRecordStore::new());

        let negative = catalog
            .register_product(NewProduct::new("Widget", Money::from_cents(-1), 1))
            .await;
        assert!(matches!(negative, Err(DomainError::InvalidProduct(_))));

        let blank = catalog
            .register_product(NewProduct::new("  ", Money::from_cents(1), 1))
            .await;
        assert!(matches!(blank, Err(DomainError::InvalidProduct(_))));
    }
}
