//! Inventory ledger: all-or-nothing stock reservations.
//!
//! A reservation is an in-process hold on stock. Holds are subtracted from
//! the stored stock when answering availability, so two reservations can
//! never both count the same units. `commit` turns a hold into a durable
//! decrement; `release` drops it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::ProductId;
use domain::Product;
use record_store::{Collection, RecordKey, RecordStore, RecordStoreExt, Version, WriteOp};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{CheckoutError, Result, Shortfall};
use crate::locks::ProductLocks;

/// Quantity of one product held by a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A successful hold on stock for a set of products.
///
/// Items are merged per product and sorted by product id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    id: Uuid,
    items: Vec<ReservedItem>,
}

impl Reservation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn items(&self) -> &[ReservedItem] {
        &self.items
    }

    fn marker_key(&self) -> RecordKey {
        RecordKey::new(Collection::Ledger, self.id)
    }
}

/// Durable proof that a reservation's stock was decremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    reservation_id: Uuid,
    items: Vec<ReservedItem>,
    committed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Holds {
    by_product: HashMap<ProductId, u32>,
    outstanding: HashMap<Uuid, Vec<ReservedItem>>,
}

impl Holds {
    fn held(&self, product_id: ProductId) -> u32 {
        self.by_product.get(&product_id).copied().unwrap_or(0)
    }

    fn hold(&mut self, reservation: &Reservation) {
        for item in &reservation.items {
            *self.by_product.entry(item.product_id).or_insert(0) += item.quantity;
        }
        self.outstanding
            .insert(reservation.id, reservation.items.clone());
    }

    /// Drops a hold. Returns false if it was not outstanding.
    fn drop_hold(&mut self, id: Uuid) -> bool {
        let Some(items) = self.outstanding.remove(&id) else {
            return false;
        };
        for item in items {
            if let Some(held) = self.by_product.get_mut(&item.product_id) {
                *held = held.saturating_sub(item.quantity);
                if *held == 0 {
                    self.by_product.remove(&item.product_id);
                }
            }
        }
        true
    }
}

/// Tracks stock holds and applies committed decrements to product records.
///
/// Clones share holds and locks.
#[derive(Debug, Clone)]
pub struct InventoryLedger<S: RecordStore> {
    store: S,
    locks: Arc<ProductLocks>,
    holds: Arc<Mutex<Holds>>,
    lock_timeout: Duration,
}

impl<S: RecordStore> InventoryLedger<S> {
    /// Creates a ledger over the given store.
    pub fn new(store: S, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks: Arc::new(ProductLocks::new()),
            holds: Arc::new(Mutex::new(Holds::default())),
            lock_timeout,
        }
    }

    /// The product locks this ledger serialises on.
    pub fn locks(&self) -> &ProductLocks {
        &self.locks
    }

    fn holds(&self) -> std::sync::MutexGuard<'_, Holds> {
        self.holds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Units of a product currently held by uncommitted reservations.
    pub fn held(&self, product_id: ProductId) -> u32 {
        self.holds().held(product_id)
    }

    /// Number of reservations neither committed nor released.
    pub fn outstanding(&self) -> usize {
        self.holds().outstanding.len()
    }

    async fn load_product(&self, product_id: ProductId) -> Result<(Product, Version)> {
        let stored = self
            .store
            .get_as::<Product>(&Product::key(product_id))
            .await?
            .ok_or(CheckoutError::NotFound { product_id })?;
        Ok((stored.value, stored.version))
    }

    /// Returns true if `quantity` units of a product are free to reserve.
    pub async fn check_available(&self, product_id: ProductId, quantity: u32) -> Result<bool> {
        let (product, _) = self.load_product(product_id).await?;
        let available = product.stock.saturating_sub(self.held(product_id));
        Ok(available >= quantity)
    }

    /// Holds stock for every item, or for none of them.
    ///
    /// Quantities of repeated products are summed. On shortfall nothing is
    /// held and every short line is reported.
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn reserve_all(&self, items: &[(ProductId, u32)]) -> Result<Reservation> {
        let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
        for &(product_id, quantity) in items {
            if quantity == 0 {
                return Err(CheckoutError::Validation(format!(
                    "quantity for product {product_id} must be at least 1"
                )));
            }
            let total = merged.entry(product_id).or_insert(0);
            *total = total.checked_add(quantity).ok_or_else(|| {
                CheckoutError::Validation(format!("quantity for product {product_id} overflows"))
            })?;
        }
        if merged.is_empty() {
            return Err(CheckoutError::Validation(
                "nothing to reserve".to_string(),
            ));
        }

        let deadline = Instant::now() + self.lock_timeout;
        let _locks = self.locks.acquire(merged.keys().copied(), deadline).await?;

        let mut shortfalls = Vec::new();
        for (&product_id, &requested) in &merged {
            let (product, _) = self.load_product(product_id).await?;
            let available = product.stock.saturating_sub(self.held(product_id));
            if requested > available {
                shortfalls.push(Shortfall {
                    product_id,
                    requested,
                    available,
                });
            }
        }
        if !shortfalls.is_empty() {
            tracing::info!(short = shortfalls.len(), "reservation rejected");
            return Err(CheckoutError::InsufficientStock(shortfalls));
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            items: merged
                .into_iter()
                .map(|(product_id, quantity)| ReservedItem {
                    product_id,
                    quantity,
                })
                .collect(),
        };
        self.holds().hold(&reservation);
        tracing::debug!(reservation_id = %reservation.id, "stock reserved");
        Ok(reservation)
    }

    /// Durably decrements stock for a reservation.
    ///
    /// All decrements and the ledger marker are written in one batch,
    /// conditional on each product's version. Committing the same
    /// reservation again is a no-op.
    pub async fn commit(&self, reservation: &Reservation) -> Result<()> {
        self.commit_with(reservation, Vec::new()).await
    }

    /// Like [`commit`](Self::commit), with `extra` writes in the same batch.
    ///
    /// Either the decrements and every extra write land together or none
    /// of them do; on failure the hold stays in place. Extra writes are not
    /// applied when the reservation was already committed.
    #[tracing::instrument(
        skip(self, reservation, extra),
        fields(reservation_id = %reservation.id, extra = extra.len())
    )]
    pub async fn commit_with(&self, reservation: &Reservation, extra: Vec<WriteOp>) -> Result<()> {
        let deadline = Instant::now() + self.lock_timeout;
        let _locks = self
            .locks
            .acquire(reservation.items.iter().map(|i| i.product_id), deadline)
            .await?;

        if self.store.get(&reservation.marker_key()).await?.is_some() {
            self.holds().drop_hold(reservation.id);
            tracing::debug!("reservation already committed");
            return Ok(());
        }
        if !self.holds().outstanding.contains_key(&reservation.id) {
            return Err(CheckoutError::Validation(format!(
                "reservation {} is not held",
                reservation.id
            )));
        }

        let mut ops = Vec::with_capacity(reservation.items.len() + 1 + extra.len());
        for item in &reservation.items {
            let (mut product, version) = self.load_product(item.product_id).await?;
            product.stock = product.stock.checked_sub(item.quantity).ok_or_else(|| {
                CheckoutError::InsufficientStock(vec![Shortfall {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: product.stock,
                }])
            })?;
            ops.push(WriteOp::upsert_as(
                Product::key(item.product_id),
                version,
                &product,
            )?);
        }

        let entry = LedgerEntry {
            reservation_id: reservation.id,
            items: reservation.items.clone(),
            committed_at: Utc::now(),
        };
        ops.push(WriteOp::insert(
            reservation.marker_key(),
            serde_json::to_value(&entry).map_err(record_store::RecordStoreError::from)?,
        ));
        ops.extend(extra);

        self.store.write_batch(ops).await?;
        self.holds().drop_hold(reservation.id);
        tracing::info!(items = reservation.items.len(), "stock committed");
        Ok(())
    }

    /// Gives back a reservation's held stock.
    ///
    /// Returns false when there was nothing to release because the
    /// reservation was already committed or released.
    pub fn release(&self, reservation: &Reservation) -> bool {
        let released = self.holds().drop_hold(reservation.id);
        if released {
            tracing::debug!(reservation_id = %reservation.id, "reservation released");
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Catalog, Money, NewProduct};
    use record_store::InMemoryRecordStore;

    async fn ledger_with(stocks: &[u32]) -> (InMemoryRecordStore, InventoryLedger<InMemoryRecordStore>) {
        let store = InMemoryRecordStore::new();
        let catalog = Catalog::new(store.clone());
        for (i, &stock) in stocks.iter().enumerate() {
            catalog
                .register_product(NewProduct::new(format!("p{i}"), Money::from_cents(100), stock))
                .await
                .unwrap();
        }
        let ledger = InventoryLedger::new(store.clone(), Duration::from_secs(1));
        (store, ledger)
    }

    async fn stock(store: &InMemoryRecordStore, id: u64) -> u32 {
        store
            .get_as::<Product>(&Product::key(ProductId::new(id)))
            .await
            .unwrap()
            .unwrap()
            .value
            .stock
    }

    fn p(id: u64) -> ProductId {
        ProductId::new(id)
    }

    #[tokio::test]
    async fn reserve_holds_without_touching_stock() {
        let (store, ledger) = ledger_with(&[5]).await;

        let reservation = ledger.reserve_all(&[(p(1), 3)]).await.unwrap();

        assert_eq!(stock(&store, 1).await, 5);
        assert_eq!(ledger.held(p(1)), 3);
        assert!(ledger.check_available(p(1), 2).await.unwrap());
        assert!(!ledger.check_available(p(1), 3).await.unwrap());
        assert_eq!(reservation.items().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_products_are_summed() {
        let (_, ledger) = ledger_with(&[4]).await;

        let result = ledger.reserve_all(&[(p(1), 3), (p(1), 2)]).await;
        match result {
            Err(CheckoutError::InsufficientStock(short)) => {
                assert_eq!(
                    short,
                    vec![Shortfall {
                        product_id: p(1),
                        requested: 5,
                        available: 4
                    }]
                );
            }
            other => panic!("expected shortfall, got {other:?}"),
        }
        assert_eq!(ledger.held(p(1)), 0);
    }

    #[tokio::test]
    async fn shortfall_reports_every_line_and_holds_nothing() {
        let (_, ledger) = ledger_with(&[10, 1, 0]).await;

        let result = ledger
            .reserve_all(&[(p(1), 2), (p(2), 2), (p(3), 1)])
            .await;

        let Err(CheckoutError::InsufficientStock(short)) = result else {
            panic!("expected shortfall");
        };
        let ids: Vec<_> = short.iter().map(|s| s.product_id).collect();
        assert_eq!(ids, vec![p(2), p(3)]);
        assert_eq!(ledger.held(p(1)), 0);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (_, ledger) = ledger_with(&[1]).await;
        let result = ledger.reserve_all(&[(p(1), 1), (p(9), 1)]).await;
        assert!(matches!(
            result,
            Err(CheckoutError::NotFound { product_id }) if product_id == p(9)
        ));
        assert_eq!(ledger.held(p(1)), 0);
    }

    #[tokio::test]
    async fn commit_decrements_and_is_idempotent() {
        let (store, ledger) = ledger_with(&[5, 2]).await;
        let reservation = ledger.reserve_all(&[(p(1), 3), (p(2), 2)]).await.unwrap();

        ledger.commit(&reservation).await.unwrap();
        ledger.commit(&reservation).await.unwrap();

        assert_eq!(stock(&store, 1).await, 2);
        assert_eq!(stock(&store, 2).await, 0);
        assert_eq!(ledger.held(p(1)), 0);
        assert!(!ledger.release(&reservation));
    }

    #[tokio::test]
    async fn release_returns_stock_once() {
        let (store, ledger) = ledger_with(&[2]).await;
        let reservation = ledger.reserve_all(&[(p(1), 2)]).await.unwrap();
        assert!(!ledger.check_available(p(1), 1).await.unwrap());

        assert!(ledger.release(&reservation));
        assert!(!ledger.release(&reservation));

        assert!(ledger.check_available(p(1), 2).await.unwrap());
        assert_eq!(stock(&store, 1).await, 2);

        let result = ledger.commit(&reservation).await;
        assert!(matches!(result, Err(CheckoutError::Validation(_))));
        assert_eq!(stock(&store, 1).await, 2);
    }

    #[tokio::test]
    async fn failed_commit_keeps_hold() {
        let (store, ledger) = ledger_with(&[3]).await;
        let reservation = ledger.reserve_all(&[(p(1), 2)]).await.unwrap();

        store.fail_writes(Collection::Ledger, 1).await;
        let result = ledger.commit(&reservation).await;
        assert!(matches!(result, Err(CheckoutError::Persistence(_))));
        assert_eq!(stock(&store, 1).await, 3);
        assert_eq!(ledger.held(p(1)), 2);

        ledger.commit(&reservation).await.unwrap();
        assert_eq!(stock(&store, 1).await, 1);
    }

    #[tokio::test]
    async fn extra_writes_land_with_the_decrement() {
        let (store, ledger) = ledger_with(&[3]).await;
        let reservation = ledger.reserve_all(&[(p(1), 2)]).await.unwrap();
        let note = RecordKey::new(Collection::Orders, 7u64);
        let extra = || vec![WriteOp::insert(note.clone(), serde_json::json!({ "order": 7 }))];

        store.fail_writes(Collection::Ledger, 1).await;
        let result = ledger.commit_with(&reservation, extra()).await;
        assert!(matches!(result, Err(CheckoutError::Persistence(_))));
        assert!(store.get(&note).await.unwrap().is_none());
        assert_eq!(stock(&store, 1).await, 3);
        assert_eq!(ledger.held(p(1)), 2);

        ledger.commit_with(&reservation, extra()).await.unwrap();
        assert!(store.get(&note).await.unwrap().is_some());
        assert_eq!(stock(&store, 1).await, 1);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let (_, ledger) = ledger_with(&[3]).await;
        let result = ledger.reserve_all(&[(p(1), 0)]).await;
        assert!(matches!(result, Err(CheckoutError::Validation(_))));
        let result = ledger.reserve_all(&[]).await;
        assert!(matches!(result, Err(CheckoutError::Validation(_))));
    }
}
