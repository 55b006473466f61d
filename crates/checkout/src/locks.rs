//! Per-product mutual exclusion.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use common::ProductId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{Instant, timeout_at};

use crate::error::{CheckoutError, Result};

/// One async mutex per product, created on first use.
///
/// Multi-product operations lock in ascending product id order, so two
/// operations over overlapping sets can never wait on each other in a cycle.
#[derive(Debug, Default)]
pub struct ProductLocks {
    locks: Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>,
}

/// Guards for a set of product locks; dropping it unlocks them all.
#[derive(Debug)]
pub struct LockSet {
    products: Vec<ProductId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    /// Locked product ids in acquisition order.
    pub fn products(&self) -> &[ProductId] {
        &self.products
    }
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, product_id: ProductId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(product_id).or_default().clone()
    }

    /// Locks every distinct product in `products`, all before `deadline`.
    ///
    /// On timeout the locks taken so far are released and a
    /// `ConcurrencyConflict` is returned.
    pub async fn acquire(
        &self,
        products: impl IntoIterator<Item = ProductId>,
        deadline: Instant,
    ) -> Result<LockSet> {
        let ordered: BTreeSet<ProductId> = products.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());

        for &product_id in &ordered {
            match timeout_at(deadline, self.lock_for(product_id).lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    metrics::counter!("ledger_lock_timeouts_total").increment(1);
                    tracing::warn!(%product_id, "timed out waiting for product lock");
                    return Err(CheckoutError::ConcurrencyConflict(format!(
                        "timed out waiting for the lock on product {product_id}"
                    )));
                }
            }
        }

        Ok(LockSet {
            products: ordered.into_iter().collect(),
            _guards: guards,
        })
    }
}
