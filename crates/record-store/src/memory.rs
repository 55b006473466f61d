use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::table::RecordTable;
use crate::{
    Collection, Record, RecordKey, RecordStoreError, Result, Version,
    store::{RecordStore, WriteOp},
};

#[derive(Debug, Default)]
struct MemoryState {
    table: RecordTable,
    /// Remaining number of batches to reject, per collection.
    write_faults: HashMap<Collection, u32>,
}

/// In-memory record store implementation for testing.
///
/// This implementation keeps all records in memory and provides the same
/// interface as the durable stores. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.table.len()
    }

    /// Clears all records and pending faults.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.table = RecordTable::default();
        state.write_faults.clear();
    }

    /// Makes the next `times` batches touching `collection` fail with
    /// `Unavailable`, simulating transient I/O errors.
    pub async fn fail_writes(&self, collection: Collection, times: u32) {
        self.state
            .write()
            .await
            .write_faults
            .insert(collection, times);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        Ok(self.state.read().await.table.get(key).cloned())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Record>> {
        Ok(self.state.read().await.table.list(collection))
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<Vec<Version>> {
        let mut state = self.state.write().await;

        for op in &ops {
            let collection = op.key.collection;
            if let Some(remaining) = state.write_faults.get_mut(&collection)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(RecordStoreError::Unavailable { collection });
            }
        }

        state.table.apply(ops, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Precondition, RecordStoreExt};

    fn product_key(id: u64) -> RecordKey {
        RecordKey::new(Collection::Products, id)
    }

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryRecordStore::new();
        let key = product_key(1);

        let version = store
            .put(key.clone(), serde_json::json!({ "stock": 3 }))
            .await
            .unwrap();
        assert_eq!(version, Version::first());

        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.version, Version::first());
        assert_eq!(record.value["stock"], 3);
    }

    #[tokio::test]
    async fn get_missing_record() {
        let store = InMemoryRecordStore::new();
        assert!(store.get(&product_key(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn compare_and_swap_success() {
        let store = InMemoryRecordStore::new();
        let key = product_key(1);
        store.put(key.clone(), serde_json::json!(1)).await.unwrap();

        let version = store
            .compare_and_swap(
                key.clone(),
                Precondition::Version(Version::first()),
                Some(serde_json::json!(2)),
            )
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(store.get(&key).await.unwrap().unwrap().value, 2);
    }

    #[tokio::test]
    async fn concurrency_conflict_on_wrong_version() {
        let store = InMemoryRecordStore::new();
        let key = product_key(1);
        store.put(key.clone(), serde_json::json!(1)).await.unwrap();
        store.put(key.clone(), serde_json::json!(2)).await.unwrap();

        let result = store
            .compare_and_swap(
                key.clone(),
                Precondition::Version(Version::first()),
                Some(serde_json::json!(3)),
            )
            .await;

        assert!(matches!(
            result,
            Err(RecordStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(2)
        ));
        assert_eq!(store.get(&key).await.unwrap().unwrap().value, 2);
    }

    #[tokio::test]
    async fn insert_conflicts_when_record_exists() {
        let store = InMemoryRecordStore::new();
        let key = RecordKey::new(Collection::Checkouts, "token");

        store.insert_as(key.clone(), &1u64).await.unwrap();
        let result = store.insert_as(key, &2u64).await;

        assert!(matches!(
            result,
            Err(RecordStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = InMemoryRecordStore::new();
        store.put(product_key(1), serde_json::json!(1)).await.unwrap();

        let result = store
            .write_batch(vec![
                WriteOp::put(product_key(2), serde_json::json!(2)),
                WriteOp::update(product_key(1), Version::new(7), serde_json::json!(9)),
            ])
            .await;

        assert!(result.is_err());
        assert!(store.get(&product_key(2)).await.unwrap().is_none());
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn list_returns_only_requested_collection() {
        let store = InMemoryRecordStore::new();
        store.put_as(product_key(1), &"a").await.unwrap();
        store.put_as(product_key(2), &"b").await.unwrap();
        store
            .put_as(RecordKey::new(Collection::Orders, 1), &"order")
            .await
            .unwrap();

        let products: Vec<crate::Versioned<String>> =
            store.list_as(Collection::Products).await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].value, "a");
    }

    #[tokio::test]
    async fn injected_faults_expire() {
        let store = InMemoryRecordStore::new();
        store.fail_writes(Collection::Carts, 2).await;
        let key = RecordKey::new(Collection::Carts, 1);

        for _ in 0..2 {
            let result = store.put(key.clone(), serde_json::json!([])).await;
            assert!(matches!(
                result,
                Err(RecordStoreError::Unavailable {
                    collection: Collection::Carts
                })
            ));
        }

        assert!(store.put(key, serde_json::json!([])).await.is_ok());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = InMemoryRecordStore::new();
        store.put(product_key(1), serde_json::json!(1)).await.unwrap();
        store.clear().await;
        assert_eq!(store.record_count().await, 0);
    }
}
