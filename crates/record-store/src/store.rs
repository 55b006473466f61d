use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Collection, Record, RecordKey, RecordStoreError, Result, Version, Versioned};

/// Condition a record must satisfy for a write to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precondition {
    /// No check is performed (use with caution).
    #[default]
    Any,
    /// The record must not exist yet.
    Absent,
    /// The record must currently be at exactly this version.
    Version(Version),
}

impl Precondition {
    /// Checks the condition against the current version of `key`.
    ///
    /// `current` is `Version::initial()` when the record is absent.
    pub fn check(&self, key: &RecordKey, current: Version) -> Result<()> {
        let satisfied = match self {
            Precondition::Any => true,
            Precondition::Absent => current == Version::initial(),
            Precondition::Version(expected) => *expected == current,
        };

        if satisfied {
            Ok(())
        } else {
            Err(RecordStoreError::ConcurrencyConflict {
                key: key.clone(),
                expected: *self,
                actual: current,
            })
        }
    }
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precondition::Any => f.write_str("any version"),
            Precondition::Absent => f.write_str("no record"),
            Precondition::Version(v) => write!(f, "version {v}"),
        }
    }
}

/// A single conditional write inside a batch.
///
/// A `value` of `None` deletes the record.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub key: RecordKey,
    pub precondition: Precondition,
    pub value: Option<serde_json::Value>,
}

impl WriteOp {
    /// Unconditional upsert.
    pub fn put(key: RecordKey, value: serde_json::Value) -> Self {
        Self {
            key,
            precondition: Precondition::Any,
            value: Some(value),
        }
    }

    /// Creates the record, failing if it already exists.
    pub fn insert(key: RecordKey, value: serde_json::Value) -> Self {
        Self {
            key,
            precondition: Precondition::Absent,
            value: Some(value),
        }
    }

    /// Replaces the record only if it is still at `expected`.
    pub fn update(key: RecordKey, expected: Version, value: serde_json::Value) -> Self {
        Self {
            key,
            precondition: Precondition::Version(expected),
            value: Some(value),
        }
    }

    /// Deletes the record only if it is still at `expected`.
    pub fn delete(key: RecordKey, expected: Version) -> Self {
        Self {
            key,
            precondition: Precondition::Version(expected),
            value: None,
        }
    }

    /// Writes `value` conditionally: an insert when `expected` is the
    /// initial version, an update otherwise.
    pub fn upsert_as<T: Serialize>(key: RecordKey, expected: Version, value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)?;
        Ok(if expected == Version::initial() {
            Self::insert(key, json)
        } else {
            Self::update(key, expected, json)
        })
    }
}

/// Core trait for record store implementations.
///
/// A record store persists JSON documents under `(collection, id)` keys and
/// gives every write a new version. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads a single record. Returns None if it does not exist.
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Lists every record of a collection, ordered by id.
    async fn list(&self, collection: Collection) -> Result<Vec<Record>>;

    /// Applies a batch of writes atomically.
    ///
    /// Every precondition is checked before anything is written; if any
    /// fails the batch is rejected with `ConcurrencyConflict` and no record
    /// changes. Returns the new version of each written record, in batch
    /// order (`Version::initial()` for deletes).
    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<Vec<Version>>;

    /// Unconditionally writes a single record.
    async fn put(&self, key: RecordKey, value: serde_json::Value) -> Result<Version> {
        self.compare_and_swap(key, Precondition::Any, Some(value))
            .await
    }

    /// Writes (or deletes, with `None`) a single record if `expected` holds.
    async fn compare_and_swap(
        &self,
        key: RecordKey,
        expected: Precondition,
        value: Option<serde_json::Value>,
    ) -> Result<Version> {
        let versions = self
            .write_batch(vec![WriteOp {
                key,
                precondition: expected,
                value,
            }])
            .await?;
        Ok(versions.into_iter().next().unwrap_or_default())
    }
}

/// Extension trait providing typed convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Reads and deserializes a record.
    async fn get_as<T>(&self, key: &RecordKey) -> Result<Option<Versioned<T>>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(record) => Ok(Some(record.into_versioned()?)),
            None => Ok(None),
        }
    }

    /// Reads and deserializes every record of a collection.
    async fn list_as<T>(&self, collection: Collection) -> Result<Vec<Versioned<T>>>
    where
        T: DeserializeOwned + Send,
    {
        self.list(collection)
            .await?
            .into_iter()
            .map(Record::into_versioned)
            .collect()
    }

    /// Serializes and unconditionally writes a record.
    async fn put_as<T>(&self, key: RecordKey, value: &T) -> Result<Version>
    where
        T: Serialize + Sync,
    {
        let json = serde_json::to_value(value)?;
        self.put(key, json).await
    }

    /// Serializes and creates a record, failing if it already exists.
    async fn insert_as<T>(&self, key: RecordKey, value: &T) -> Result<Version>
    where
        T: Serialize + Sync,
    {
        let json = serde_json::to_value(value)?;
        self.compare_and_swap(key, Precondition::Absent, Some(json))
            .await
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}

/// Validates a batch before it is applied.
pub fn validate_batch(ops: &[WriteOp]) -> Result<()> {
    if ops.is_empty() {
        return Err(RecordStoreError::InvalidBatch(
            "Cannot apply an empty write batch".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(ops.len());
    for op in ops {
        if !seen.insert(&op.key) {
            return Err(RecordStoreError::InvalidBatch(format!(
                "Key {} is written more than once",
                op.key
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> RecordKey {
        RecordKey::new(Collection::Products, id)
    }

    #[test]
    fn precondition_any_always_holds() {
        assert!(Precondition::Any.check(&key("1"), Version::new(9)).is_ok());
        assert!(Precondition::Any.check(&key("1"), Version::initial()).is_ok());
    }

    #[test]
    fn precondition_absent_requires_missing_record() {
        assert!(Precondition::Absent.check(&key("1"), Version::initial()).is_ok());
        let err = Precondition::Absent
            .check(&key("1"), Version::first())
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn precondition_version_requires_exact_match() {
        let expected = Precondition::Version(Version::new(3));
        assert!(expected.check(&key("1"), Version::new(3)).is_ok());
        assert!(expected.check(&key("1"), Version::new(4)).is_err());
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            validate_batch(&[]),
            Err(RecordStoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let ops = vec![
            WriteOp::put(key("1"), serde_json::json!(1)),
            WriteOp::put(key("1"), serde_json::json!(2)),
        ];
        assert!(matches!(
            validate_batch(&ops),
            Err(RecordStoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn upsert_as_picks_insert_for_new_records() {
        let op = WriteOp::upsert_as(key("1"), Version::initial(), &5).unwrap();
        assert_eq!(op.precondition, Precondition::Absent);

        let op = WriteOp::upsert_as(key("1"), Version::new(2), &5).unwrap();
        assert_eq!(op.precondition, Precondition::Version(Version::new(2)));
    }
}
