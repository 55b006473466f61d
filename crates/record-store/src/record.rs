use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Named collection of records.
///
/// `Products`, `Carts` and `Orders` hold the storefront documents; the
/// remaining collections are bookkeeping owned by the checkout core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Products,
    Carts,
    Orders,
    /// Monotonic id counters, one record per sequence name.
    Sequences,
    /// Idempotency records keyed by checkout request token.
    Checkouts,
    /// Commit markers keyed by reservation id.
    Ledger,
    /// Committed orders whose lines still have to leave a user's cart.
    CartClears,
}

impl Collection {
    /// Every collection, in storage order.
    pub const ALL: [Collection; 7] = [
        Collection::Products,
        Collection::Carts,
        Collection::Orders,
        Collection::Sequences,
        Collection::Checkouts,
        Collection::Ledger,
        Collection::CartClears,
    ];

    /// Returns the collection name as stored by the durable backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Carts => "carts",
            Collection::Orders => "orders",
            Collection::Sequences => "sequences",
            Collection::Checkouts => "checkouts",
            Collection::Ledger => "ledger",
            Collection::CartClears => "cart_clears",
        }
    }

    /// Parses a stored collection name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a single record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub collection: Collection,
    pub id: String,
}

impl RecordKey {
    /// Creates a key for `id` inside `collection`.
    pub fn new(collection: Collection, id: impl ToString) -> Self {
        Self {
            collection,
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Version number of a record, used for optimistic concurrency control.
///
/// An absent record is at version 0; the first write produces version 1 and
/// every later write increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a record that does not exist.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version produced by the first write.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored JSON document together with its concurrency metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub key: RecordKey,
    pub version: Version,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Deserializes the document into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    /// Deserializes the document and pairs it with the record version.
    pub fn into_versioned<T: DeserializeOwned>(self) -> Result<Versioned<T>> {
        Ok(Versioned {
            value: serde_json::from_value(self.value)?,
            version: self.version,
        })
    }
}

/// A typed document read from the store, carrying the version it was read at.
///
/// Pass `version` back as `Precondition::Version` to make the next write
/// conditional on nobody else having written in between.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(Collection::parse(collection.as_str()), Some(collection));
        }
        assert_eq!(Collection::parse("events"), None);
    }

    #[test]
    fn record_key_display() {
        let key = RecordKey::new(Collection::CartClears, 7);
        assert_eq!(key.to_string(), "cart_clears/7");
    }

    #[test]
    fn version_progression() {
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::new(3) > Version::first());
    }

    #[test]
    fn record_decodes_typed_value() {
        let record = Record {
            key: RecordKey::new(Collection::Sequences, "orders"),
            version: Version::new(4),
            value: serde_json::json!({ "next": 12 }),
            updated_at: Utc::now(),
        };

        #[derive(Deserialize)]
        struct Sequence {
            next: u64,
        }

        let versioned: Versioned<Sequence> = record.into_versioned().unwrap();
        assert_eq!(versioned.value.next, 12);
        assert_eq!(versioned.version, Version::new(4));
    }
}
