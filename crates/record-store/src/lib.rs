//! Keyed, versioned document storage for the storefront.
//!
//! Every record lives under a `(collection, id)` key and carries a version
//! that increments on each write. Writes can be made conditional on that
//! version, and `write_batch` applies several conditional writes as one
//! atomic unit. Three backends share the `RecordStore` trait: in-memory
//! (tests and the default binary), a flat JSON file, and PostgreSQL.

pub mod error;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;
mod table;

pub use error::{RecordStoreError, Result};
pub use file::JsonFileRecordStore;
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use record::{Collection, Record, RecordKey, Version, Versioned};
pub use store::{Precondition, RecordStore, RecordStoreExt, WriteOp};
