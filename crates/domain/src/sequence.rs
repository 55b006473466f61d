//! Monotonic id sequences persisted in the record store.

use record_store::{Collection, RecordKey, RecordStore, RecordStoreExt, Version, WriteOp};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SequenceState {
    next: u64,
}

/// A claimed, not yet written, sequence value.
///
/// The id is only taken once `op` has been applied; include it in the same
/// batch as the record that uses the id so a lost race retries cleanly.
#[derive(Debug, Clone)]
pub struct SequenceClaim {
    pub id: u64,
    pub op: WriteOp,
}

/// Named id sequence. Ids start at 1 and never repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence(&'static str);

impl Sequence {
    pub const ORDERS: Sequence = Sequence("orders");
    pub const PRODUCTS: Sequence = Sequence("products");

    fn key(&self) -> RecordKey {
        RecordKey::new(Collection::Sequences, self.0)
    }

    /// Reads the next id and returns the write that would consume it.
    pub async fn claim<S>(&self, store: &S) -> Result<SequenceClaim, DomainError>
    where
        S: RecordStore + ?Sized,
    {
        let current = store.get_as::<SequenceState>(&self.key()).await?;
        let (id, version) = match current {
            Some(state) => (state.value.next, state.version),
            None => (1, Version::initial()),
        };

        let op = WriteOp::upsert_as(self.key(), version, &SequenceState { next: id + 1 })?;
        Ok(SequenceClaim { id, op })
    }

    /// Claims and immediately consumes the next id, retrying lost races.
    pub async fn next<S>(&self, store: &S) -> Result<u64, DomainError>
    where
        S: RecordStore + ?Sized,
    {
        loop {
            let claim = self.claim(store).await?;
            match store.write_batch(vec![claim.op]).await {
                Ok(_) => return Ok(claim.id),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
