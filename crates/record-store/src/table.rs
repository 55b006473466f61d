//! Versioned record table shared by the in-memory and file-backed stores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::store::{WriteOp, validate_batch};
use crate::{Collection, Record, RecordKey, Result, Version};

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordTable {
    records: BTreeMap<RecordKey, Record>,
}

impl RecordTable {
    pub(crate) fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect(),
        }
    }

    pub(crate) fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub(crate) fn list(&self, collection: Collection) -> Vec<Record> {
        self.records
            .values()
            .filter(|record| record.key.collection == collection)
            .cloned()
            .collect()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    fn version_of(&self, key: &RecordKey) -> Version {
        self.records
            .get(key)
            .map(|record| record.version)
            .unwrap_or_default()
    }

    /// Checks every precondition, then applies every write.
    ///
    /// On error the table is untouched.
    pub(crate) fn apply(&mut self, ops: Vec<WriteOp>, now: DateTime<Utc>) -> Result<Vec<Version>> {
        validate_batch(&ops)?;

        for op in &ops {
            op.precondition.check(&op.key, self.version_of(&op.key))?;
        }

        let mut versions = Vec::with_capacity(ops.len());
        for op in ops {
            match op.value {
                Some(value) => {
                    let version = self.version_of(&op.key).next();
                    self.records.insert(
                        op.key.clone(),
                        Record {
                            key: op.key,
                            version,
                            value,
                            updated_at: now,
                        },
                    );
                    versions.push(version);
                }
                None => {
                    self.records.remove(&op.key);
                    versions.push(Version::initial());
                }
            }
        }

        Ok(versions)
    }
}
