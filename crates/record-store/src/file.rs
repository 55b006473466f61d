use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::table::RecordTable;
use crate::{
    Collection, Record, RecordKey, Result, Version,
    store::{RecordStore, WriteOp},
};

/// On-disk layout of the store: every record of every collection.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FileImage {
    records: Vec<Record>,
}

/// Flat-file record store.
///
/// The whole store is a single JSON document. It is loaded once when the
/// store is opened and rewritten after every successful batch, first to a
/// sibling temp file which is then renamed over the original, so a crash
/// never leaves a half-written database behind. Writers are serialized by
/// the table lock; a batch whose file write fails is not applied in memory.
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    path: Arc<PathBuf>,
    table: Arc<RwLock<RecordTable>>,
}

impl JsonFileRecordStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let image = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => FileImage::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    tokio::fs::create_dir_all(parent).await?;
                }
                FileImage::default()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(records = image.records.len(), "opened record file");

        Ok(Self {
            path: Arc::new(path),
            table: Arc::new(RwLock::new(RecordTable::from_records(image.records))),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &RecordTable) -> Result<()> {
        let image = FileImage {
            records: table.records().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&image)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.path.as_ref()).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        Ok(self.table.read().await.get(key).cloned())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Record>> {
        Ok(self.table.read().await.list(collection))
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<Vec<Version>> {
        let mut table = self.table.write().await;

        let mut next = table.clone();
        let versions = next.apply(ops, Utc::now())?;

        if let Err(e) = self.persist(&next).await {
            tracing::error!(error = %e, path = %self.path.display(), "failed to persist record file");
            return Err(e);
        }

        *table = next;
        Ok(versions)
    }
}
