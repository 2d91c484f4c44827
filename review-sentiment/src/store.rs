use crate::traits::RecordStore;
use crate::types::{LabeledRecord, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<LabeledRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn reset(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn append(&self, records: &[LabeledRecord]) -> Result<usize> {
        let mut stored = self.records.write().await;
        stored.extend_from_slice(records);
        Ok(stored.len())
    }

    async fn load(&self) -> Result<Vec<LabeledRecord>> {
        Ok(self.records.read().await.clone())
    }
}

/// Records kept as a JSON array in a single file. Reads and writes go through
/// one async mutex; writes land in a sibling temp file that is then renamed
/// over the original.
pub struct JsonFileRecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<LabeledRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &[LabeledRecord]) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn reset(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_all(&[]).await?;
        info!("Reset record store at {}", self.path.display());
        Ok(())
    }

    async fn append(&self, records: &[LabeledRecord]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.extend_from_slice(records);
        self.write_all(&all).await?;
        debug!("Stored {} new records. Total: {}", records.len(), all.len());
        Ok(all.len())
    }

    async fn load(&self) -> Result<Vec<LabeledRecord>> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }
}
