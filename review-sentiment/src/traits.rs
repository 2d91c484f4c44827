use crate::types::{LabeledRecord, Prediction, Result};
use async_trait::async_trait;

/// Remote (or local) sentiment classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> String;

    /// Classify a chunk of texts. The returned predictions are positionally
    /// aligned with `texts`.
    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>>;
}

/// Durable home of the accumulated records for one session.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Drop everything. Called once when a session starts.
    async fn reset(&self) -> Result<()>;

    /// Append in one read-then-write transaction; returns the new total.
    async fn append(&self, records: &[LabeledRecord]) -> Result<usize>;

    async fn load(&self) -> Result<Vec<LabeledRecord>>;
}

/// Forwards a run's records to the remote aggregation service.
#[async_trait]
pub trait Ingestor: Send + Sync {
    /// Returns how many records the service reports as stored.
    async fn ingest(&self, subject_id: &str, title: &str, records: &[LabeledRecord]) -> Result<usize>;
}
