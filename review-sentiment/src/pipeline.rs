use crate::batcher::Batcher;
use crate::dedup::FragmentLedger;
use crate::labeler::Labeler;
use crate::metadata::MetadataExtractor;
use crate::sink::{ResultSink, SinkOutcome};
use crate::traits::{Classifier, Ingestor, RecordStore};
use crate::types::{
    ChangeSignal, DocumentSource, Fragment, Highlighter, LabeledRecord, NoopHighlighter, PipelineConfig,
    Prediction, Result, SentimentError,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Discovering,
    Filtering,
    Batching,
    ClassifyingBatch,
    Labeling,
    Delay,
    Sinking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Candidate fragments the document returned.
    pub discovered: usize,
    /// Fragments this run claimed and labeled.
    pub fresh: usize,
    pub batches: usize,
    pub records: usize,
    pub degraded: usize,
    pub sink: Option<SinkOutcome>,
}

/// Drives discovery, dedup, batched classification, labeling and sinking.
///
/// Runs never overlap: `run_once` holds a guard for its whole duration, and
/// every fragment a run picks up is claimed in the ledger before it is
/// classified.
pub struct PipelineDriver {
    config: PipelineConfig,
    document: Arc<dyn DocumentSource>,
    classifier: Arc<dyn Classifier>,
    ledger: FragmentLedger,
    labeler: Labeler,
    batcher: Batcher,
    sink: ResultSink,
    run_guard: Mutex<()>,
    state: RwLock<PipelineState>,
}

impl PipelineDriver {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &FragmentLedger {
        &self.ledger
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.sink.store()
    }

    pub async fn state(&self) -> PipelineState {
        *self.state.read().await
    }

    async fn set_state(&self, state: PipelineState) {
        *self.state.write().await = state;
    }

    /// One discovery-to-sink pass. A record store failure is the only error:
    /// the run's fragments stay marked and their records are dropped.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let _guard = self.run_guard.lock().await;
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();

        let result = self.run_locked(run_id).await;
        self.set_state(PipelineState::Idle).await;

        match &result {
            Ok(summary) if summary.fresh > 0 => info!(
                "Run {} labeled {} fragments in {} batches ({} degraded) in {}ms",
                run_id,
                summary.records,
                summary.batches,
                summary.degraded,
                start_time.elapsed().as_millis()
            ),
            Ok(_) => debug!("Run {} found nothing new", run_id),
            Err(e) => error!("Run {} failed: {}", run_id, e),
        }
        result
    }

    async fn run_locked(&self, run_id: Uuid) -> Result<RunSummary> {
        self.set_state(PipelineState::Discovering).await;
        let discovered = self.document.discover();
        let discovered_count = discovered.len();
        let candidates: Vec<Fragment> = discovered
            .into_iter()
            .filter(|fragment| fragment.text.trim().chars().count() > self.config.min_text_len)
            .collect();

        self.set_state(PipelineState::Filtering).await;
        let fresh = self.ledger.claim(candidates).await;
        debug!(
            "Run {}: {} discovered, {} fresh",
            run_id,
            discovered_count,
            fresh.len()
        );

        let mut summary = RunSummary {
            run_id,
            discovered: discovered_count,
            fresh: fresh.len(),
            batches: 0,
            records: 0,
            degraded: 0,
            sink: None,
        };
        if fresh.is_empty() {
            return Ok(summary);
        }

        self.set_state(PipelineState::Batching).await;
        let batches = self.batcher.chunks(&fresh);
        summary.batches = batches.len();

        let mut records: Vec<LabeledRecord> = Vec::with_capacity(fresh.len());
        for (index, batch) in batches.iter().enumerate() {
            self.set_state(PipelineState::ClassifyingBatch).await;
            let predictions = self.classify_batch(run_id, index, batch).await;

            self.set_state(PipelineState::Labeling).await;
            for (fragment, prediction) in batch.iter().zip(predictions) {
                if prediction.is_degraded() {
                    summary.degraded += 1;
                }
                records.push(self.labeler.label(fragment, prediction).await);
            }

            if index + 1 < batches.len() {
                self.set_state(PipelineState::Delay).await;
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
        }
        summary.records = records.len();

        if !records.is_empty() {
            self.set_state(PipelineState::Sinking).await;
            let page = self.document.page();
            match self.sink.sink(&records, &page).await {
                Ok(outcome) => summary.sink = Some(outcome),
                Err(e) => {
                    // The fragments stay marked, so these records are not produced again.
                    let ids: Vec<&str> = fresh.iter().map(|f| f.id.as_str()).collect();
                    warn!(
                        "Run {}: failed to store {} records, dropping results for {:?}: {}",
                        run_id,
                        records.len(),
                        ids,
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(summary)
    }

    /// Always returns exactly one prediction per fragment in the batch.
    async fn classify_batch(&self, run_id: Uuid, index: usize, batch: &[Fragment]) -> Vec<Prediction> {
        let texts: Vec<String> = batch.iter().map(|f| f.text.trim().to_string()).collect();
        debug!(
            "Run {}: classifying batch {} ({} texts) with {}",
            run_id,
            index + 1,
            texts.len(),
            self.classifier.name()
        );

        let outcome = tokio::time::timeout(self.config.batch_timeout(), self.classifier.classify(&texts)).await;
        match outcome {
            Ok(Ok(predictions)) if predictions.len() == texts.len() => predictions,
            Ok(Ok(predictions)) => {
                warn!(
                    "Run {}: classifier returned {} predictions for {} texts, degrading batch {}",
                    run_id,
                    predictions.len(),
                    texts.len(),
                    index + 1
                );
                vec![Prediction::degraded(); texts.len()]
            }
            Ok(Err(e)) => {
                warn!("Run {}: batch {} failed: {}, degrading", run_id, index + 1, e);
                vec![Prediction::degraded(); texts.len()]
            }
            Err(_) => {
                warn!(
                    "Run {}: batch {} timed out after {:?}, degrading",
                    run_id,
                    index + 1,
                    self.config.batch_timeout()
                );
                vec![Prediction::degraded(); texts.len()]
            }
        }
    }

    /// Runs once after the start-up delay, then once per burst of change
    /// signals until the sender side is dropped.
    pub async fn watch(&self, mut signals: mpsc::Receiver<ChangeSignal>) {
        tokio::time::sleep(self.config.startup_delay()).await;
        if let Err(e) = self.run_once().await {
            error!("Initial run failed: {}", e);
        }

        while signals.recv().await.is_some() {
            if !self.config.debounce().is_zero() {
                tokio::time::sleep(self.config.debounce()).await;
            }
            let mut coalesced = 1;
            while signals.try_recv().is_ok() {
                coalesced += 1;
            }
            debug!("Coalesced {} change signals", coalesced);

            if let Err(e) = self.run_once().await {
                error!("Run after change failed: {}", e);
            }
        }

        info!("Change signal channel closed, stopping watch");
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    document: Option<Arc<dyn DocumentSource>>,
    classifier: Option<Arc<dyn Classifier>>,
    store: Option<Arc<dyn RecordStore>>,
    ingestor: Option<Arc<dyn Ingestor>>,
    highlighter: Option<Arc<dyn Highlighter>>,
    extractor: Option<MetadataExtractor>,
    ledger: Option<FragmentLedger>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            document: None,
            classifier: None,
            store: None,
            ingestor: None,
            highlighter: None,
            extractor: None,
            ledger: None,
        }
    }

    pub fn document(mut self, document: Arc<dyn DocumentSource>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ingestor(mut self, ingestor: Arc<dyn Ingestor>) -> Self {
        self.ingestor = Some(ingestor);
        self
    }

    pub fn highlighter(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.highlighter = Some(highlighter);
        self
    }

    pub fn extractor(mut self, extractor: MetadataExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Share a ledger between drivers over the same document.
    pub fn ledger(mut self, ledger: FragmentLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Validates the configuration and resets the record store for a new
    /// session.
    pub async fn build(self) -> Result<PipelineDriver> {
        self.config.validate()?;

        let document = self
            .document
            .ok_or_else(|| SentimentError::Config("pipeline needs a document source".to_string()))?;
        let classifier = self
            .classifier
            .ok_or_else(|| SentimentError::Config("pipeline needs a classifier".to_string()))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(crate::store::MemoryRecordStore::new()));
        let highlighter = self.highlighter.unwrap_or_else(|| Arc::new(NoopHighlighter));
        let extractor = Arc::new(self.extractor.unwrap_or_default());
        let ledger = self.ledger.unwrap_or_default();

        let sink = ResultSink::new(store, self.ingestor);
        sink.start_session().await?;

        info!(
            "Pipeline ready: classifier {}, batch size {}",
            classifier.name(),
            self.config.batch_size
        );

        Ok(PipelineDriver {
            batcher: Batcher::new(self.config.batch_size),
            labeler: Labeler::new(ledger.clone(), extractor, highlighter),
            config: self.config,
            document,
            classifier,
            ledger,
            sink,
            run_guard: Mutex::new(()),
            state: RwLock::new(PipelineState::Idle),
        })
    }
}
