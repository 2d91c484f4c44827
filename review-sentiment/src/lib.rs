pub mod types;
pub mod traits;
pub mod dates;
pub mod metadata;
pub mod dedup;
pub mod batcher;
pub mod classifier;
pub mod labeler;
pub mod store;
pub mod sink;
pub mod pipeline;
pub mod aggregators;

pub use types::*;
pub use traits::{Classifier, Ingestor, RecordStore};
pub use dates::normalize_date;
pub use metadata::{DateStrategy, MetadataExtractor, OriginStrategy};
pub use dedup::{DedupFilter, FragmentLedger, FragmentState};
pub use batcher::Batcher;
pub use classifier::HttpClassifier;
pub use labeler::{badge_text, Labeler};
pub use store::{JsonFileRecordStore, MemoryRecordStore};
pub use sink::{HttpIngestor, ResultSink, SinkOutcome, SubjectLocator};
pub use pipeline::{PipelineBuilder, PipelineDriver, PipelineState, RunSummary};
pub use aggregators::{BucketKey, SentimentCounts, TimeBucket, TrendAxis, TrendBinner, TrendReport, TrendSeries};
