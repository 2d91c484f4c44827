use crate::dedup::FragmentLedger;
use crate::metadata::MetadataExtractor;
use crate::types::{Fragment, Highlighter, LabeledRecord, Prediction};
use std::sync::Arc;
use tracing::debug;

/// Applies a prediction to a fragment: marks it in the ledger, surfaces its
/// visual category, and produces the durable record.
pub struct Labeler {
    ledger: FragmentLedger,
    extractor: Arc<MetadataExtractor>,
    highlighter: Arc<dyn Highlighter>,
}

impl Labeler {
    pub fn new(ledger: FragmentLedger, extractor: Arc<MetadataExtractor>, highlighter: Arc<dyn Highlighter>) -> Self {
        Self {
            ledger,
            extractor,
            highlighter,
        }
    }

    pub async fn label(&self, fragment: &Fragment, prediction: Prediction) -> LabeledRecord {
        let metadata = self.extractor.extract(&fragment.context);
        if let Some(date) = &metadata.date {
            debug!("Captured review date '{}' for {}", date, fragment.id);
        }
        if let Some(country) = &metadata.country {
            debug!("Captured review country '{}' for {}", country, fragment.id);
        }

        self.ledger
            .mark_labeled(&fragment.id, prediction, metadata.clone())
            .await;
        self.highlighter
            .highlight(&fragment.id, prediction.sentiment.visual(), &badge_text(&prediction));

        LabeledRecord::new(fragment.text.trim(), prediction, metadata)
    }
}

/// Badge shown next to a labeled fragment, e.g. `POSITIVE 87%`.
pub fn badge_text(prediction: &Prediction) -> String {
    if prediction.is_degraded() {
        format!("{} (unavailable)", prediction.sentiment)
    } else {
        format!("{} {}%", prediction.sentiment, (prediction.confidence * 100.0).round() as u32)
    }
}
