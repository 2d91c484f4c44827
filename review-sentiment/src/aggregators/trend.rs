use crate::dates::normalize_date;
use crate::types::{LabeledRecord, Sentiment};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentCounts {
    pub fn add(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
        }
    }

    pub fn get(&self, sentiment: Sentiment) -> usize {
        match sentiment {
            Sentiment::Positive => self.positive,
            Sentiment::Negative => self.negative,
            Sentiment::Neutral => self.neutral,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }
}

/// Key of a trend bucket. Calendar days sort first and chronologically,
/// sequential batches next by number, and anything else last, lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    Day(NaiveDate),
    Batch(usize),
    Raw(String),
}

impl BucketKey {
    fn rank(&self) -> u8 {
        match self {
            BucketKey::Day(_) => 0,
            BucketKey::Batch(_) => 1,
            BucketKey::Raw(_) => 2,
        }
    }

    /// Short label for a chart axis, e.g. `Aug 5` or `Batch 2`.
    pub fn display_label(&self) -> String {
        match self {
            BucketKey::Day(day) => day.format("%b %-d").to_string(),
            other => other.to_string(),
        }
    }
}

impl Ord for BucketKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BucketKey::Day(a), BucketKey::Day(b)) => a.cmp(b),
            (BucketKey::Batch(a), BucketKey::Batch(b)) => a.cmp(b),
            (BucketKey::Raw(a), BucketKey::Raw(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for BucketKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
            BucketKey::Batch(n) => write!(f, "Batch {}", n),
            BucketKey::Raw(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub key: BucketKey,
    pub counts: SentimentCounts,
}

impl TimeBucket {
    pub fn total(&self) -> usize {
        self.counts.total()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendAxis {
    Date,
    Batch,
}

impl TrendAxis {
    pub fn title(&self) -> &'static str {
        match self {
            TrendAxis::Date => "Date",
            TrendAxis::Batch => "Review Batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryBreakdown {
    pub country: String,
    pub counts: SentimentCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub counts: SentimentCounts,
    pub total: usize,
    pub average_confidence: f64,
    pub degraded: usize,
    pub axis: TrendAxis,
    pub buckets: Vec<TimeBucket>,
    pub by_country: Vec<CountryBreakdown>,
}

/// Column-oriented view of the buckets, the shape a line chart wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendSeries {
    pub axis_title: String,
    pub keys: Vec<String>,
    pub labels: Vec<String>,
    pub positive: Vec<usize>,
    pub negative: Vec<usize>,
    pub neutral: Vec<usize>,
    pub total: Vec<usize>,
}

impl TrendReport {
    pub fn series(&self) -> TrendSeries {
        TrendSeries {
            axis_title: self.axis.title().to_string(),
            keys: self.buckets.iter().map(|b| b.key.to_string()).collect(),
            labels: self.buckets.iter().map(|b| b.key.display_label()).collect(),
            positive: self.buckets.iter().map(|b| b.counts.positive).collect(),
            negative: self.buckets.iter().map(|b| b.counts.negative).collect(),
            neutral: self.buckets.iter().map(|b| b.counts.neutral).collect(),
            total: self.buckets.iter().map(TimeBucket::total).collect(),
        }
    }
}

/// Turns the accumulated records into summary statistics and a trend series.
#[derive(Debug, Clone)]
pub struct TrendBinner {
    batch_size: usize,
    reference: Option<DateTime<Utc>>,
}

impl TrendBinner {
    pub const DEFAULT_BATCH_SIZE: usize = 5;

    pub fn new() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            reference: None,
        }
    }

    /// Size of the sequential buckets used when no record has a usable date.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Instant that relative dates ("2 days ago") are resolved against.
    /// Defaults to the time `bin` is called.
    pub fn with_reference(mut self, now: DateTime<Utc>) -> Self {
        self.reference = Some(now);
        self
    }

    pub fn bin(&self, records: &[LabeledRecord]) -> TrendReport {
        let now = self.reference.unwrap_or_else(Utc::now);

        let mut counts = SentimentCounts::default();
        let mut confidence_sum = 0.0;
        let mut degraded = 0;
        for record in records {
            counts.add(record.sentiment);
            confidence_sum += record.confidence;
            if record.degraded {
                degraded += 1;
            }
        }
        let average_confidence = if records.is_empty() {
            0.0
        } else {
            confidence_sum / records.len() as f64
        };

        let keys: Vec<Option<BucketKey>> = records
            .iter()
            .map(|record| {
                let raw = record.date.as_deref().map(str::trim).filter(|raw| !raw.is_empty())?;
                Some(match normalize_date(raw, now) {
                    Some(day) => BucketKey::Day(day),
                    None => BucketKey::Raw(raw.to_string()),
                })
            })
            .collect();

        let has_dates = keys.iter().any(|key| matches!(key, Some(BucketKey::Day(_))));
        let (axis, buckets) = if has_dates {
            (TrendAxis::Date, bucket_by_date(records, &keys))
        } else {
            (TrendAxis::Batch, bucket_by_order(records, self.batch_size))
        };

        debug!(
            "Binned {} records into {} {:?} buckets",
            records.len(),
            buckets.len(),
            axis
        );

        TrendReport {
            counts,
            total: records.len(),
            average_confidence,
            degraded,
            axis,
            buckets,
            by_country: country_breakdown(records),
        }
    }
}

impl Default for TrendBinner {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_by_date(records: &[LabeledRecord], keys: &[Option<BucketKey>]) -> Vec<TimeBucket> {
    let mut grouped: BTreeMap<BucketKey, SentimentCounts> = BTreeMap::new();
    for (record, key) in records.iter().zip(keys) {
        if let Some(key) = key {
            grouped.entry(key.clone()).or_default().add(record.sentiment);
        }
    }
    grouped
        .into_iter()
        .map(|(key, counts)| TimeBucket { key, counts })
        .collect()
}

fn bucket_by_order(records: &[LabeledRecord], batch_size: usize) -> Vec<TimeBucket> {
    records
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| {
            let mut counts = SentimentCounts::default();
            for record in chunk {
                counts.add(record.sentiment);
            }
            TimeBucket {
                key: BucketKey::Batch(i + 1),
                counts,
            }
        })
        .collect()
}

fn country_breakdown(records: &[LabeledRecord]) -> Vec<CountryBreakdown> {
    let mut order: Vec<CountryBreakdown> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let country = record
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("Unknown")
            .to_string();
        let slot = *index.entry(country.clone()).or_insert_with(|| {
            order.push(CountryBreakdown {
                country,
                counts: SentimentCounts::default(),
            });
            order.len() - 1
        });
        order[slot].counts.add(record.sentiment);
    }
    order
}
