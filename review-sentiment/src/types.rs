use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use interfaces::defs::{
    ChangeSignal, DocumentSource, Fragment, FragmentContext, FragmentId, Highlighter, NoopHighlighter,
    PageInfo, VisualCategory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
        }
    }

    pub fn visual(&self) -> VisualCategory {
        match self {
            Sentiment::Positive => VisualCategory::Positive,
            Sentiment::Negative => VisualCategory::Negative,
            Sentiment::Neutral => VisualCategory::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = SentimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Ok(Sentiment::Positive),
            "NEGATIVE" => Ok(Sentiment::Negative),
            "NEUTRAL" => Ok(Sentiment::Neutral),
            other => Err(SentimentError::Classifier(format!("unknown sentiment label '{}'", other))),
        }
    }
}

/// Where a prediction came from. Degraded predictions were produced without
/// a successful classifier call and must never be mistaken for model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Model,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub provenance: Provenance,
}

impl Prediction {
    pub fn new(sentiment: Sentiment, confidence: f64) -> Self {
        Self {
            sentiment,
            confidence: clamp_confidence(confidence),
            provenance: Provenance::Model,
        }
    }

    pub fn degraded() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            confidence: 0.0,
            provenance: Provenance::Degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.provenance == Provenance::Degraded
    }
}

pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    pub date: Option<String>,
    pub country: Option<String>,
}

/// The durable unit written to the record store and sent for ingestion.
/// Field names match the ingestion endpoint's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub text: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl LabeledRecord {
    pub fn new(text: impl Into<String>, prediction: Prediction, metadata: FragmentMetadata) -> Self {
        Self {
            sentiment: prediction.sentiment,
            confidence: clamp_confidence(prediction.confidence),
            text: text.into(),
            date: metadata.date,
            country: metadata.country,
            degraded: prediction.is_degraded(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub api_url: String,
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub batch_timeout_ms: u64,
    pub startup_delay_ms: u64,
    pub debounce_ms: u64,
    pub min_text_len: usize,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            batch_size: 10,
            inter_batch_delay_ms: 250,
            batch_timeout_ms: 30_000,
            startup_delay_ms: 1_500,
            debounce_ms: 0,
            min_text_len: 10,
            request_timeout_seconds: 10,
            max_retries: 1,
            retry_delay_ms: 500,
            user_agent: "Review-Sentiment/0.1".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `SENTIMENT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SENTIMENT_API_URL") {
            config.api_url = url;
        }
        if let Some(size) = env_number("SENTIMENT_BATCH_SIZE")? {
            config.batch_size = size as usize;
        }
        if let Some(delay) = env_number("SENTIMENT_BATCH_DELAY_MS")? {
            config.inter_batch_delay_ms = delay;
        }
        if let Some(timeout) = env_number("SENTIMENT_BATCH_TIMEOUT_MS")? {
            config.batch_timeout_ms = timeout;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SentimentError::Config("batch size must be at least 1".to_string()));
        }
        if self.batch_timeout_ms == 0 {
            return Err(SentimentError::Config("batch timeout must be greater than zero".to_string()));
        }
        if self.batch_timeout() < self.classify_budget() {
            return Err(SentimentError::Config(format!(
                "batch timeout {:?} is shorter than the classifier's worst case of {:?} ({} attempts of {}s plus backoff)",
                self.batch_timeout(),
                self.classify_budget(),
                self.max_retries + 1,
                self.request_timeout_seconds
            )));
        }
        url::Url::parse(&self.api_url)?;
        Ok(())
    }

    /// Base URL with any trailing slash removed, so endpoint paths can be appended.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Longest a classify call can take with every attempt hitting the request
    /// timeout. Backoff grows by 2x up to 16x the base delay, with up to 50%
    /// jitter on top.
    pub fn classify_budget(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let requests = self.request_timeout_seconds.saturating_mul(1_000).saturating_mul(attempts);
        let backoff: u64 = (0..self.max_retries)
            .map(|retry| self.retry_delay_ms.saturating_mul(1 << retry.min(4)).saturating_mul(3) / 2)
            .fold(0, u64::saturating_add);
        Duration::from_millis(requests.saturating_add(backoff))
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn env_number(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| SentimentError::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SentimentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SentimentError>;
