use crate::traits::{Ingestor, RecordStore};
use crate::types::{LabeledRecord, PageInfo, PipelineConfig, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const MAX_TITLE_CHARS: usize = 120;

static DP_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/dp/([A-Z0-9]{10})").expect("valid product path pattern"));

static SUBJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{10}$").expect("valid subject id pattern"));

/// Derives the stable subject (product) identifier and title of a page.
pub struct SubjectLocator;

impl SubjectLocator {
    /// `/dp/<ASIN>` in the URL path first, then the page's `data-asin`
    /// attribute. Always upper-cased.
    pub fn subject_id(page: &PageInfo) -> Option<String> {
        let path = match Url::parse(&page.url) {
            Ok(url) => url.path().to_string(),
            Err(_) => page.url.clone(),
        };
        if let Some(id) = DP_PATH.captures(&path).and_then(|c| c.get(1)) {
            return Some(id.as_str().to_ascii_uppercase());
        }

        page.subject_attribute
            .as_deref()
            .map(str::trim)
            .filter(|value| SUBJECT_ID.is_match(value))
            .map(str::to_ascii_uppercase)
    }

    pub fn title(page: &PageInfo) -> String {
        let title = page
            .product_title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| page.document_title.trim());
        title.chars().take(MAX_TITLE_CHARS).collect()
    }
}

#[derive(Serialize)]
struct IngestRequest<'a> {
    asin: &'a str,
    title: &'a str,
    results: &'a [LabeledRecord],
}

#[derive(Deserialize)]
struct IngestResponse {
    stored: usize,
}

/// Client for the `/ingest_results` endpoint.
pub struct HttpIngestor {
    client: Client,
    endpoint: String,
}

impl HttpIngestor {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint("ingest_results"),
        })
    }
}

#[async_trait]
impl Ingestor for HttpIngestor {
    async fn ingest(&self, subject_id: &str, title: &str, records: &[LabeledRecord]) -> Result<usize> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&IngestRequest {
                asin: subject_id,
                title,
                results: records,
            })
            .send()
            .await?
            .error_for_status()?;
        let body: IngestResponse = response.json().await?;
        Ok(body.stored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOutcome {
    /// Records in the store after the append.
    pub total: usize,
    /// What the ingestion service reported as stored; `None` when forwarding
    /// was skipped or failed.
    pub forwarded: Option<usize>,
}

/// Commits a run's records locally, then forwards them for server-side
/// aggregation when the page has a subject identifier.
pub struct ResultSink {
    store: Arc<dyn RecordStore>,
    ingestor: Option<Arc<dyn Ingestor>>,
}

impl ResultSink {
    pub fn new(store: Arc<dyn RecordStore>, ingestor: Option<Arc<dyn Ingestor>>) -> Self {
        Self { store, ingestor }
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    pub async fn start_session(&self) -> Result<()> {
        self.store.reset().await
    }

    pub async fn sink(&self, records: &[LabeledRecord], page: &PageInfo) -> Result<SinkOutcome> {
        let total = self.store.append(records).await?;
        info!("Stored {} new sentiment results. Total: {}", records.len(), total);

        let Some(ingestor) = &self.ingestor else {
            return Ok(SinkOutcome { total, forwarded: None });
        };

        let Some(subject_id) = SubjectLocator::subject_id(page) else {
            warn!("Subject id not found; skipping backend ingestion");
            return Ok(SinkOutcome { total, forwarded: None });
        };

        let title = SubjectLocator::title(page);
        let forwarded = match ingestor.ingest(&subject_id, &title, records).await {
            Ok(stored) => {
                info!("Ingested {} results to backend for {}", stored, subject_id);
                Some(stored)
            }
            Err(e) => {
                warn!("Ingest to backend failed for {}: {}", subject_id, e);
                None
            }
        };

        Ok(SinkOutcome { total, forwarded })
    }
}
