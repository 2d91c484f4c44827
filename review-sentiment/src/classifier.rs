use crate::traits::Classifier;
use crate::types::{PipelineConfig, Prediction, Result, Sentiment, SentimentError};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct PredictBatchRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct PredictBatchResponse {
    results: Vec<WirePrediction>,
}

#[derive(Deserialize)]
struct WirePrediction {
    sentiment: String,
    confidence: f64,
}

/// Client for the `/predict_batch` endpoint.
///
/// `classify` never fails: when the service cannot be reached, answers with a
/// non-success status, or sends back something unusable, every text gets a
/// degraded prediction instead.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpClassifier {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint("predict_batch"),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Like `classify`, but surfaces the failure instead of degrading.
    pub async fn try_classify(&self, texts: &[String]) -> Result<Vec<Prediction>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: self.retry_delay,
            initial_interval: self.retry_delay,
            max_interval: self.retry_delay * 16,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.request(texts).await {
                Ok(predictions) => return Ok(predictions),
                Err(e) => {
                    // A reply we cannot use will not get better on retry.
                    let retryable = matches!(e, SentimentError::Http(_));
                    if retryable && attempt < self.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Classify attempt {} failed: {}, retrying in {:?}", attempt + 1, e, delay);
                            tokio::time::sleep(delay).await;
                            last_error = Some(e);
                            continue;
                        }
                    }
                    last_error = Some(e);
                    break;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SentimentError::Classifier("no attempt was made".to_string())))
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Prediction>> {
        let start_time = Instant::now();
        debug!("POST {} with {} texts", self.endpoint, texts.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictBatchRequest { texts })
            .send()
            .await?
            .error_for_status()?;

        let body: PredictBatchResponse = response.json().await?;
        if body.results.len() != texts.len() {
            return Err(SentimentError::Classifier(format!(
                "expected {} results, got {}",
                texts.len(),
                body.results.len()
            )));
        }

        let predictions = body
            .results
            .into_iter()
            .map(|wire| -> Result<Prediction> {
                Ok(Prediction::new(wire.sentiment.parse::<Sentiment>()?, wire.confidence))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Classified {} texts in {}ms",
            predictions.len(),
            start_time.elapsed().as_millis()
        );
        Ok(predictions)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> String {
        format!("http ({})", self.endpoint)
    }

    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>> {
        match self.try_classify(texts).await {
            Ok(predictions) => Ok(predictions),
            Err(e) => {
                warn!("Classifier unavailable, degrading {} texts: {}", texts.len(), e);
                Ok(vec![Prediction::degraded(); texts.len()])
            }
        }
    }
}
