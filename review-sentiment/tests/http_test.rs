mod common;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::{init_tracing, reviews, TestDocument};
use review_sentiment::{
    Classifier, HttpClassifier, HttpIngestor, MemoryRecordStore, PageInfo, PipelineBuilder, PipelineConfig,
    Provenance, RecordStore, Result, Sentiment, SentimentError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Stub {
    predict_calls: AtomicUsize,
    ingested: Mutex<Vec<Value>>,
}

async fn predict(State(stub): State<Arc<Stub>>, Json(body): Json<Value>) -> Json<Value> {
    stub.predict_calls.fetch_add(1, Ordering::SeqCst);
    let results: Vec<Value> = body["texts"]
        .as_array()
        .map(|texts| {
            texts
                .iter()
                .map(|text| {
                    let text = text.as_str().unwrap_or_default();
                    if text.contains("bad") {
                        json!({ "sentiment": "negative", "confidence": 0.61 })
                    } else {
                        json!({ "sentiment": "POSITIVE", "confidence": 1.4 })
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    Json(json!({ "results": results }))
}

async fn predict_short(State(stub): State<Arc<Stub>>, Json(_body): Json<Value>) -> Json<Value> {
    stub.predict_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "results": [{ "sentiment": "POSITIVE", "confidence": 0.9 }] }))
}

async fn predict_unknown_label(State(stub): State<Arc<Stub>>, Json(body): Json<Value>) -> Json<Value> {
    stub.predict_calls.fetch_add(1, Ordering::SeqCst);
    let count = body["texts"].as_array().map(Vec::len).unwrap_or(0);
    let results = vec![json!({ "sentiment": "MIXED", "confidence": 0.5 }); count];
    Json(json!({ "results": results }))
}

async fn predict_unavailable(State(stub): State<Arc<Stub>>) -> StatusCode {
    stub.predict_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn ingest(State(stub): State<Arc<Stub>>, Json(body): Json<Value>) -> Json<Value> {
    let stored = body["results"].as_array().map(Vec::len).unwrap_or(0);
    stub.ingested.lock().unwrap().push(body);
    Json(json!({ "stored": stored }))
}

async fn ingest_unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(api_url: String) -> PipelineConfig {
    PipelineConfig {
        api_url,
        inter_batch_delay_ms: 0,
        retry_delay_ms: 10,
        ..Default::default()
    }
}

fn product_page() -> PageInfo {
    PageInfo {
        url: "https://www.amazon.in/USB-C-Charger/dp/B0CHX1W1XY/ref=cm_cr_arp".to_string(),
        product_title: Some("USB-C Charger 65W".to_string()),
        document_title: "Amazon.in: Customer reviews".to_string(),
        subject_attribute: None,
    }
}

#[tokio::test]
async fn http_classifier_parses_labels_and_clamps_confidence() -> Result<()> {
    init_tracing();

    let stub = Arc::new(Stub::default());
    let url = serve(Router::new().route("/predict_batch", post(predict)).with_state(stub.clone())).await;
    let classifier = HttpClassifier::new(&config(format!("{}/", url)))?;
    assert_eq!(classifier.endpoint(), format!("{}/predict_batch", url));

    let texts = vec!["Great sound".to_string(), "bad battery".to_string()];
    let predictions = classifier.classify(&texts).await?;

    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].sentiment, Sentiment::Positive);
    assert_eq!(predictions[0].confidence, 1.0);
    assert_eq!(predictions[1].sentiment, Sentiment::Negative);
    assert_eq!(predictions[1].provenance, Provenance::Model);
    assert_eq!(stub.predict_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn server_errors_are_retried_then_degraded() -> Result<()> {
    init_tracing();

    let stub = Arc::new(Stub::default());
    let url = serve(
        Router::new()
            .route("/predict_batch", post(predict_unavailable))
            .with_state(stub.clone()),
    )
    .await;
    let classifier = HttpClassifier::new(&config(url))?;

    let texts = vec!["one review".to_string(), "another review".to_string()];
    let err = classifier.try_classify(&texts).await.err().unwrap();
    assert!(matches!(err, SentimentError::Http(_)));
    assert_eq!(stub.predict_calls.load(Ordering::SeqCst), 2);

    let predictions = classifier.classify(&texts).await?;
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(|p| p.is_degraded() && p.sentiment == Sentiment::Neutral));
    Ok(())
}

#[tokio::test]
async fn malformed_replies_degrade_without_retrying() -> Result<()> {
    init_tracing();

    let short = Arc::new(Stub::default());
    let url = serve(
        Router::new()
            .route("/predict_batch", post(predict_short))
            .with_state(short.clone()),
    )
    .await;
    let classifier = HttpClassifier::new(&config(url))?;
    let texts = vec!["first".to_string(), "second".to_string(), "third".to_string()];

    let predictions = classifier.classify(&texts).await?;
    assert_eq!(predictions.len(), 3);
    assert!(predictions.iter().all(|p| p.is_degraded()));
    assert_eq!(short.predict_calls.load(Ordering::SeqCst), 1);

    let unknown = Arc::new(Stub::default());
    let url = serve(
        Router::new()
            .route("/predict_batch", post(predict_unknown_label))
            .with_state(unknown.clone()),
    )
    .await;
    let classifier = HttpClassifier::new(&config(url))?;
    let err = classifier.try_classify(&texts).await.err().unwrap();
    assert!(matches!(err, SentimentError::Classifier(_)));
    assert_eq!(unknown.predict_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_service_degrades() -> Result<()> {
    init_tracing();

    // Bind and immediately drop a listener to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let classifier = HttpClassifier::new(&config(format!("http://{}", addr)))?;
    let predictions = classifier.classify(&["still labeled".to_string()]).await?;
    assert_eq!(predictions.len(), 1);
    assert!(predictions[0].is_degraded());
    assert_eq!(predictions[0].confidence, 0.0);
    Ok(())
}

#[tokio::test]
async fn pipeline_forwards_results_for_the_product() -> Result<()> {
    init_tracing();

    let stub = Arc::new(Stub::default());
    let url = serve(
        Router::new()
            .route("/predict_batch", post(predict))
            .route("/ingest_results", post(ingest))
            .with_state(stub.clone()),
    )
    .await;
    let config = config(url);

    let document = Arc::new(TestDocument::with_page(reviews("page", 12), product_page()));
    let store = Arc::new(MemoryRecordStore::new());
    let driver = PipelineBuilder::new(config.clone())
        .document(document)
        .classifier(Arc::new(HttpClassifier::new(&config)?))
        .ingestor(Arc::new(HttpIngestor::new(&config)?))
        .store(store.clone())
        .build()
        .await?;

    let summary = driver.run_once().await?;
    assert_eq!(summary.batches, 2);
    let outcome = summary.sink.unwrap();
    assert_eq!(outcome.total, 12);
    assert_eq!(outcome.forwarded, Some(12));
    assert_eq!(stub.predict_calls.load(Ordering::SeqCst), 2);

    let ingested = stub.ingested.lock().unwrap().clone();
    assert_eq!(ingested.len(), 1);
    assert_eq!(ingested[0]["asin"], "B0CHX1W1XY");
    assert_eq!(ingested[0]["title"], "USB-C Charger 65W");
    assert_eq!(ingested[0]["results"][0]["sentiment"], "POSITIVE");
    assert_eq!(ingested[0]["results"][0]["text"], "Review number 0 from page");
    assert_eq!(store.load().await?.len(), 12);
    Ok(())
}

#[tokio::test]
async fn local_results_survive_a_failed_forward() -> Result<()> {
    init_tracing();

    let stub = Arc::new(Stub::default());
    let url = serve(
        Router::new()
            .route("/predict_batch", post(predict))
            .route("/ingest_results", post(ingest_unavailable))
            .with_state(stub.clone()),
    )
    .await;
    let config = config(url);

    let store = Arc::new(MemoryRecordStore::new());
    let driver = PipelineBuilder::new(config.clone())
        .document(Arc::new(TestDocument::with_page(reviews("page", 3), product_page())))
        .classifier(Arc::new(HttpClassifier::new(&config)?))
        .ingestor(Arc::new(HttpIngestor::new(&config)?))
        .store(store.clone())
        .build()
        .await?;

    let summary = driver.run_once().await?;
    let outcome = summary.sink.unwrap();
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.forwarded, None);
    assert_eq!(store.load().await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn pages_without_a_product_id_are_not_forwarded() -> Result<()> {
    init_tracing();

    let stub = Arc::new(Stub::default());
    let url = serve(
        Router::new()
            .route("/predict_batch", post(predict))
            .route("/ingest_results", post(ingest))
            .with_state(stub.clone()),
    )
    .await;
    let config = config(url);

    let page = PageInfo {
        url: "https://shop.example.com/reviews?page=2".to_string(),
        document_title: "Reviews".to_string(),
        ..Default::default()
    };
    let store = Arc::new(MemoryRecordStore::new());
    let driver = PipelineBuilder::new(config.clone())
        .document(Arc::new(TestDocument::with_page(reviews("page", 3), page)))
        .classifier(Arc::new(HttpClassifier::new(&config)?))
        .ingestor(Arc::new(HttpIngestor::new(&config)?))
        .store(store.clone())
        .build()
        .await?;

    let summary = driver.run_once().await?;
    assert_eq!(summary.sink.unwrap().forwarded, None);
    assert!(stub.ingested.lock().unwrap().is_empty());
    assert_eq!(store.load().await?.len(), 3);
    Ok(())
}
