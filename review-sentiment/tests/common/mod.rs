#![allow(dead_code)]

use async_trait::async_trait;
use review_sentiment::{
    Classifier, DocumentSource, Fragment, FragmentContext, FragmentId, PageInfo, Prediction, Result, Sentiment,
    SentimentError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn fragment(id: &str, text: &str) -> Fragment {
    Fragment {
        id: FragmentId::new(id),
        text: text.to_string(),
        context: FragmentContext {
            text: text.to_string(),
            ..Default::default()
        },
    }
}

pub fn reviews(prefix: &str, count: usize) -> Vec<Fragment> {
    (0..count)
        .map(|i| fragment(&format!("{}-{}", prefix, i), &format!("Review number {} from {}", i, prefix)))
        .collect()
}

/// An in-memory page whose fragment list can grow between runs.
pub struct TestDocument {
    fragments: Mutex<Vec<Fragment>>,
    page: PageInfo,
    discoveries: AtomicUsize,
}

impl TestDocument {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self::with_page(fragments, PageInfo::default())
    }

    pub fn with_page(fragments: Vec<Fragment>, page: PageInfo) -> Self {
        Self {
            fragments: Mutex::new(fragments),
            page,
            discoveries: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, fragment: Fragment) {
        self.fragments.lock().unwrap().push(fragment);
    }

    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }
}

impl DocumentSource for TestDocument {
    fn discover(&self) -> Vec<Fragment> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        self.fragments.lock().unwrap().clone()
    }

    fn page(&self) -> PageInfo {
        self.page.clone()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// "bad" anywhere in the text → NEGATIVE, otherwise POSITIVE.
    Keyword,
    Fail,
    /// Never answers within any reasonable timeout.
    Hang,
    /// Returns one prediction fewer than asked for.
    DropLast,
    /// Answers after the given delay.
    Slow(Duration),
}

/// Classifier double that records every batch it is handed.
pub struct ScriptedClassifier {
    behavior: Behavior,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClassifier {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn classified_texts(&self) -> Vec<String> {
        self.calls().into_iter().flatten().collect()
    }
}

fn keyword(text: &str) -> Prediction {
    if text.contains("bad") {
        Prediction::new(Sentiment::Negative, 0.8)
    } else {
        Prediction::new(Sentiment::Positive, 0.9)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> String {
        format!("scripted ({:?})", self.behavior)
    }

    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>> {
        self.calls.lock().unwrap().push(texts.to_vec());
        match self.behavior {
            Behavior::Keyword => Ok(texts.iter().map(|t| keyword(t)).collect()),
            Behavior::Fail => Err(SentimentError::Classifier("model crashed".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(texts.iter().map(|t| keyword(t)).collect())
            }
            Behavior::DropLast => Ok(texts.iter().skip(1).map(|t| keyword(t)).collect()),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(texts.iter().map(|t| keyword(t)).collect())
            }
        }
    }
}
