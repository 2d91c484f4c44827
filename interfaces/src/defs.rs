use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

impl FragmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The enclosing container of a fragment: its whole text plus any named
/// fixed-position fields the selector service could resolve (e.g. `review-date`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentContext {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl FragmentContext {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub text: String,
    #[serde(default)]
    pub context: FragmentContext,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    #[serde(default)]
    pub product_title: Option<String>,
    #[serde(default)]
    pub document_title: String,
    /// Value of the first `data-asin` attribute on the page, if any.
    #[serde(default)]
    pub subject_attribute: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VisualCategory {
    Positive,
    Neutral,
    Negative,
}

impl VisualCategory {
    pub fn css_class(&self) -> &'static str {
        match self {
            VisualCategory::Positive => "sentiment-positive",
            VisualCategory::Neutral => "sentiment-neutral",
            VisualCategory::Negative => "sentiment-negative",
        }
    }
}

/// "The document changed." Delivered at least once, possibly many times per
/// mutation burst, with no ordering or coalescing guarantee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeSignal;

pub trait DocumentSource: Send + Sync {
    /// Every candidate fragment currently in the document. Re-scans the whole
    /// document on each call, so previously seen fragments come back too.
    fn discover(&self) -> Vec<Fragment>;

    fn page(&self) -> PageInfo;
}

pub trait Highlighter: Send + Sync {
    fn highlight(&self, id: &FragmentId, category: VisualCategory, badge: &str);
}

pub struct NoopHighlighter;

impl Highlighter for NoopHighlighter {
    fn highlight(&self, _id: &FragmentId, _category: VisualCategory, _badge: &str) {}
}

// Object style note:
// Implementations of DocumentSource and Highlighter stand in for the page the
// extension runs in. They are called from the pipeline's async tasks but must
// not block: discovery returns a snapshot and highlighting is fire-and-forget.
