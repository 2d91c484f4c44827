use crate::dates::RELATIVE_DATE;
use crate::types::{FragmentContext, FragmentMetadata};
use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed-position date fields, in the order they are trusted.
pub const DATE_FIELDS: [&str; 3] = ["review-date", "date", "cr-original-review-date"];

static LONG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4}\b",
    )
    .expect("valid long date pattern")
});

static SLASHED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").expect("valid slashed date pattern"));

static DASHED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}-\d{1,2}-\d{4}\b").expect("valid dashed date pattern"));

static REVIEWED_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)Reviewed in ([^,\n]+?)(?:\s+on\b|\s+in\b|,|$)").expect("valid reviewed-in pattern")
});

static FROM_PLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfrom ([A-Z][a-z]+(?: [A-Z][a-z]+)*)").expect("valid from-place pattern")
});

static IN_PLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bin ([A-Z][a-z]+(?: [A-Z][a-z]+)*)").expect("valid in-place pattern")
});

pub trait DateStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, context: &FragmentContext) -> Option<String>;
}

pub trait OriginStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, context: &FragmentContext) -> Option<String>;
}

/// Reads the first non-empty named field of the context.
pub struct FieldDate {
    fields: Vec<String>,
}

impl FieldDate {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl DateStrategy for FieldDate {
    fn name(&self) -> &str {
        "field"
    }

    fn extract(&self, context: &FragmentContext) -> Option<String> {
        self.fields
            .iter()
            .find_map(|name| context.field(name))
            .map(str::to_string)
    }
}

/// Returns the whole match of a pattern over the context text.
pub struct PatternDate {
    name: String,
    pattern: Regex,
}

impl PatternDate {
    pub fn new(name: impl Into<String>, pattern: Regex) -> Self {
        Self {
            name: name.into(),
            pattern,
        }
    }
}

impl DateStrategy for PatternDate {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, context: &FragmentContext) -> Option<String> {
        self.pattern
            .find(&context.text)
            .map(|m| m.as_str().trim().to_string())
    }
}

/// Returns the first capture group of a pattern over the context text.
pub struct PatternOrigin {
    name: String,
    pattern: Regex,
}

impl PatternOrigin {
    pub fn new(name: impl Into<String>, pattern: Regex) -> Self {
        Self {
            name: name.into(),
            pattern,
        }
    }
}

impl OriginStrategy for PatternOrigin {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, context: &FragmentContext) -> Option<String> {
        self.pattern
            .captures(&context.text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|origin| !origin.is_empty())
    }
}

/// Best-effort date and origin recovery from a fragment's enclosing context.
///
/// Each strategy list is tried in order and the first hit wins, so the order
/// of the lists is part of the behaviour.
pub struct MetadataExtractor {
    date_strategies: Vec<Box<dyn DateStrategy>>,
    origin_strategies: Vec<Box<dyn OriginStrategy>>,
}

impl MetadataExtractor {
    pub fn new(
        date_strategies: Vec<Box<dyn DateStrategy>>,
        origin_strategies: Vec<Box<dyn OriginStrategy>>,
    ) -> Self {
        Self {
            date_strategies,
            origin_strategies,
        }
    }

    pub fn extract(&self, context: &FragmentContext) -> FragmentMetadata {
        FragmentMetadata {
            date: self.extract_date(context),
            country: self.extract_origin(context),
        }
    }

    pub fn extract_date(&self, context: &FragmentContext) -> Option<String> {
        self.date_strategies
            .iter()
            .find_map(|strategy| strategy.extract(context))
    }

    pub fn extract_origin(&self, context: &FragmentContext) -> Option<String> {
        self.origin_strategies
            .iter()
            .find_map(|strategy| strategy.extract(context))
    }

    pub fn date_strategy_names(&self) -> Vec<&str> {
        self.date_strategies.iter().map(|s| s.name()).collect()
    }

    pub fn origin_strategy_names(&self) -> Vec<&str> {
        self.origin_strategies.iter().map(|s| s.name()).collect()
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(
            vec![
                Box::new(FieldDate::new(DATE_FIELDS)),
                Box::new(PatternDate::new("long_date", LONG_DATE.clone())),
                Box::new(PatternDate::new("slashed_date", SLASHED_DATE.clone())),
                Box::new(PatternDate::new("dashed_date", DASHED_DATE.clone())),
                Box::new(PatternDate::new("relative_date", RELATIVE_DATE.clone())),
            ],
            vec![
                Box::new(PatternOrigin::new("reviewed_in", REVIEWED_IN.clone())),
                Box::new(PatternOrigin::new("from_place", FROM_PLACE.clone())),
                Box::new(PatternOrigin::new("in_place", IN_PLACE.clone())),
            ],
        )
    }
}
