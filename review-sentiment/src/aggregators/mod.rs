pub mod trend;

pub use trend::{
    BucketKey, CountryBreakdown, SentimentCounts, TimeBucket, TrendAxis, TrendBinner, TrendReport,
    TrendSeries,
};
