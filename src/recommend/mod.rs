mod keyword;
mod sampling;
mod signals;

pub use keyword::KeywordScorer;
pub use sampling::{sample_without_replacement, KeywordSampler};
pub use signals::{
    accumulate, normalize_term, Aggregation, KeywordWeights, SignalAggregator, WeightedKeyword,
};
