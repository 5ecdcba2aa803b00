use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Recommendation strategies that can produce a ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Keyword,
    Rating,
    Implicit,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Keyword, Algorithm::Rating, Algorithm::Implicit];

    /// Version string stored in the ledger and on model artifacts.
    pub fn version(&self) -> &'static str {
        match self {
            Algorithm::Keyword => "keyword-v1",
            Algorithm::Rating => "svdpp-v1",
            Algorithm::Implicit => "warp-v1",
        }
    }

    pub fn is_latent(&self) -> bool {
        !matches!(self, Algorithm::Keyword)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Keyword => "keyword",
            Algorithm::Rating => "rating",
            Algorithm::Implicit => "implicit",
        };
        f.write_str(name)
    }
}

impl FromStr for Algorithm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" | "keyword-v1" => Ok(Algorithm::Keyword),
            "rating" | "svdpp" | "svdpp-v1" => Ok(Algorithm::Rating),
            "implicit" | "warp" | "warp-v1" => Ok(Algorithm::Implicit),
            other => Err(AppError::InvalidInput(format!(
                "unknown algorithm '{}'",
                other
            ))),
        }
    }
}

/// One row of recommendation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEntry {
    pub user_id: i64,
    pub article_id: i64,
    pub rank: u32,
    pub score: f64,
    pub batch_id: String,
    pub session_id: Option<String>,
    pub algorithm_version: String,
    pub recommended_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_versions() {
        assert_eq!("rating".parse::<Algorithm>().unwrap(), Algorithm::Rating);
        assert_eq!("warp-v1".parse::<Algorithm>().unwrap(), Algorithm::Implicit);
        assert!("popularity".parse::<Algorithm>().is_err());
    }

    #[test]
    fn only_factor_models_are_trained() {
        assert!(!Algorithm::Keyword.is_latent());
        assert!(Algorithm::Rating.is_latent());
        assert!(Algorithm::Implicit.is_latent());
    }
}
