use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{FeedbackType, InteractionKind};

const APP_DIR: &str = "newsrec";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    #[serde(default)]
    pub signals: SignalConfig,

    #[serde(default)]
    pub keyword: KeywordConfig,

    #[serde(default)]
    pub rating: RatingConfig,

    #[serde(default)]
    pub implicit: ImplicitConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

fn app_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    app_data_dir().join("news.db").to_string_lossy().to_string()
}

fn default_model_dir() -> String {
    app_data_dir().join("models").to_string_lossy().to_string()
}

fn default_top_n() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            model_dir: default_model_dir(),
            default_top_n: default_top_n(),
            signals: SignalConfig::default(),
            keyword: KeywordConfig::default(),
            rating: RatingConfig::default(),
            implicit: ImplicitConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads the config at `path`, writing the defaults there first if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.signals.top_keywords == 0 {
            return Err(AppError::Config("signals.top_keywords must be positive".into()));
        }
        if self.keyword.sampled_keywords == 0 {
            return Err(AppError::Config("keyword.sampled_keywords must be positive".into()));
        }
        if self.rating.factors == 0 || self.implicit.factors == 0 {
            return Err(AppError::Config("factor counts must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.rating.test_fraction) {
            return Err(AppError::Config("rating.test_fraction must be in [0, 1)".into()));
        }
        if !(self.evaluation.holdout_fraction > 0.0 && self.evaluation.holdout_fraction <= 1.0) {
            return Err(AppError::Config("evaluation.holdout_fraction must be in (0, 1]".into()));
        }
        if self.evaluation.k == 0 {
            return Err(AppError::Config("evaluation.k must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingScheme {
    /// +2 like, -2 dislike, 0.5 per interaction.
    #[default]
    Canonical,
    /// +1.5 like, -1 dislike, 1.0 per interaction.
    Graded,
}

/// Per-event contributions to a keyword's interest weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
    pub search: f64,
    pub interaction: f64,
    pub like: f64,
    pub dislike: f64,
}

impl SignalWeights {
    pub fn for_scheme(scheme: WeightingScheme) -> Self {
        match scheme {
            WeightingScheme::Canonical => Self {
                search: 1.0,
                interaction: 0.5,
                like: 2.0,
                dislike: -2.0,
            },
            WeightingScheme::Graded => Self {
                search: 1.0,
                interaction: 1.0,
                like: 1.5,
                dislike: -1.0,
            },
        }
    }

    pub fn feedback(&self, feedback_type: FeedbackType) -> f64 {
        match feedback_type {
            FeedbackType::Like => self.like,
            FeedbackType::Dislike => self.dislike,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub min_activity_threshold: usize,
    pub top_keywords: usize,
    pub max_search_terms: usize,
    pub scheme: WeightingScheme,
    /// Explicit overrides applied on top of `scheme`.
    pub interaction: Option<f64>,
    pub like: Option<f64>,
    pub dislike: Option<f64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_activity_threshold: 3,
            top_keywords: 5,
            max_search_terms: 5,
            scheme: WeightingScheme::Canonical,
            interaction: None,
            like: None,
            dislike: None,
        }
    }
}

impl SignalConfig {
    pub fn weights(&self) -> SignalWeights {
        let mut weights = SignalWeights::for_scheme(self.scheme);
        if let Some(w) = self.interaction {
            weights.interaction = w;
        }
        if let Some(w) = self.like {
            weights.like = w;
        }
        if let Some(w) = self.dislike {
            weights.dislike = w;
        }
        weights
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub sampled_keywords: usize,
    pub oversample: usize,
    pub seed: Option<u64>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            sampled_keywords: 3,
            oversample: 2,
            seed: None,
        }
    }
}

/// Explicit rating assigned to each event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingScale {
    pub dislike: f64,
    pub view: f64,
    pub click_external_link: f64,
    pub read: f64,
    pub like: f64,
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            dislike: 0.1,
            view: 1.0,
            click_external_link: 2.5,
            read: 5.0,
            like: 10.0,
        }
    }
}

impl RatingScale {
    pub fn interaction(&self, kind: InteractionKind) -> f64 {
        match kind {
            InteractionKind::View => self.view,
            InteractionKind::Read => self.read,
            InteractionKind::ClickExternalLink => self.click_external_link,
        }
    }

    pub fn feedback(&self, feedback_type: FeedbackType) -> f64 {
        match feedback_type {
            FeedbackType::Like => self.like,
            FeedbackType::Dislike => self.dislike,
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        let values = [self.dislike, self.view, self.click_external_link, self.read, self.like];
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub factors: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    pub init_std: f64,
    pub seed: u64,
    pub test_fraction: f64,
    pub scale: RatingScale,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            factors: 20,
            epochs: 50,
            learning_rate: 0.01,
            regularization: 0.01,
            init_std: 0.1,
            seed: 42,
            test_fraction: 0.1,
            scale: RatingScale::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitConfig {
    pub factors: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    pub max_sampled: usize,
    pub seed: u64,
    pub actions: Vec<InteractionKind>,
    pub interaction: f64,
    pub like: f64,
    pub dislike: f64,
}

impl Default for ImplicitConfig {
    fn default() -> Self {
        Self {
            factors: 30,
            epochs: 5,
            learning_rate: 0.05,
            regularization: 0.0001,
            max_sampled: 10,
            seed: 42,
            actions: vec![InteractionKind::Read, InteractionKind::ClickExternalLink],
            interaction: 1.0,
            like: 2.0,
            dislike: -1.0,
        }
    }
}

impl ImplicitConfig {
    pub fn feedback(&self, feedback_type: FeedbackType) -> f64 {
        match feedback_type {
            FeedbackType::Like => self.like,
            FeedbackType::Dislike => self.dislike,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApDivisor {
    /// min(|relevant|, k)
    #[default]
    MinTruthK,
    /// |relevant|
    TruthCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundTruthSource {
    #[default]
    Liked,
    LikedOrClicked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub k: usize,
    pub top_n: usize,
    pub ap_divisor: ApDivisor,
    pub ground_truth: GroundTruthSource,
    pub holdout_fraction: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            k: 10,
            top_n: 10,
            ap_divisor: ApDivisor::MinTruthK,
            ground_truth: GroundTruthSource::Liked,
            holdout_fraction: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/news.db"

            [signals]
            scheme = "graded"
            dislike = -3.0

            [evaluation]
            ap_divisor = "truth_count"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/news.db");
        assert_eq!(config.signals.top_keywords, 5);
        let weights = config.signals.weights();
        assert_eq!(weights.like, 1.5);
        assert_eq!(weights.dislike, -3.0);
        assert_eq!(config.evaluation.ap_divisor, ApDivisor::TruthCount);
        assert_eq!(config.rating.factors, 20);
        assert_eq!(
            config.implicit.actions,
            vec![InteractionKind::Read, InteractionKind::ClickExternalLink]
        );
    }

    #[test]
    fn missing_file_is_written_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.keyword.sampled_keywords, 3);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.db_path, config.db_path);
    }

    #[test]
    fn rating_scale_bounds_follow_values() {
        assert_eq!(RatingScale::default().bounds(), (0.1, 10.0));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = toml::from_str::<Config>("[evaluation]\nk = 0\n")
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
