use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::factorization::{LatentFactorScorer, ModelArtifact, ModelHandle};
use crate::ledger::{RecommendationLedger, RecordSummary};
use crate::models::{Algorithm, Article, FeedbackChange, FeedbackIntent, FeedbackType};
use crate::recommend::KeywordScorer;

/// The serving side: one scorer per algorithm over a shared store.
pub struct Engine {
    repository: Arc<Repository>,
    keyword: KeywordScorer,
    rating: LatentFactorScorer,
    implicit: LatentFactorScorer,
    ledger: RecommendationLedger,
    config: Config,
}

impl Engine {
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);
        info!("Opened article store at {}", config.db_path);
        Ok(Self::with_repository(repository, config))
    }

    /// Builds the engine over an existing store, loading any trained models
    /// found under `config.model_dir`.
    pub fn with_repository(repository: Arc<Repository>, config: Config) -> Self {
        let model_dir = Path::new(&config.model_dir);
        let rating = Arc::new(ModelHandle::open(
            Algorithm::Rating,
            ModelArtifact::path_for(model_dir, Algorithm::Rating),
        ));
        let implicit = Arc::new(ModelHandle::open(
            Algorithm::Implicit,
            ModelArtifact::path_for(model_dir, Algorithm::Implicit),
        ));
        Self::with_handles(repository, config, rating, implicit)
    }

    pub fn with_handles(
        repository: Arc<Repository>,
        config: Config,
        rating: Arc<ModelHandle>,
        implicit: Arc<ModelHandle>,
    ) -> Self {
        Self {
            keyword: KeywordScorer::new(
                Arc::clone(&repository),
                config.signals.clone(),
                config.keyword.clone(),
            ),
            rating: LatentFactorScorer::new(Arc::clone(&repository), rating),
            implicit: LatentFactorScorer::new(Arc::clone(&repository), implicit),
            ledger: RecommendationLedger::new(Arc::clone(&repository)),
            repository,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    pub fn ledger(&self) -> &RecommendationLedger {
        &self.ledger
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The model slot behind a latent algorithm; `None` for keyword.
    pub fn handle(&self, algorithm: Algorithm) -> Option<&Arc<ModelHandle>> {
        match algorithm {
            Algorithm::Keyword => None,
            Algorithm::Rating => Some(self.rating.handle()),
            Algorithm::Implicit => Some(self.implicit.handle()),
        }
    }

    pub async fn recommend(&self, user_id: i64, algorithm: Algorithm, top_n: usize) -> Vec<Article> {
        let articles = match algorithm {
            Algorithm::Keyword => self.keyword.score(user_id, top_n).await,
            Algorithm::Rating => self.rating.recommend(user_id, top_n).await,
            Algorithm::Implicit => self.implicit.recommend(user_id, top_n).await,
        };
        debug!(user_id, %algorithm, count = articles.len(), "recommended");
        articles
    }

    /// Recommends and writes the list to the ledger under `batch_id`, or a
    /// fresh batch when none is given.
    pub async fn recommend_and_record(
        &self,
        user_id: i64,
        algorithm: Algorithm,
        top_n: usize,
        batch_id: Option<&str>,
        session_id: Option<&str>,
    ) -> (Vec<Article>, RecordSummary) {
        let articles = self.recommend(user_id, algorithm, top_n).await;
        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let summary = self
            .ledger
            .record(user_id, &ids, batch_id, session_id, algorithm.version())
            .await;
        (articles, summary)
    }

    pub async fn submit_feedback(
        &self,
        user_id: i64,
        article_id: i64,
        feedback_type: FeedbackType,
        intent: FeedbackIntent,
    ) -> Result<FeedbackChange> {
        self.repository
            .submit_feedback(user_id, article_id, feedback_type, intent)
            .await
    }
}
