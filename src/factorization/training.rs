use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::Algorithm;

use super::data::{build_implicit, build_ratings};
use super::implicit::ImplicitTrainer;
use super::model::{FactorModel, ModelArtifact};
use super::rating::{HoldoutReport, RatingTrainer};

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub algorithm_version: String,
    pub users: usize,
    pub items: usize,
    pub pairs: usize,
    pub holdout: Option<HoldoutReport>,
}

/// Offline batch job: reads every event and fits the chosen model.
///
/// Use a repository opened for the job, not the one serving requests.
pub async fn train(
    repository: &Repository,
    algorithm: Algorithm,
    config: &Config,
) -> Result<(ModelArtifact, TrainingReport)> {
    let interactions = repository.all_interactions().await?;
    let feedback = repository.all_feedback().await?;
    info!(
        interactions = interactions.len(),
        feedback = feedback.len(),
        "loaded training events"
    );

    let (model, report) = match algorithm {
        Algorithm::Keyword => {
            return Err(AppError::InvalidInput(
                "the keyword strategy has no trained model".into(),
            ))
        }
        Algorithm::Rating => {
            let ratings = build_ratings(&interactions, &feedback, &config.rating.scale);
            let trainer = RatingTrainer::new(config.rating.clone());
            let pairs = ratings.len();
            let (model, holdout) =
                tokio::task::spawn_blocking(move || trainer.train_with_holdout(&ratings))
                    .await
                    .map_err(|e| anyhow::anyhow!("training task failed: {}", e))??;
            let report = TrainingReport {
                algorithm_version: algorithm.version().to_string(),
                users: model.user_count(),
                items: model.item_count(),
                pairs,
                holdout: Some(holdout),
            };
            (FactorModel::Rating(model), report)
        }
        Algorithm::Implicit => {
            let entries = build_implicit(&interactions, &feedback, &config.implicit);
            let mut catalog: Vec<i64> = repository.all_article_ids().await?.into_iter().collect();
            catalog.sort_unstable();
            let trainer = ImplicitTrainer::new(config.implicit.clone());
            let pairs = entries.len();
            let model = tokio::task::spawn_blocking(move || trainer.train(&entries, &catalog))
                .await
                .map_err(|e| anyhow::anyhow!("training task failed: {}", e))??;
            let report = TrainingReport {
                algorithm_version: algorithm.version().to_string(),
                users: model.user_count(),
                items: model.item_count(),
                pairs,
                holdout: None,
            };
            (FactorModel::Implicit(model), report)
        }
    };

    let seed = match algorithm {
        Algorithm::Implicit => config.implicit.seed,
        _ => config.rating.seed,
    };
    let artifact = ModelArtifact {
        algorithm_version: algorithm.version().to_string(),
        trained_at: Utc::now(),
        seed,
        model,
    };
    Ok((artifact, report))
}

/// Trains and writes the artifact under `config.model_dir`.
pub async fn train_and_save(
    repository: &Repository,
    algorithm: Algorithm,
    config: &Config,
) -> Result<(PathBuf, TrainingReport)> {
    let (artifact, report) = train(repository, algorithm, config).await?;
    let path = ModelArtifact::path_for(Path::new(&config.model_dir), algorithm);
    artifact.save(&path)?;
    info!("Saved {} model to {:?}", report.algorithm_version, path);
    Ok((path, report))
}
