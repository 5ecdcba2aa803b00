use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EvaluationConfig, GroundTruthSource};
use crate::db::Repository;
use crate::engine::Engine;
use crate::error::Result;
use crate::ledger::RecommendationLedger;
use crate::models::{Algorithm, FeedbackType};

use super::metrics::{evaluate, precision_recall, PrecisionRecall, RankingMetrics};

pub type GroundTruth = HashMap<i64, HashSet<i64>>;
pub type Predictions = HashMap<i64, Vec<i64>>;

#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub algorithm: Algorithm,
    /// Ledger batch holding the lists that were scored.
    pub batch_id: String,
    pub k: usize,
    pub metrics: RankingMetrics,
    pub precision_recall: PrecisionRecall,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    /// Shared prefix of every per-algorithm batch in the run.
    pub run_id: String,
    pub reports: Vec<StrategyReport>,
}

/// Ledger batch for one algorithm's lists within a run.
///
/// Ledger rows are unique per (user, article, batch), so each algorithm
/// needs its own batch or overlapping lists would drop rows.
pub fn strategy_batch_id(run_id: &str, algorithm: Algorithm) -> String {
    format!("{}-{}", run_id, algorithm.version())
}

pub fn score_predictions(
    algorithm: Algorithm,
    batch_id: &str,
    predicted: &Predictions,
    ground_truth: &GroundTruth,
    config: &EvaluationConfig,
) -> StrategyReport {
    let metrics = evaluate(predicted, ground_truth, config.k, config.ap_divisor);
    let precision_recall = precision_recall(predicted, ground_truth, config.k);
    let k = config.k;
    info!(
        "{} evaluation ({}): MAP@{k}={:.4}, NDCG@{k}={:.4}, HitRate@{k}={:.4}, P={:.4}, R={:.4} over {} users",
        algorithm,
        batch_id,
        metrics.map,
        metrics.ndcg,
        metrics.hit_rate,
        precision_recall.precision,
        precision_recall.recall,
        metrics.users,
    );
    StrategyReport {
        algorithm,
        batch_id: batch_id.to_string(),
        k: config.k,
        metrics,
        precision_recall,
    }
}

pub async fn ground_truth(repository: &Repository, source: GroundTruthSource) -> Result<GroundTruth> {
    match source {
        GroundTruthSource::Liked => repository.liked_articles().await,
        GroundTruthSource::LikedOrClicked => repository.engaged_articles().await,
    }
}

/// Runs each algorithm for every user with relevant articles, records each
/// algorithm's lists under its own batch of one run, and scores them.
///
/// Every list is generated before any is recorded, so one algorithm's
/// output never enters another's seen set within the run. Repeated
/// algorithms are run once.
pub async fn run(
    engine: &Engine,
    algorithms: &[Algorithm],
    ground_truth: &GroundTruth,
    config: &EvaluationConfig,
) -> EvaluationRun {
    let run_id = RecommendationLedger::new_batch_id();
    let mut users: Vec<i64> = ground_truth
        .iter()
        .filter(|(_, relevant)| !relevant.is_empty())
        .map(|(&user_id, _)| user_id)
        .collect();
    users.sort_unstable();

    let mut all_predictions: Vec<(Algorithm, Predictions)> = Vec::with_capacity(algorithms.len());
    for &algorithm in algorithms {
        if all_predictions.iter().any(|(done, _)| *done == algorithm) {
            continue;
        }
        let mut predicted = Predictions::new();
        for &user_id in &users {
            let ids: Vec<i64> = engine
                .recommend(user_id, algorithm, config.top_n)
                .await
                .into_iter()
                .map(|a| a.id)
                .collect();
            debug!(user_id, %algorithm, predicted = ?ids, "evaluation list");
            predicted.insert(user_id, ids);
        }
        all_predictions.push((algorithm, predicted));
    }

    let mut reports = Vec::with_capacity(all_predictions.len());
    for (algorithm, predicted) in all_predictions {
        let batch_id = strategy_batch_id(&run_id, algorithm);
        for &user_id in &users {
            if let Some(ids) = predicted.get(&user_id) {
                engine
                    .ledger()
                    .record(user_id, ids, Some(&batch_id), None, algorithm.version())
                    .await;
            }
        }
        reports.push(score_predictions(
            algorithm,
            &batch_id,
            &predicted,
            ground_truth,
            config,
        ));
    }

    EvaluationRun { run_id, reports }
}

/// Scores what the ledger says `algorithm` showed in `batch_id`. Fails with
/// `IncompleteBatch` if a recorded list has a missing rank.
pub async fn evaluate_batch(
    ledger: &RecommendationLedger,
    batch_id: &str,
    algorithm: Algorithm,
    ground_truth: &GroundTruth,
    config: &EvaluationConfig,
) -> Result<StrategyReport> {
    let predicted = ledger
        .predictions_for_batch(batch_id, algorithm.version())
        .await?;
    Ok(score_predictions(algorithm, batch_id, &predicted, ground_truth, config))
}

/// Re-scores `algorithm`'s lists from an earlier `run`.
pub async fn evaluate_run(
    ledger: &RecommendationLedger,
    run_id: &str,
    algorithm: Algorithm,
    ground_truth: &GroundTruth,
    config: &EvaluationConfig,
) -> Result<StrategyReport> {
    let batch_id = strategy_batch_id(run_id, algorithm);
    evaluate_batch(ledger, &batch_id, algorithm, ground_truth, config).await
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutRow {
    pub user_id: i64,
    pub article_id: i64,
    pub feedback_type: FeedbackType,
}

/// Writes the most recent `fraction` of feedback rows as JSON; returns the row count.
pub async fn export_holdout(repository: &Repository, fraction: f64, path: &Path) -> Result<usize> {
    let rows: Vec<HoldoutRow> = repository
        .holdout_feedback(fraction)
        .await?
        .into_iter()
        .map(|f| HoldoutRow {
            user_id: f.user_id,
            article_id: f.article_id,
            feedback_type: f.feedback_type,
        })
        .collect();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&rows)?)?;
    info!("Exported {} holdout feedback rows to {:?}", rows.len(), path);
    Ok(rows.len())
}

/// Liked articles per user from a holdout file.
pub fn load_holdout(path: &Path) -> Result<GroundTruth> {
    let content = std::fs::read_to_string(path)?;
    let rows: Vec<HoldoutRow> = serde_json::from_str(&content)?;

    let mut truth = GroundTruth::new();
    for row in rows {
        if row.feedback_type == FeedbackType::Like {
            truth.entry(row.user_id).or_default().insert(row.article_id);
        }
    }
    Ok(truth)
}
