//! Provenance ledger: every list shown to a user, with the algorithm and
//! batch that produced it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::RecommendationEntry;

const BATCH_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub batch_id: String,
    pub inserted: usize,
    /// Rows whose (user, article, batch) key was already present.
    pub skipped: usize,
    pub failed: usize,
}

pub struct RecommendationLedger {
    repository: Arc<Repository>,
}

impl RecommendationLedger {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub fn new_batch_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BATCH_ID_LEN)
            .map(char::from)
            .collect()
    }

    /// Records `article_ids` as ranks 1..=N with score 1/rank.
    ///
    /// Duplicate keys are skipped and a failed row does not stop the rest.
    pub async fn record(
        &self,
        user_id: i64,
        article_ids: &[i64],
        batch_id: Option<&str>,
        session_id: Option<&str>,
        algorithm_version: &str,
    ) -> RecordSummary {
        let batch_id = batch_id
            .map(str::to_string)
            .unwrap_or_else(Self::new_batch_id);
        let recommended_at = Utc::now();
        let mut summary = RecordSummary {
            batch_id: batch_id.clone(),
            inserted: 0,
            skipped: 0,
            failed: 0,
        };

        for (position, &article_id) in article_ids.iter().enumerate() {
            let rank = position as u32 + 1;
            let entry = RecommendationEntry {
                user_id,
                article_id,
                rank,
                score: 1.0 / rank as f64,
                batch_id: batch_id.clone(),
                session_id: session_id.map(str::to_string),
                algorithm_version: algorithm_version.to_string(),
                recommended_at,
            };
            match self.repository.insert_recommendation(entry).await {
                Ok(true) => summary.inserted += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    error!(
                        "Failed to record article {} for user {} in batch {}: {}",
                        article_id, user_id, batch_id, e
                    );
                    summary.failed += 1;
                }
            }
        }

        debug!(user_id, ?summary, "recorded recommendations");
        summary
    }

    pub async fn entries_for_batch(&self, batch_id: &str) -> Result<Vec<RecommendationEntry>> {
        self.repository.entries_for_batch(batch_id).await
    }

    pub async fn entries_for_user(&self, user_id: i64) -> Result<Vec<RecommendationEntry>> {
        self.repository.entries_for_user(user_id).await
    }

    /// What one algorithm showed each user in a batch, in rank order.
    ///
    /// A gap in a list's ranks is an error: the row was either never written
    /// or lost its key to another algorithm recorded under the same batch, so
    /// the stored list is not what the user saw. A lost trailing row leaves
    /// no gap; `evaluation::run` gives each algorithm its own batch.
    pub async fn predictions_for_batch(
        &self,
        batch_id: &str,
        algorithm_version: &str,
    ) -> Result<HashMap<i64, Vec<i64>>> {
        let mut predictions: HashMap<i64, Vec<i64>> = HashMap::new();
        for entry in self.repository.entries_for_batch(batch_id).await? {
            if entry.algorithm_version != algorithm_version {
                continue;
            }
            let list = predictions.entry(entry.user_id).or_default();
            let expected = list.len() as u32 + 1;
            if entry.rank != expected {
                return Err(AppError::IncompleteBatch {
                    batch_id: batch_id.to_string(),
                    algorithm_version: algorithm_version.to_string(),
                    user_id: entry.user_id,
                    rank: expected,
                });
            }
            list.push(entry.article_id);
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_are_short_alphanumeric_tokens() {
        let id = RecommendationLedger::new_batch_id();
        assert_eq!(id.len(), BATCH_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, RecommendationLedger::new_batch_id());
    }
}
