//! Implicit-feedback factorization trained with a WARP-style ranking loss.
//!
//! Only the relative order of observed and unobserved items matters: for
//! each positive pair a negative is sampled until one scores within the
//! margin of the positive, and the update is scaled by an estimate of how
//! far the positive currently ranks from the top.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ImplicitConfig;
use crate::error::{AppError, Result};

use super::data::{IdIndex, ImplicitEntry};
use super::dot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplicitModel {
    users: IdIndex,
    items: IdIndex,
    user_factors: Vec<Vec<f64>>,
    item_factors: Vec<Vec<f64>>,
    item_bias: Vec<f64>,
}

impl ImplicitModel {
    pub fn knows_user(&self, user_id: i64) -> bool {
        self.users.get(user_id).is_some()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Unscaled affinity; `None` if the user or the article is unknown.
    pub fn score(&self, user_id: i64, article_id: i64) -> Option<f64> {
        let u = self.users.get(user_id)?;
        let i = self.items.get(article_id)?;
        Some(dot(&self.user_factors[u], &self.item_factors[i]) + self.item_bias[i])
    }
}

pub struct ImplicitTrainer {
    config: ImplicitConfig,
}

impl ImplicitTrainer {
    pub fn new(config: ImplicitConfig) -> Self {
        Self { config }
    }

    /// `catalog` lists every article that may later be scored.
    pub fn train(&self, entries: &[ImplicitEntry], catalog: &[i64]) -> Result<ImplicitModel> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let factors = self.config.factors;
        let lr = self.config.learning_rate;
        let reg = self.config.regularization;

        let mut users = IdIndex::default();
        let mut items = IdIndex::default();
        for &article_id in catalog {
            items.insert(article_id);
        }

        let mut positives = Vec::new();
        let mut negatives: Vec<(usize, usize, f64)> = Vec::new();
        for entry in entries {
            let u = users.insert(entry.user_id);
            let i = items.insert(entry.article_id);
            if entry.weight > 0.0 {
                positives.push((u, i, entry.weight));
            } else if entry.weight < 0.0 {
                negatives.push((u, i, -entry.weight));
            }
        }
        if positives.is_empty() {
            return Err(AppError::InvalidInput("no positive interactions to train on".into()));
        }

        let mut liked: Vec<HashSet<usize>> = vec![HashSet::new(); users.len()];
        for &(u, i, _) in &positives {
            liked[u].insert(i);
        }
        let mut disliked: Vec<Vec<(usize, f64)>> = vec![Vec::new(); users.len()];
        for &(u, i, w) in &negatives {
            disliked[u].push((i, w));
        }

        let n_items = items.len();
        let scale = 1.0 / factors as f64;
        let mut user_factors: Vec<Vec<f64>> = (0..users.len())
            .map(|_| (0..factors).map(|_| (rng.gen::<f64>() - 0.5) * scale).collect())
            .collect();
        let mut item_factors: Vec<Vec<f64>> = (0..n_items)
            .map(|_| (0..factors).map(|_| (rng.gen::<f64>() - 0.5) * scale).collect())
            .collect();
        let mut item_bias = vec![0.0; n_items];

        for epoch in 0..self.config.epochs {
            positives.shuffle(&mut rng);
            let mut violations = 0usize;

            for &(u, i, weight) in &positives {
                let positive_score = dot(&user_factors[u], &item_factors[i]) + item_bias[i];

                for trial in 1..=self.config.max_sampled {
                    // disliked items are tried first, then uniform draws
                    let (j, negative_weight) = if trial == 1 && !disliked[u].is_empty() {
                        disliked[u][rng.gen_range(0..disliked[u].len())]
                    } else {
                        (rng.gen_range(0..n_items), 1.0)
                    };
                    if liked[u].contains(&j) {
                        continue;
                    }

                    let negative_score = dot(&user_factors[u], &item_factors[j]) + item_bias[j];
                    if negative_score <= positive_score - 1.0 {
                        continue;
                    }

                    let rank_estimate = ((n_items - 1) / trial) as f64;
                    let loss = weight * negative_weight * (1.0 + rank_estimate).ln();

                    for f in 0..factors {
                        let p = user_factors[u][f];
                        let q_pos = item_factors[i][f];
                        let q_neg = item_factors[j][f];
                        user_factors[u][f] += lr * (loss * (q_pos - q_neg) - reg * p);
                        item_factors[i][f] += lr * (loss * p - reg * q_pos);
                        item_factors[j][f] += lr * (-loss * p - reg * q_neg);
                    }
                    item_bias[i] += lr * (loss - reg * item_bias[i]);
                    item_bias[j] += lr * (-loss - reg * item_bias[j]);
                    violations += 1;
                    break;
                }
            }

            debug!(epoch, violations, "warp epoch");
        }

        info!(
            users = users.len(),
            items = n_items,
            positives = positives.len(),
            "trained implicit model"
        );

        Ok(ImplicitModel {
            users,
            items,
            user_factors,
            item_factors,
            item_bias,
        })
    }
}
