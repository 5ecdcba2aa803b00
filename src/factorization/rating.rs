//! SVD++ rating regression.
//!
//! Prediction for user `u` and item `i`:
//!
//! ```text
//! r̂ = μ + b_u + b_i + q_i · (p_u + |N(u)|^-½ Σ_{j ∈ N(u)} y_j)
//! ```
//!
//! where `N(u)` is the set of items `u` rated in training. Parameters are
//! fitted by stochastic gradient descent over a seeded shuffle of the
//! ratings each epoch.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RatingConfig;
use crate::error::{AppError, Result};

use super::data::{IdIndex, Rating};
use super::{dot, gaussian_rows};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingModel {
    users: IdIndex,
    items: IdIndex,
    global_mean: f64,
    user_bias: Vec<f64>,
    item_bias: Vec<f64>,
    user_factors: Vec<Vec<f64>>,
    item_factors: Vec<Vec<f64>>,
    implicit_factors: Vec<Vec<f64>>,
    rated_items: Vec<Vec<usize>>,
    min_rating: f64,
    max_rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingPrediction {
    pub value: f64,
    /// The user or the item was never seen in training; `value` is the global mean.
    pub impossible: bool,
}

impl RatingModel {
    pub fn knows_user(&self, user_id: i64) -> bool {
        self.users.get(user_id).is_some()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn predict(&self, user_id: i64, article_id: i64) -> RatingPrediction {
        match (self.users.get(user_id), self.items.get(article_id)) {
            (Some(u), Some(i)) => {
                let user_vector = self.user_vector(u);
                let raw = self.global_mean
                    + self.user_bias[u]
                    + self.item_bias[i]
                    + dot(&self.item_factors[i], &user_vector);
                RatingPrediction {
                    value: raw.clamp(self.min_rating, self.max_rating),
                    impossible: false,
                }
            }
            _ => RatingPrediction {
                value: self.global_mean.clamp(self.min_rating, self.max_rating),
                impossible: true,
            },
        }
    }

    fn user_vector(&self, u: usize) -> Vec<f64> {
        let mut vector = self.user_factors[u].clone();
        let rated = &self.rated_items[u];
        if rated.is_empty() {
            return vector;
        }
        let norm = (rated.len() as f64).sqrt();
        for &j in rated {
            for (v, y) in vector.iter_mut().zip(&self.implicit_factors[j]) {
                *v += y / norm;
            }
        }
        vector
    }
}

/// Reconstruction quality on the held-out split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldoutReport {
    pub train_size: usize,
    pub test_size: usize,
    /// Over possible predictions only; `None` when there were none.
    pub rmse: Option<f64>,
    pub impossible: usize,
    pub cold_start_users: usize,
    pub cold_start_items: usize,
}

pub struct RatingTrainer {
    config: RatingConfig,
}

impl RatingTrainer {
    pub fn new(config: RatingConfig) -> Self {
        Self { config }
    }

    pub fn train(&self, ratings: &[Rating]) -> Result<RatingModel> {
        if ratings.is_empty() {
            return Err(AppError::InvalidInput("no ratings to train on".into()));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let factors = self.config.factors;
        let lr = self.config.learning_rate;
        let reg = self.config.regularization;
        let (min_rating, max_rating) = self.config.scale.bounds();

        let mut users = IdIndex::default();
        let mut items = IdIndex::default();
        let mut samples = Vec::with_capacity(ratings.len());
        for rating in ratings {
            let u = users.insert(rating.user_id);
            let i = items.insert(rating.article_id);
            samples.push((u, i, rating.value));
        }

        let mut rated_items = vec![Vec::new(); users.len()];
        for &(u, i, _) in &samples {
            rated_items[u].push(i);
        }

        let global_mean = samples.iter().map(|s| s.2).sum::<f64>() / samples.len() as f64;
        let mut user_bias = vec![0.0; users.len()];
        let mut item_bias = vec![0.0; items.len()];
        let mut user_factors = gaussian_rows(&mut rng, users.len(), factors, self.config.init_std);
        let mut item_factors = gaussian_rows(&mut rng, items.len(), factors, self.config.init_std);
        let mut implicit_factors =
            gaussian_rows(&mut rng, items.len(), factors, self.config.init_std);

        for epoch in 0..self.config.epochs {
            samples.shuffle(&mut rng);
            let mut squared_error = 0.0;

            for &(u, i, rating) in &samples {
                let rated = &rated_items[u];
                let norm = (rated.len() as f64).sqrt();

                let mut implicit_sum = vec![0.0; factors];
                for &j in rated {
                    for (s, y) in implicit_sum.iter_mut().zip(&implicit_factors[j]) {
                        *s += y / norm;
                    }
                }

                let estimate = global_mean
                    + user_bias[u]
                    + item_bias[i]
                    + item_factors[i]
                        .iter()
                        .zip(user_factors[u].iter().zip(&implicit_sum))
                        .map(|(q, (p, s))| q * (p + s))
                        .sum::<f64>();
                let err = rating - estimate;
                squared_error += err * err;

                user_bias[u] += lr * (err - reg * user_bias[u]);
                item_bias[i] += lr * (err - reg * item_bias[i]);

                for f in 0..factors {
                    let p = user_factors[u][f];
                    let q = item_factors[i][f];
                    user_factors[u][f] += lr * (err * q - reg * p);
                    item_factors[i][f] += lr * (err * (p + implicit_sum[f]) - reg * q);
                    for &j in rated {
                        let y = implicit_factors[j][f];
                        implicit_factors[j][f] += lr * (err * q / norm - reg * y);
                    }
                }
            }

            debug!(
                epoch,
                rmse = (squared_error / samples.len() as f64).sqrt(),
                "svd++ epoch"
            );
        }

        info!(
            users = users.len(),
            items = items.len(),
            ratings = samples.len(),
            "trained rating model"
        );

        Ok(RatingModel {
            users,
            items,
            global_mean,
            user_bias,
            item_bias,
            user_factors,
            item_factors,
            implicit_factors,
            rated_items,
            min_rating,
            max_rating,
        })
    }

    /// Trains on a seeded split and scores the held-out part.
    pub fn train_with_holdout(&self, ratings: &[Rating]) -> Result<(RatingModel, HoldoutReport)> {
        let mut shuffled = ratings.to_vec();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        shuffled.shuffle(&mut rng);

        let mut test_size = (shuffled.len() as f64 * self.config.test_fraction).ceil() as usize;
        if test_size >= shuffled.len() {
            test_size = shuffled.len().saturating_sub(1);
        }
        let (test, train) = shuffled.split_at(test_size);

        let model = self.train(train)?;

        let train_users: HashSet<i64> = train.iter().map(|r| r.user_id).collect();
        let train_items: HashSet<i64> = train.iter().map(|r| r.article_id).collect();

        let mut squared_error = 0.0;
        let mut possible = 0usize;
        let mut impossible = 0usize;
        for rating in test {
            let prediction = model.predict(rating.user_id, rating.article_id);
            if prediction.impossible {
                impossible += 1;
            } else {
                possible += 1;
                squared_error += (rating.value - prediction.value).powi(2);
            }
        }

        let report = HoldoutReport {
            train_size: train.len(),
            test_size: test.len(),
            rmse: (possible > 0).then(|| (squared_error / possible as f64).sqrt()),
            impossible,
            cold_start_users: test.iter().filter(|r| !train_users.contains(&r.user_id)).count(),
            cold_start_items: test.iter().filter(|r| !train_items.contains(&r.article_id)).count(),
        };
        info!(?report, "rating model holdout");

        Ok((model, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(user_id: i64, article_id: i64, value: f64) -> Rating {
        Rating {
            user_id,
            article_id,
            value,
        }
    }

    fn dataset() -> Vec<Rating> {
        vec![
            rating(1, 100, 5.0),
            rating(2, 100, 5.0),
            rating(2, 200, 1.0),
            rating(3, 200, 1.0),
            rating(3, 300, 10.0),
            rating(4, 300, 10.0),
            rating(4, 200, 1.0),
        ]
    }

    #[test]
    fn read_article_outranks_an_unrated_one() {
        let model = RatingTrainer::new(RatingConfig::default()).train(&dataset()).unwrap();

        let read = model.predict(1, 100);
        let unrated = model.predict(1, 200);
        assert!(!read.impossible && !unrated.impossible);
        assert!(
            read.value > unrated.value,
            "read {} vs unrated {}",
            read.value,
            unrated.value
        );
    }

    #[test]
    fn training_is_reproducible_under_a_fixed_seed() {
        let trainer = RatingTrainer::new(RatingConfig::default());
        assert_eq!(trainer.train(&dataset()).unwrap(), trainer.train(&dataset()).unwrap());
    }

    #[test]
    fn unknown_pairs_fall_back_to_the_global_mean() {
        let model = RatingTrainer::new(RatingConfig::default()).train(&dataset()).unwrap();
        let prediction = model.predict(99, 100);
        assert!(prediction.impossible);
        assert!((prediction.value - 33.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn predictions_stay_on_the_rating_scale() {
        let model = RatingTrainer::new(RatingConfig::default()).train(&dataset()).unwrap();
        for user in 1..=4 {
            for item in [100, 200, 300] {
                let value = model.predict(user, item).value;
                assert!((0.1..=10.0).contains(&value));
            }
        }
    }

    #[test]
    fn holdout_reports_split_sizes() {
        let config = RatingConfig {
            test_fraction: 0.3,
            ..RatingConfig::default()
        };
        let (_, report) = RatingTrainer::new(config).train_with_holdout(&dataset()).unwrap();
        assert_eq!(report.test_size, 3);
        assert_eq!(report.train_size, 4);
        assert!(report.impossible <= report.test_size);
        assert_eq!(report.rmse.is_none(), report.impossible == report.test_size);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(RatingTrainer::new(RatingConfig::default()).train(&[]).is_err());
    }
}
