mod data;
mod implicit;
mod model;
mod rating;
mod scorer;
mod training;

pub use data::{build_implicit, build_ratings, IdIndex, ImplicitEntry, Rating};
pub use implicit::{ImplicitModel, ImplicitTrainer};
pub use model::{FactorModel, ModelArtifact, ModelHandle};
pub use rating::{HoldoutReport, RatingModel, RatingPrediction, RatingTrainer};
pub use scorer::LatentFactorScorer;
pub use training::{train, train_and_save, TrainingReport};

use rand::Rng;

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `rows` vectors of length `cols` drawn from N(0, std²) via Box-Muller.
fn gaussian_rows<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize, std: f64) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| {
            (0..cols)
                .map(|_| {
                    let u1 = 1.0 - rng.gen::<f64>();
                    let u2 = rng.gen::<f64>();
                    std * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
                })
                .collect()
        })
        .collect()
}
