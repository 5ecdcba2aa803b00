use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::signals::WeightedKeyword;

/// Draws up to `count` indices without replacement, each draw proportional
/// to the weights still in the pool. Non-positive weights are never drawn.
pub fn sample_without_replacement<R: Rng + ?Sized>(
    rng: &mut R,
    weights: &[f64],
    count: usize,
) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > 0.0).collect();
    let mut picked = Vec::with_capacity(count.min(pool.len()));

    while picked.len() < count && !pool.is_empty() {
        let total: f64 = pool.iter().map(|&i| weights[i]).sum();
        let mut target = rng.gen::<f64>() * total;

        let mut chosen = pool.len() - 1;
        for (slot, &i) in pool.iter().enumerate() {
            if target < weights[i] {
                chosen = slot;
                break;
            }
            target -= weights[i];
        }
        picked.push(pool.remove(chosen));
    }

    picked
}

/// Seedable keyword sampler shared by concurrent scoring calls.
pub struct KeywordSampler {
    rng: Mutex<StdRng>,
}

impl KeywordSampler {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Samples keywords using their weights as probabilities, in draw order.
    pub fn sample(&self, keywords: &[WeightedKeyword], count: usize) -> Vec<WeightedKeyword> {
        let weights: Vec<f64> = keywords.iter().map(|k| k.weight).collect();
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sample_without_replacement(&mut *rng, &weights, count)
            .into_iter()
            .map(|i| keywords[i].clone())
            .collect()
    }
}
