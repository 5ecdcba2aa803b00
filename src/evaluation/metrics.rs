//! Top-k ranking metrics with binary relevance.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::ApDivisor;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RankingMetrics {
    pub map: f64,
    pub ndcg: f64,
    pub hit_rate: f64,
    /// Users with at least one relevant article.
    pub users: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PrecisionRecall {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub users: usize,
}

pub fn average_precision(
    predicted: &[i64],
    relevant: &HashSet<i64>,
    k: usize,
    divisor: ApDivisor,
) -> f64 {
    if relevant.is_empty() || k == 0 {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut score = 0.0;
    for (i, article_id) in predicted.iter().take(k).enumerate() {
        if relevant.contains(article_id) {
            hits += 1;
            score += hits as f64 / (i + 1) as f64;
        }
    }

    let denominator = match divisor {
        ApDivisor::MinTruthK => relevant.len().min(k),
        ApDivisor::TruthCount => relevant.len(),
    };
    score / denominator as f64
}

pub fn ndcg(predicted: &[i64], relevant: &HashSet<i64>, k: usize) -> f64 {
    let dcg: f64 = predicted
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, article_id)| relevant.contains(*article_id))
        .map(|(i, _)| 1.0 / (i as f64 + 2.0).log2())
        .sum();

    let ideal: f64 = (0..relevant.len().min(k))
        .map(|i| 1.0 / (i as f64 + 2.0).log2())
        .sum();

    if ideal > 0.0 {
        dcg / ideal
    } else {
        0.0
    }
}

pub fn hit(predicted: &[i64], relevant: &HashSet<i64>, k: usize) -> bool {
    predicted.iter().take(k).any(|a| relevant.contains(a))
}

/// MAP@k, NDCG@k and HitRate@k averaged over users with a non-empty
/// relevant set. A user missing from `predicted` scores zero.
pub fn evaluate(
    predicted: &HashMap<i64, Vec<i64>>,
    ground_truth: &HashMap<i64, HashSet<i64>>,
    k: usize,
    divisor: ApDivisor,
) -> RankingMetrics {
    let mut users: Vec<i64> = ground_truth
        .iter()
        .filter(|(_, relevant)| !relevant.is_empty())
        .map(|(&user_id, _)| user_id)
        .collect();
    if users.is_empty() {
        return RankingMetrics::default();
    }
    users.sort_unstable();

    let empty = Vec::new();
    let mut totals = RankingMetrics::default();
    for user_id in &users {
        let relevant = &ground_truth[user_id];
        let list = predicted.get(user_id).unwrap_or(&empty);
        totals.map += average_precision(list, relevant, k, divisor);
        totals.ndcg += ndcg(list, relevant, k);
        if hit(list, relevant, k) {
            totals.hit_rate += 1.0;
        }
    }

    let n = users.len() as f64;
    RankingMetrics {
        map: totals.map / n,
        ndcg: totals.ndcg / n,
        hit_rate: totals.hit_rate / n,
        users: users.len(),
    }
}

/// Set precision and recall over the top-k, averaged over users that have
/// both relevant articles and predictions. F1 is taken from the averages.
pub fn precision_recall(
    predicted: &HashMap<i64, Vec<i64>>,
    ground_truth: &HashMap<i64, HashSet<i64>>,
    k: usize,
) -> PrecisionRecall {
    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut users = 0usize;

    for (user_id, relevant) in ground_truth {
        let top: HashSet<i64> = predicted
            .get(user_id)
            .map(|list| list.iter().take(k).copied().collect())
            .unwrap_or_default();
        if relevant.is_empty() || top.is_empty() {
            continue;
        }
        let hits = relevant.intersection(&top).count() as f64;
        precision += hits / top.len() as f64;
        recall += hits / relevant.len() as f64;
        users += 1;
    }

    if users == 0 {
        return PrecisionRecall::default();
    }

    let precision = precision / users as f64;
    let recall = recall / users as f64;
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    PrecisionRecall {
        precision,
        recall,
        f1,
        users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[i64]) -> HashSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn single_hit_at_rank_two() {
        let predicted = HashMap::from([(1, vec![1, 2, 3])]);
        let truth = HashMap::from([(1, set(&[2]))]);

        let metrics = evaluate(&predicted, &truth, 3, ApDivisor::MinTruthK);
        assert!((metrics.map - 0.5).abs() < 1e-12);
        assert!((metrics.ndcg - 1.0 / 3f64.log2()).abs() < 1e-12);
        assert!((metrics.ndcg - 0.6309).abs() < 1e-4);
        assert_eq!(metrics.hit_rate, 1.0);
        assert_eq!(metrics.users, 1);
    }

    #[test]
    fn users_without_positives_are_excluded() {
        let predicted = HashMap::from([(1, vec![1, 2, 3]), (2, vec![4, 5])]);
        let truth = HashMap::from([(1, set(&[1])), (2, set(&[]))]);

        let metrics = evaluate(&predicted, &truth, 3, ApDivisor::MinTruthK);
        assert_eq!(metrics.users, 1);
        assert_eq!(metrics.map, 1.0);
        assert_eq!(metrics.hit_rate, 1.0);
    }

    #[test]
    fn divisor_variants_differ_when_truth_exceeds_k() {
        let relevant = set(&[1, 2, 3, 4]);
        let predicted = [1, 9, 2];
        let capped = average_precision(&predicted, &relevant, 2, ApDivisor::MinTruthK);
        let full = average_precision(&predicted, &relevant, 2, ApDivisor::TruthCount);
        assert_eq!(capped, 0.5);
        assert_eq!(full, 0.25);
    }

    #[test]
    fn perfect_ranking_has_unit_ndcg() {
        assert!((ndcg(&[1, 2, 9], &set(&[1, 2]), 3) - 1.0).abs() < 1e-12);
        assert_eq!(ndcg(&[1, 2], &set(&[]), 3), 0.0);
    }

    #[test]
    fn missing_predictions_count_as_misses() {
        let truth = HashMap::from([(1, set(&[1])), (2, set(&[2]))]);
        let predicted = HashMap::from([(1, vec![1])]);
        let metrics = evaluate(&predicted, &truth, 5, ApDivisor::MinTruthK);
        assert_eq!(metrics.hit_rate, 0.5);
        assert_eq!(metrics.map, 0.5);
    }

    #[test]
    fn precision_recall_skips_users_without_predictions() {
        let predicted = HashMap::from([(1, vec![1, 2, 3, 4]), (2, vec![])]);
        let truth = HashMap::from([(1, set(&[1, 5])), (2, set(&[7]))]);

        let pr = precision_recall(&predicted, &truth, 4);
        assert_eq!(pr.users, 1);
        assert_eq!(pr.precision, 0.25);
        assert_eq!(pr.recall, 0.5);
        assert!((pr.f1 - 1.0 / 3.0).abs() < 1e-12);
    }
}
