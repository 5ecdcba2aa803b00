//! Turns a user's search, interaction and feedback history into a
//! weighted keyword-interest vector.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{SignalConfig, SignalWeights};
use crate::db::Repository;
use crate::error::Result;
use crate::models::{FeedbackEvent, InteractionEvent, InteractionKind, SearchEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedKeyword {
    pub keyword: String,
    pub weight: f64,
}

/// Keyword weight accumulator. Contributions are summed per keyword and
/// ties keep the order in which keywords were first seen.
#[derive(Debug, Clone, Default)]
pub struct KeywordWeights {
    entries: Vec<WeightedKeyword>,
    index: HashMap<String, usize>,
}

impl KeywordWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, keyword: &str, weight: f64) {
        match self.index.get(keyword) {
            Some(&i) => self.entries[i].weight += weight,
            None => {
                self.index.insert(keyword.to_string(), self.entries.len());
                self.entries.push(WeightedKeyword {
                    keyword: keyword.to_string(),
                    weight,
                });
            }
        }
    }

    pub fn merge(&mut self, other: KeywordWeights) {
        for entry in other.entries {
            self.add(&entry.keyword, entry.weight);
        }
    }

    pub fn get(&self, keyword: &str) -> Option<f64> {
        self.index.get(keyword).map(|&i| self.entries[i].weight)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Positive keywords only, heaviest first, at most `n`.
    pub fn top(self, n: usize) -> Vec<WeightedKeyword> {
        let mut positive: Vec<WeightedKeyword> = self
            .entries
            .into_iter()
            .filter(|e| e.weight > 0.0)
            .collect();
        // sort_by is stable, so equal weights stay in first-seen order
        positive.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        positive.truncate(n);
        positive
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Too little history; callers fall back to popularity.
    InsufficientSignal,
    Keywords(Vec<WeightedKeyword>),
}

pub struct SignalAggregator {
    repository: Arc<Repository>,
    config: SignalConfig,
    weights: SignalWeights,
}

impl SignalAggregator {
    pub fn new(repository: Arc<Repository>, config: SignalConfig) -> Self {
        let weights = config.weights();
        Self {
            repository,
            config,
            weights,
        }
    }

    pub async fn aggregate(&self, user_id: i64) -> Result<Aggregation> {
        let searches = self.repository.search_events(user_id).await?;
        let interactions = self
            .repository
            .interaction_events(user_id, &InteractionKind::ALL)
            .await?;

        let threshold = self.config.min_activity_threshold;
        if searches.len() < threshold && interactions.len() < threshold {
            debug!(
                user_id,
                searches = searches.len(),
                interactions = interactions.len(),
                "insufficient signal"
            );
            return Ok(Aggregation::InsufficientSignal);
        }

        let feedback = self.repository.feedback_events(user_id).await?;

        let article_ids: Vec<i64> = interactions
            .iter()
            .map(|e| e.article_id)
            .chain(feedback.iter().map(|f| f.article_id))
            .collect();
        let keywords = self.repository.keywords_for_articles(&article_ids).await?;

        let weights = accumulate(
            &searches,
            &interactions,
            &feedback,
            &keywords,
            &self.config,
            &self.weights,
        );
        let top = weights.top(self.config.top_keywords);
        debug!(user_id, keywords = ?top, "aggregated keyword interests");
        Ok(Aggregation::Keywords(top))
    }
}

/// Sums the three signal sources into one accumulator.
pub fn accumulate(
    searches: &[SearchEvent],
    interactions: &[InteractionEvent],
    feedback: &[FeedbackEvent],
    keywords: &HashMap<i64, Vec<String>>,
    config: &SignalConfig,
    weights: &SignalWeights,
) -> KeywordWeights {
    let mut total = search_weights(searches, config.max_search_terms, weights.search);

    let mut from_interactions = KeywordWeights::new();
    for event in interactions {
        for keyword in keywords.get(&event.article_id).into_iter().flatten() {
            from_interactions.add(keyword, weights.interaction);
        }
    }
    total.merge(from_interactions);

    let mut from_feedback = KeywordWeights::new();
    for event in feedback {
        let weight = weights.feedback(event.feedback_type);
        for keyword in keywords.get(&event.article_id).into_iter().flatten() {
            from_feedback.add(keyword, weight);
        }
    }
    total.merge(from_feedback);

    total
}

/// The `limit` most frequent normalized search terms, weighted by count.
fn search_weights(searches: &[SearchEvent], limit: usize, per_search: f64) -> KeywordWeights {
    let mut counts = KeywordWeights::new();
    for search in searches {
        let term = normalize_term(&search.term);
        if !term.is_empty() {
            counts.add(&term, 1.0);
        }
    }

    let mut weights = KeywordWeights::new();
    for entry in counts.top(limit) {
        weights.add(&entry.keyword, entry.weight * per_search);
    }
    weights
}

pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightingScheme;
    use crate::models::FeedbackType;
    use chrono::Utc;

    fn search(term: &str) -> SearchEvent {
        SearchEvent {
            term: term.to_string(),
            searched_at: Utc::now(),
        }
    }

    fn interaction(article_id: i64, kind: InteractionKind) -> InteractionEvent {
        InteractionEvent {
            user_id: 1,
            article_id,
            kind,
            read_time: None,
            scroll_depth: None,
            logged_at: Utc::now(),
        }
    }

    fn feedback(article_id: i64, feedback_type: FeedbackType) -> FeedbackEvent {
        FeedbackEvent {
            user_id: 1,
            article_id,
            feedback_type,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn top_drops_non_positive_and_keeps_first_seen_ties() {
        let mut weights = KeywordWeights::new();
        weights.add("b", 1.0);
        weights.add("a", 1.0);
        weights.add("c", 3.0);
        weights.add("d", -1.0);
        weights.add("e", 0.5);
        weights.add("e", -0.5);

        let top: Vec<_> = weights.top(5).into_iter().map(|w| w.keyword).collect();
        assert_eq!(top, vec!["c", "b", "a"]);
    }

    #[test]
    fn merge_sums_shared_keywords() {
        let mut left = KeywordWeights::new();
        left.add("rust", 1.0);
        let mut right = KeywordWeights::new();
        right.add("rust", 0.5);
        right.add("go", 2.0);

        left.merge(right);
        assert_eq!(left.get("rust"), Some(1.5));
        assert_eq!(left.get("go"), Some(2.0));
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn search_terms_are_normalized_and_capped() {
        let searches: Vec<_> = ["Rust", " rust ", "go", "zig", "c", "d", "e"]
            .iter()
            .map(|t| search(t))
            .collect();
        let weights = search_weights(&searches, 5, 1.0);
        assert_eq!(weights.get("rust"), Some(2.0));
        assert_eq!(weights.len(), 5);
        assert!(weights.get("e").is_none());
    }

    #[test]
    fn canonical_weights_combine_all_sources() {
        let mut keywords = HashMap::new();
        keywords.insert(10, vec!["rust".to_string(), "async".to_string()]);
        keywords.insert(20, vec!["crypto".to_string()]);
        keywords.insert(30, vec!["async".to_string()]);

        let searches = vec![search("crypto")];
        let interactions = vec![
            interaction(10, InteractionKind::View),
            interaction(10, InteractionKind::Read),
            interaction(20, InteractionKind::ClickExternalLink),
        ];
        let feedback = vec![
            feedback(20, FeedbackType::Dislike),
            feedback(30, FeedbackType::Like),
        ];
        let config = SignalConfig::default();
        let weights = SignalWeights::for_scheme(WeightingScheme::Canonical);

        let total = accumulate(&searches, &interactions, &feedback, &keywords, &config, &weights);
        assert_eq!(total.get("rust"), Some(1.0));
        assert_eq!(total.get("async"), Some(3.0));
        // 1 search + 0.5 click - 2 dislike
        assert_eq!(total.get("crypto"), Some(-0.5));

        let top: Vec<_> = total.top(5).into_iter().map(|w| w.keyword).collect();
        assert_eq!(top, vec!["async", "rust"]);
    }

    #[test]
    fn graded_scheme_changes_feedback_weights() {
        let mut keywords = HashMap::new();
        keywords.insert(1, vec!["ai".to_string()]);
        let config = SignalConfig {
            scheme: WeightingScheme::Graded,
            ..SignalConfig::default()
        };
        let total = accumulate(
            &[],
            &[interaction(1, InteractionKind::Read)],
            &[feedback(1, FeedbackType::Like)],
            &keywords,
            &config,
            &config.weights(),
        );
        assert_eq!(total.get("ai"), Some(2.5));
    }
}
