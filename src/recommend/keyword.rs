use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{KeywordConfig, SignalConfig};
use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;

use super::sampling::KeywordSampler;
use super::signals::{Aggregation, SignalAggregator};

/// Ranks articles from a user's sampled keyword interests.
pub struct KeywordScorer {
    repository: Arc<Repository>,
    aggregator: SignalAggregator,
    sampler: KeywordSampler,
    config: KeywordConfig,
}

impl KeywordScorer {
    pub fn new(
        repository: Arc<Repository>,
        signals: SignalConfig,
        config: KeywordConfig,
    ) -> Self {
        Self {
            aggregator: SignalAggregator::new(Arc::clone(&repository), signals),
            sampler: KeywordSampler::new(config.seed),
            repository,
            config,
        }
    }

    /// At most `top_n` distinct articles. Store failures yield an empty list.
    pub async fn score(&self, user_id: i64, top_n: usize) -> Vec<Article> {
        if top_n == 0 {
            return Vec::new();
        }
        match self.try_score(user_id, top_n).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!("Keyword scoring failed for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    async fn try_score(&self, user_id: i64, top_n: usize) -> Result<Vec<Article>> {
        let disliked = self.repository.disliked_article_ids(user_id).await?;

        let keywords = match self.aggregator.aggregate(user_id).await? {
            Aggregation::Keywords(keywords) if !keywords.is_empty() => keywords,
            _ => return self.popular(top_n, &disliked).await,
        };

        let sampled = self.sampler.sample(&keywords, self.config.sampled_keywords);
        if sampled.is_empty() {
            return self.popular(top_n, &disliked).await;
        }
        debug!(
            user_id,
            sampled = ?sampled.iter().map(|k| k.keyword.as_str()).collect::<Vec<_>>(),
            "sampled keywords"
        );

        let per_keyword = (top_n / sampled.len()).saturating_add(self.config.oversample);
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for keyword in &sampled {
            let articles = self
                .repository
                .articles_by_keyword(&keyword.keyword, &disliked, per_keyword)
                .await?;
            for article in articles {
                if seen.insert(article.id) {
                    merged.push(article);
                }
            }
        }

        merged.truncate(top_n);
        Ok(merged)
    }

    /// The popularity list with the user's dislikes removed.
    async fn popular(&self, top_n: usize, disliked: &HashSet<i64>) -> Result<Vec<Article>> {
        let mut articles = self
            .repository
            .popular_articles(top_n.saturating_add(disliked.len()))
            .await?;
        articles.retain(|a| !disliked.contains(&a.id));
        articles.truncate(top_n);
        Ok(articles)
    }
}
