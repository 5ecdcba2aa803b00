use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;

use super::model::{ModelArtifact, ModelHandle};

/// Serves a trained latent-factor model against the live catalog.
pub struct LatentFactorScorer {
    repository: Arc<Repository>,
    handle: Arc<ModelHandle>,
}

impl LatentFactorScorer {
    pub fn new(repository: Arc<Repository>, handle: Arc<ModelHandle>) -> Self {
        Self { repository, handle }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    /// Ranked unseen articles for `user_id`. A missing model or a store
    /// failure yields an empty list.
    pub async fn recommend(&self, user_id: i64, top_n: usize) -> Vec<Article> {
        if top_n == 0 {
            return Vec::new();
        }
        let Some(artifact) = self.handle.get_or_reload().await else {
            return Vec::new();
        };
        match self.try_recommend(&artifact, user_id, top_n).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(
                    "{} scoring failed for user {}: {}",
                    self.handle.algorithm(),
                    user_id,
                    e
                );
                Vec::new()
            }
        }
    }

    async fn try_recommend(
        &self,
        artifact: &ModelArtifact,
        user_id: i64,
        top_n: usize,
    ) -> Result<Vec<Article>> {
        let seen = self.repository.seen_article_ids(user_id).await?;
        let catalog = self.repository.all_article_ids().await?;

        let mut candidates: Vec<i64> = catalog.difference(&seen).copied().collect();
        candidates.sort_unstable();

        if candidates.is_empty() {
            debug!(user_id, "seen set covers the catalog, using popularity");
            return self.repository.popular_articles(top_n).await;
        }
        if !artifact.model.knows_user(user_id) {
            debug!(user_id, "user unknown to the model, using popularity");
            return self.popular_unseen(top_n, &seen).await;
        }

        let ranked: Vec<i64> = artifact
            .model
            .rank(user_id, &candidates)
            .into_iter()
            .take(top_n)
            .map(|(article_id, _)| article_id)
            .collect();
        self.repository.articles_by_ids(&ranked).await
    }

    async fn popular_unseen(&self, top_n: usize, seen: &HashSet<i64>) -> Result<Vec<Article>> {
        let mut articles = self
            .repository
            .popular_articles(top_n.saturating_add(seen.len()))
            .await?;
        articles.retain(|a| !seen.contains(&a.id));
        articles.truncate(top_n);
        Ok(articles)
    }
}
