#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use article_recommender::config::{Config, KeywordConfig};
use article_recommender::db::Repository;
use article_recommender::engine::Engine;
use article_recommender::models::{InteractionKind, NewArticle, NewInteraction};

/// Keywords per article, in insertion order. Later articles are newer.
pub const CATALOG: [&[&str]; 8] = [
    &["rust", "systems"],
    &["rust"],
    &["rust", "async"],
    &["python"],
    &["python", "data"],
    &["golang"],
    &["golang", "systems"],
    &["rust", "python"],
];

pub struct Fixture {
    pub repository: Arc<Repository>,
    pub articles: Vec<i64>,
    pub model_dir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let repository = Arc::new(Repository::in_memory().await.unwrap());
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

        let mut articles = Vec::new();
        for (i, keywords) in CATALOG.iter().enumerate() {
            let id = repository
                .insert_article(NewArticle {
                    title: format!("Story {}", i + 1),
                    summary: Some(format!("About {}", keywords.join(" and "))),
                    category: Some("tech".to_string()),
                    published_at: Some(base + Duration::days(i as i64)),
                    url: format!("https://news.example/story-{}", i + 1),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .await
                .unwrap();
            articles.push(id);
        }

        Self {
            repository,
            articles,
            model_dir: TempDir::new().unwrap(),
        }
    }

    /// The article at 1-based catalog position `n`.
    pub fn article(&self, n: usize) -> i64 {
        self.articles[n - 1]
    }

    pub async fn user(&self, name: &str) -> i64 {
        self.repository.insert_user(name).await.unwrap()
    }

    pub async fn interact(&self, user_id: i64, n: usize, kind: InteractionKind) {
        self.repository
            .log_interaction(NewInteraction::new(user_id, self.article(n), kind))
            .await
            .unwrap();
    }

    pub fn config(&self) -> Config {
        config_for(self.model_dir.path())
    }

    pub fn engine(&self) -> Engine {
        Engine::with_repository(Arc::clone(&self.repository), self.config())
    }
}

pub fn config_for(model_dir: &Path) -> Config {
    Config {
        db_path: ":memory:".to_string(),
        model_dir: model_dir.to_string_lossy().to_string(),
        keyword: KeywordConfig {
            seed: Some(7),
            ..KeywordConfig::default()
        },
        ..Config::default()
    }
}
