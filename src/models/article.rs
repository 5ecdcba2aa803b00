use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
}

/// An article as handed over by the ingestion side, keywords included.
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
    pub keywords: Vec<String>,
}
