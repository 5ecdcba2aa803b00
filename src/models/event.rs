use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub term: String,
    pub searched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Read,
    ClickExternalLink,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [
        InteractionKind::View,
        InteractionKind::Read,
        InteractionKind::ClickExternalLink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Read => "read",
            InteractionKind::ClickExternalLink => "click_external_link",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(InteractionKind::View),
            "read" => Ok(InteractionKind::Read),
            "click_external_link" => Ok(InteractionKind::ClickExternalLink),
            other => Err(AppError::InvalidInput(format!(
                "unknown interaction kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: i64,
    pub article_id: i64,
    pub kind: InteractionKind,
    pub read_time: Option<f64>,
    pub scroll_depth: Option<f64>,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub user_id: i64,
    pub article_id: i64,
    pub kind: InteractionKind,
    pub read_time: Option<f64>,
    pub scroll_depth: Option<f64>,
    pub logged_at: Option<DateTime<Utc>>,
}

impl NewInteraction {
    pub fn new(user_id: i64, article_id: i64, kind: InteractionKind) -> Self {
        Self {
            user_id,
            article_id,
            kind,
            read_time: None,
            scroll_depth: None,
            logged_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Like,
    Dislike,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Like => "like",
            FeedbackType::Dislike => "dislike",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(FeedbackType::Like),
            "dislike" => Ok(FeedbackType::Dislike),
            other => Err(AppError::InvalidInput(format!(
                "unknown feedback type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub user_id: i64,
    pub article_id: i64,
    pub feedback_type: FeedbackType,
    pub created_at: DateTime<Utc>,
}

/// What a second feedback call on the same (user, article) pair means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackIntent {
    /// Same type cancels, the other type switches.
    #[default]
    Toggle,
    /// Always leaves the given type in place.
    Replace,
    /// Refuses to touch an existing row.
    Insert,
}

impl FromStr for FeedbackIntent {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toggle" => Ok(FeedbackIntent::Toggle),
            "replace" => Ok(FeedbackIntent::Replace),
            "insert" => Ok(FeedbackIntent::Insert),
            other => Err(AppError::InvalidInput(format!(
                "unknown feedback intent '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackChange {
    Inserted,
    Updated,
    Cancelled,
    Unchanged,
}
