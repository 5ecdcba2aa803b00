use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    Article, FeedbackChange, FeedbackEvent, FeedbackIntent, FeedbackType, InteractionEvent,
    InteractionKind, NewArticle, NewInteraction, RecommendationEntry, SearchEvent,
};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.summary, a.category, a.published_at, a.url";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Collaborator writes (web layer and ingestion)

    pub async fn insert_user(&self, username: &str) -> Result<i64> {
        let username = username.to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute("INSERT INTO users (username) VALUES (?1)", params![username])?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let keywords = normalize_keywords(&article.keywords);
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO articles (title, summary, category, published_at, url) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        article.title,
                        article.summary,
                        article.category,
                        article.published_at.map(|dt| dt.to_rfc3339()),
                        article.url,
                    ],
                )?;
                let article_id = tx.last_insert_rowid();

                for keyword in &keywords {
                    tx.execute(
                        "INSERT OR IGNORE INTO keywords (keyword) VALUES (?1)",
                        params![keyword],
                    )?;
                    let keyword_id: i64 = tx.query_row(
                        "SELECT id FROM keywords WHERE keyword = ?1",
                        params![keyword],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        "INSERT OR IGNORE INTO article_keywords (article_id, keyword_id) VALUES (?1, ?2)",
                        params![article_id, keyword_id],
                    )?;
                }

                tx.commit()?;
                Ok(article_id)
            })
            .await?;
        Ok(id)
    }

    pub async fn log_search(
        &self,
        user_id: i64,
        query: &str,
        searched_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let query = query.to_string();
        let searched_at = searched_at.unwrap_or_else(Utc::now).to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO search_logs (user_id, query, searched_at) VALUES (?1, ?2, ?3)",
                    params![user_id, query, searched_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn log_interaction(&self, interaction: NewInteraction) -> Result<i64> {
        let logged_at = interaction.logged_at.unwrap_or_else(Utc::now).to_rfc3339();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO user_article_log (user_id, article_id, action_type, read_time, scroll_depth, logged_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        interaction.user_id,
                        interaction.article_id,
                        interaction.kind.as_str(),
                        interaction.read_time,
                        interaction.scroll_depth,
                        logged_at,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    // Feedback

    /// Applies a like/dislike under an immediate transaction so concurrent
    /// calls on the same pair serialize.
    pub async fn submit_feedback(
        &self,
        user_id: i64,
        article_id: i64,
        feedback_type: FeedbackType,
        intent: FeedbackIntent,
    ) -> Result<FeedbackChange> {
        let now = Utc::now().to_rfc3339();
        let change = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT feedback_type FROM user_feedback WHERE user_id = ?1 AND article_id = ?2",
                        params![user_id, article_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let change = match (existing.as_deref(), intent) {
                    (None, _) => {
                        tx.execute(
                            r#"INSERT INTO user_feedback (user_id, article_id, feedback_type, created_at, updated_at)
                               VALUES (?1, ?2, ?3, ?4, ?4)"#,
                            params![user_id, article_id, feedback_type.as_str(), now],
                        )?;
                        Some(FeedbackChange::Inserted)
                    }
                    (Some(_), FeedbackIntent::Insert) => None,
                    (Some(current), FeedbackIntent::Toggle) if current == feedback_type.as_str() => {
                        tx.execute(
                            "DELETE FROM user_feedback WHERE user_id = ?1 AND article_id = ?2",
                            params![user_id, article_id],
                        )?;
                        Some(FeedbackChange::Cancelled)
                    }
                    (Some(current), FeedbackIntent::Replace) if current == feedback_type.as_str() => {
                        Some(FeedbackChange::Unchanged)
                    }
                    (Some(_), _) => {
                        tx.execute(
                            "UPDATE user_feedback SET feedback_type = ?3, updated_at = ?4 WHERE user_id = ?1 AND article_id = ?2",
                            params![user_id, article_id, feedback_type.as_str(), now],
                        )?;
                        Some(FeedbackChange::Updated)
                    }
                };

                tx.commit()?;
                Ok(change)
            })
            .await?;

        change.ok_or(AppError::DuplicateFeedback {
            user_id,
            article_id,
        })
    }

    // Per-user event reads

    pub async fn search_events(&self, user_id: i64) -> Result<Vec<SearchEvent>> {
        let events = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT query, searched_at FROM search_logs WHERE user_id = ?1 ORDER BY searched_at, id",
                )?;
                let events = stmt
                    .query_map(params![user_id], |row| {
                        Ok(SearchEvent {
                            term: row.get(0)?,
                            searched_at: timestamp_or_now(row, 1),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await?;
        Ok(events)
    }

    /// Interaction events for a user restricted to `kinds`; an empty slice means every kind.
    pub async fn interaction_events(
        &self,
        user_id: i64,
        kinds: &[InteractionKind],
    ) -> Result<Vec<InteractionEvent>> {
        let kinds: Vec<InteractionKind> = kinds.to_vec();
        let events = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT user_id, article_id, action_type, read_time, scroll_depth, logged_at
                       FROM user_article_log WHERE user_id = ?1 ORDER BY logged_at, id"#,
                )?;
                let events = stmt
                    .query_map(params![user_id], interaction_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await?;

        Ok(events
            .into_iter()
            .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
            .collect())
    }

    pub async fn feedback_events(&self, user_id: i64) -> Result<Vec<FeedbackEvent>> {
        let events = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT user_id, article_id, feedback_type, created_at
                       FROM user_feedback WHERE user_id = ?1 ORDER BY created_at, id"#,
                )?;
                let events = stmt
                    .query_map(params![user_id], feedback_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await?;
        Ok(events)
    }

    pub async fn disliked_article_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT article_id FROM user_feedback WHERE user_id = ?1 AND feedback_type = 'dislike'",
                )?;
                let ids = stmt
                    .query_map(params![user_id], |row| row.get(0))?
                    .collect::<std::result::Result<HashSet<i64>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    /// Articles the user interacted with, gave feedback on, or was shown.
    pub async fn seen_article_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT article_id FROM user_article_log WHERE user_id = ?1
                       UNION SELECT article_id FROM user_feedback WHERE user_id = ?1
                       UNION SELECT article_id FROM recommended_articles WHERE user_id = ?1"#,
                )?;
                let ids = stmt
                    .query_map(params![user_id], |row| row.get(0))?
                    .collect::<std::result::Result<HashSet<i64>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    // Keywords and articles

    pub async fn keywords_for_article(&self, article_id: i64) -> Result<Vec<String>> {
        let keywords = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT k.keyword FROM article_keywords ak
                       JOIN keywords k ON k.id = ak.keyword_id
                       WHERE ak.article_id = ?1 ORDER BY k.id"#,
                )?;
                let keywords = stmt
                    .query_map(params![article_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(keywords)
            })
            .await?;
        Ok(keywords)
    }

    /// Batched form of [`Repository::keywords_for_article`].
    pub async fn keywords_for_articles(
        &self,
        article_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<String>>> {
        let article_ids = article_ids.to_vec();
        let keywords = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT k.keyword FROM article_keywords ak
                       JOIN keywords k ON k.id = ak.keyword_id
                       WHERE ak.article_id = ?1 ORDER BY k.id"#,
                )?;
                let mut by_article = HashMap::new();
                for article_id in article_ids {
                    if by_article.contains_key(&article_id) {
                        continue;
                    }
                    let keywords = stmt
                        .query_map(params![article_id], |row| row.get(0))?
                        .collect::<std::result::Result<Vec<String>, _>>()?;
                    by_article.insert(article_id, keywords);
                }
                Ok(by_article)
            })
            .await?;
        Ok(keywords)
    }

    /// Newest articles tagged with `keyword`, skipping `excluding`.
    pub async fn articles_by_keyword(
        &self,
        keyword: &str,
        excluding: &HashSet<i64>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let keyword = keyword.to_string();
        let excluding = excluding.clone();
        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {} FROM articles a
                       JOIN article_keywords ak ON ak.article_id = a.id
                       JOIN keywords k ON k.id = ak.keyword_id
                       WHERE k.keyword = ?1
                       ORDER BY a.published_at DESC NULLS LAST, a.id DESC"#,
                    ARTICLE_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![keyword])?;
                let mut articles = Vec::new();
                while articles.len() < limit {
                    let Some(row) = rows.next()? else {
                        break;
                    };
                    let article = article_from_row(row)?;
                    if !excluding.contains(&article.id) {
                        articles.push(article);
                    }
                }
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Articles ordered by interaction count, then publish time, newest first.
    pub async fn popular_articles(&self, limit: usize) -> Result<Vec<Article>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {} FROM articles a
                       LEFT JOIN user_article_log l ON l.article_id = a.id
                       GROUP BY a.id
                       ORDER BY COUNT(l.id) DESC, a.published_at DESC NULLS LAST, a.id DESC
                       LIMIT ?1"#,
                    ARTICLE_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params![limit], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn all_article_ids(&self) -> Result<HashSet<i64>> {
        let ids = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM articles")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<HashSet<i64>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    /// Loads articles by id, keeping the order of `ids` and dropping unknown ones.
    pub async fn articles_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>> {
        let ids = ids.to_vec();
        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM articles a WHERE a.id = ?1", ARTICLE_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let mut articles = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(article) = stmt.query_row(params![id], article_from_row).optional()? {
                        articles.push(article);
                    }
                }
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    // Offline reads for training and evaluation

    pub async fn all_interactions(&self) -> Result<Vec<InteractionEvent>> {
        let events = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT user_id, article_id, action_type, read_time, scroll_depth, logged_at
                       FROM user_article_log ORDER BY id"#,
                )?;
                let events = stmt
                    .query_map([], interaction_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await?;
        Ok(events)
    }

    pub async fn all_feedback(&self) -> Result<Vec<FeedbackEvent>> {
        let events = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, article_id, feedback_type, created_at FROM user_feedback ORDER BY created_at, id",
                )?;
                let events = stmt
                    .query_map([], feedback_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await?;
        Ok(events)
    }

    /// Articles each user marked `like`.
    pub async fn liked_articles(&self) -> Result<HashMap<i64, HashSet<i64>>> {
        self.article_sets(
            "SELECT user_id, article_id FROM user_feedback WHERE feedback_type = 'like'",
        )
        .await
    }

    /// Articles each user liked or followed out to the source.
    pub async fn engaged_articles(&self) -> Result<HashMap<i64, HashSet<i64>>> {
        self.article_sets(
            r#"SELECT user_id, article_id FROM user_feedback WHERE feedback_type = 'like'
               UNION
               SELECT user_id, article_id FROM user_article_log WHERE action_type = 'click_external_link'"#,
        )
        .await
    }

    async fn article_sets(&self, sql: &'static str) -> Result<HashMap<i64, HashSet<i64>>> {
        let sets = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let mut rows = stmt.query([])?;
                let mut sets: HashMap<i64, HashSet<i64>> = HashMap::new();
                while let Some(row) = rows.next()? {
                    let user_id: i64 = row.get(0)?;
                    let article_id: i64 = row.get(1)?;
                    sets.entry(user_id).or_default().insert(article_id);
                }
                Ok(sets)
            })
            .await?;
        Ok(sets)
    }

    /// The most recent `fraction` of feedback rows by creation time.
    pub async fn holdout_feedback(&self, fraction: f64) -> Result<Vec<FeedbackEvent>> {
        let feedback = self.all_feedback().await?;
        let total = feedback.len();
        let offset = (total as f64 * (1.0 - fraction)).floor() as usize;
        Ok(feedback.into_iter().skip(offset.min(total)).collect())
    }

    // Ledger

    /// Inserts one ledger row; returns false when the (user, article, batch) key already exists.
    pub async fn insert_recommendation(&self, entry: RecommendationEntry) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT OR IGNORE INTO recommended_articles
                       (user_id, article_id, rank, score, batch_id, session_id, algorithm_version, recommended_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        entry.user_id,
                        entry.article_id,
                        entry.rank,
                        entry.score,
                        entry.batch_id,
                        entry.session_id,
                        entry.algorithm_version,
                        entry.recommended_at.to_rfc3339(),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    pub async fn entries_for_batch(&self, batch_id: &str) -> Result<Vec<RecommendationEntry>> {
        let batch_id = batch_id.to_string();
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT user_id, article_id, rank, score, batch_id, session_id, algorithm_version, recommended_at
                       FROM recommended_articles WHERE batch_id = ?1
                       ORDER BY user_id, algorithm_version, rank"#,
                )?;
                let entries = stmt
                    .query_map(params![batch_id], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    pub async fn entries_for_user(&self, user_id: i64) -> Result<Vec<RecommendationEntry>> {
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT user_id, article_id, rank, score, batch_id, session_id, algorithm_version, recommended_at
                       FROM recommended_articles WHERE user_id = ?1
                       ORDER BY recommended_at, batch_id, rank"#,
                )?;
                let entries = stmt
                    .query_map(params![user_id], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // datetime('now') form
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp_or_now(row: &Row, idx: usize) -> DateTime<Utc> {
    row.get::<_, String>(idx)
        .ok()
        .and_then(|s| parse_datetime(&s))
        .unwrap_or_else(Utc::now)
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = AppError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        category: row.get(3)?,
        published_at: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| parse_datetime(&s)),
        url: row.get(5)?,
    })
}

fn interaction_from_row(row: &Row) -> rusqlite::Result<InteractionEvent> {
    Ok(InteractionEvent {
        user_id: row.get(0)?,
        article_id: row.get(1)?,
        kind: parse_column(row, 2)?,
        read_time: row.get(3)?,
        scroll_depth: row.get(4)?,
        logged_at: timestamp_or_now(row, 5),
    })
}

fn feedback_from_row(row: &Row) -> rusqlite::Result<FeedbackEvent> {
    Ok(FeedbackEvent {
        user_id: row.get(0)?,
        article_id: row.get(1)?,
        feedback_type: parse_column(row, 2)?,
        created_at: timestamp_or_now(row, 3),
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<RecommendationEntry> {
    Ok(RecommendationEntry {
        user_id: row.get(0)?,
        article_id: row.get(1)?,
        rank: row.get(2)?,
        score: row.get(3)?,
        batch_id: row.get(4)?,
        session_id: row.get(5)?,
        algorithm_version: row.get(6)?,
        recommended_at: timestamp_or_now(row, 7),
    })
}
