pub const SCHEMA: &str = r#"
-- users table (owned by the web layer, referenced here)
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- articles table (written by ingestion)
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    summary TEXT,
    category TEXT,
    published_at TEXT,
    url TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC);

-- keywords table
CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL UNIQUE
);

-- article_keywords table
CREATE TABLE IF NOT EXISTS article_keywords (
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    keyword_id INTEGER NOT NULL REFERENCES keywords(id) ON DELETE CASCADE,
    PRIMARY KEY (article_id, keyword_id)
);

CREATE INDEX IF NOT EXISTS idx_article_keywords_keyword ON article_keywords(keyword_id);

-- search_logs table
CREATE TABLE IF NOT EXISTS search_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    query TEXT NOT NULL,
    searched_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_search_logs_user ON search_logs(user_id);

-- user_article_log table (duplicates are kept on purpose)
CREATE TABLE IF NOT EXISTS user_article_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    action_type TEXT NOT NULL CHECK (action_type IN ('view', 'read', 'click_external_link')),
    read_time REAL,
    scroll_depth REAL,
    logged_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_user_article_log_user ON user_article_log(user_id);
CREATE INDEX IF NOT EXISTS idx_user_article_log_article ON user_article_log(article_id);

-- user_feedback table (one live row per user/article)
CREATE TABLE IF NOT EXISTS user_feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    feedback_type TEXT NOT NULL CHECK (feedback_type IN ('like', 'dislike')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(user_id, article_id)
);

-- recommended_articles table (append-only ledger)
CREATE TABLE IF NOT EXISTS recommended_articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    rank INTEGER NOT NULL,
    score REAL NOT NULL,
    batch_id TEXT NOT NULL,
    session_id TEXT,
    algorithm_version TEXT NOT NULL,
    recommended_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(user_id, article_id, batch_id)
);

CREATE INDEX IF NOT EXISTS idx_recommended_articles_batch ON recommended_articles(batch_id);
CREATE INDEX IF NOT EXISTS idx_recommended_articles_user ON recommended_articles(user_id);
"#;
