pub const SCHEMA: &str = r#"
-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    publication_date TEXT NOT NULL,
    link TEXT NOT NULL CHECK (length(link) > 0),
    content TEXT NOT NULL DEFAULT '',
    summarized_text TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_topic_link ON articles(topic_id, link);
CREATE INDEX IF NOT EXISTS idx_articles_topic_date ON articles(topic_id, publication_date DESC);

-- schedules table (one row per job)
CREATE TABLE IF NOT EXISTS schedules (
    job_id TEXT PRIMARY KEY,
    topic_id INTEGER NOT NULL DEFAULT 0,
    interval_hours INTEGER NOT NULL CHECK (interval_hours > 0),
    period_days INTEGER,
    check_previous_days INTEGER,
    start_date TEXT,
    end_date TEXT,
    max_articles INTEGER,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (
        (period_days IS NOT NULL AND check_previous_days IS NOT NULL AND start_date IS NULL AND end_date IS NULL)
        OR (period_days IS NULL AND check_previous_days IS NULL AND start_date IS NOT NULL AND end_date IS NOT NULL)
    )
);
"#;
