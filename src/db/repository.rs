use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, NewArticle, ScheduleConfig, WindowParams};
use crate::scheduler::ScheduleStore;

use super::schema::SCHEMA;

const DATE_FORMAT: &str = "%Y-%m-%d";

const ARTICLE_COLUMNS: &str =
    "id, topic_id, title, publication_date, link, content, summarized_text, source";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Article operations

    /// Every stored link for a topic. Loaded once per crawl run.
    pub async fn existing_links(&self, topic_id: i64) -> Result<HashSet<String>> {
        let links = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT link FROM articles WHERE topic_id = ?1")?;
                let links = stmt
                    .query_map(params![topic_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(links)
            })
            .await?;
        Ok(links)
    }

    /// Inserts the articles whose `(topic_id, link)` is not stored yet, in one
    /// transaction. Any failure rolls the whole batch back.
    pub async fn save_new(&self, articles: Vec<NewArticle>) -> Result<usize> {
        if articles.is_empty() {
            return Ok(0);
        }

        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut exists = tx.prepare(
                        "SELECT 1 FROM articles WHERE topic_id = ?1 AND link = ?2 LIMIT 1",
                    )?;
                    let mut insert = tx.prepare(
                        r#"INSERT INTO articles (topic_id, title, publication_date, link, content, summarized_text, source)
                           VALUES (?1, ?2, ?3, ?4, ?5, '', ?6)"#,
                    )?;

                    for article in &articles {
                        if exists.exists(params![article.topic_id, article.link])? {
                            continue;
                        }
                        insert.execute(params![
                            article.topic_id,
                            article.title,
                            article.publication_date.format(DATE_FORMAT).to_string(),
                            article.link,
                            article.content,
                            article.source,
                        ])?;
                        inserted += 1;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    /// Deletes the oldest rows of a topic until at most `keep` remain.
    /// Ties on publication date are broken by id, oldest first.
    pub async fn prune(&self, topic_id: i64, keep: usize) -> Result<usize> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM articles WHERE topic_id = ?1",
                    params![topic_id],
                    |row| row.get(0),
                )?;
                let excess = count - keep;
                let deleted = if excess > 0 {
                    tx.execute(
                        r#"DELETE FROM articles WHERE id IN (
                               SELECT id FROM articles
                               WHERE topic_id = ?1
                               ORDER BY publication_date ASC, id ASC
                               LIMIT ?2
                           )"#,
                        params![topic_id, excess],
                    )?
                } else {
                    0
                };
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    /// Newest first, the contract the listing API reads through.
    pub async fn articles_for_topic(&self, topic_id: i64, limit: usize) -> Result<Vec<Article>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE topic_id = ?1
                     ORDER BY publication_date DESC, id DESC LIMIT ?2"
                ))?;
                let articles = stmt
                    .query_map(params![topic_id, limit], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn count_for_topic(&self, topic_id: i64) -> Result<usize> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE topic_id = ?1",
                    params![topic_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Removes every article of a topic.
    pub async fn reset_topic(&self, topic_id: i64) -> Result<usize> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM articles WHERE topic_id = ?1", params![topic_id])?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    // Summary operations

    pub async fn unsummarized(&self, topic_id: i64, limit: usize) -> Result<Vec<Article>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE topic_id = ?1 AND summarized_text = '' AND content != ''
                     ORDER BY publication_date DESC, id DESC LIMIT ?2"
                ))?;
                let articles = stmt
                    .query_map(params![topic_id, limit], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn set_summary(&self, article_id: i64, summary: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET summarized_text = ?1 WHERE id = ?2",
                    params![summary, article_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for Repository {
    async fn upsert_schedule(&self, config: &ScheduleConfig) -> Result<()> {
        let config = config.clone();
        self.conn
            .call(move |conn| {
                let (period_days, check_previous_days, start_date, end_date) = match config.window
                {
                    WindowParams::Relative {
                        period_days,
                        check_previous_days,
                    } => (Some(period_days), Some(check_previous_days), None, None),
                    WindowParams::Explicit {
                        start_date,
                        end_date,
                    } => (
                        None,
                        None,
                        Some(start_date.format(DATE_FORMAT).to_string()),
                        Some(end_date.format(DATE_FORMAT).to_string()),
                    ),
                };
                conn.execute(
                    r#"INSERT INTO schedules (job_id, topic_id, interval_hours, period_days, check_previous_days, start_date, end_date, max_articles)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                       ON CONFLICT(job_id) DO UPDATE SET
                           topic_id = excluded.topic_id,
                           interval_hours = excluded.interval_hours,
                           period_days = excluded.period_days,
                           check_previous_days = excluded.check_previous_days,
                           start_date = excluded.start_date,
                           end_date = excluded.end_date,
                           max_articles = excluded.max_articles,
                           updated_at = datetime('now')"#,
                    params![
                        config.job_id,
                        config.topic_id,
                        config.interval_hours,
                        period_days,
                        check_previous_days,
                        start_date,
                        end_date,
                        config.max_articles,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn delete_schedule(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM schedules WHERE job_id = ?1", params![job_id])?;
                Ok(deleted > 0)
            })
            .await?;
        Ok(deleted)
    }

    async fn get_schedule(&self, job_id: &str) -> Result<Option<ScheduleConfig>> {
        let job_id = job_id.to_string();
        let schedule = self
            .conn
            .call(move |conn| {
                let schedule = conn
                    .query_row(
                        r#"SELECT job_id, topic_id, interval_hours, period_days, check_previous_days, start_date, end_date, max_articles
                           FROM schedules WHERE job_id = ?1"#,
                        params![job_id],
                        schedule_from_row,
                    )
                    .optional()?;
                Ok(schedule)
            })
            .await?;
        Ok(schedule)
    }

    async fn all_schedules(&self) -> Result<Vec<ScheduleConfig>> {
        let schedules = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT job_id, topic_id, interval_hours, period_days, check_previous_days, start_date, end_date, max_articles
                       FROM schedules ORDER BY job_id"#,
                )?;
                let schedules = stmt
                    .query_map([], schedule_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(schedules)
            })
            .await?;
        Ok(schedules)
    }
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let summary: String = row.get(6)?;
    Ok(Article {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        title: row.get(2)?,
        publication_date: parse_date(3, &row.get::<_, String>(3)?)?,
        link: row.get(4)?,
        content: row.get(5)?,
        summary: (!summary.is_empty()).then_some(summary),
        source: row.get(7)?,
    })
}

fn schedule_from_row(row: &Row) -> rusqlite::Result<ScheduleConfig> {
    let period_days: Option<u32> = row.get(3)?;
    let check_previous_days: Option<u32> = row.get(4)?;
    let start_date: Option<String> = row.get(5)?;
    let end_date: Option<String> = row.get(6)?;

    let window = match (period_days, start_date, end_date) {
        (Some(period_days), _, _) => WindowParams::Relative {
            period_days,
            check_previous_days: check_previous_days.unwrap_or_default(),
        },
        (None, Some(start), Some(end)) => WindowParams::Explicit {
            start_date: parse_date(5, &start)?,
            end_date: parse_date(6, &end)?,
        },
        _ => return Err(rusqlite::Error::InvalidColumnType(5, "start_date".into(), Type::Null)),
    };

    Ok(ScheduleConfig {
        job_id: row.get(0)?,
        topic_id: row.get(1)?,
        interval_hours: row.get(2)?,
        window,
        max_articles: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn repository() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (dir, repo)
    }

    fn article(topic_id: i64, link: &str, date: &str) -> NewArticle {
        NewArticle {
            topic_id,
            title: format!("Title {link}"),
            publication_date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            link: link.to_string(),
            content: "body".to_string(),
            source: "E1.RU".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_new_skips_stored_links() {
        let (_dir, repo) = repository().await;

        let first = repo
            .save_new(vec![article(1, "https://a/1", "2025-05-01")])
            .await
            .unwrap();
        assert_eq!(first, 1);

        let second = repo
            .save_new(vec![
                article(1, "https://a/1", "2025-05-01"),
                article(1, "https://a/2", "2025-05-02"),
                article(1, "https://a/2", "2025-05-02"),
            ])
            .await
            .unwrap();
        assert_eq!(second, 1);

        let links = repo.existing_links(1).await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.contains("https://a/1"));
        assert!(repo.existing_links(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_new_rolls_back_whole_batch() {
        let (_dir, repo) = repository().await;

        let result = repo
            .save_new(vec![
                article(1, "https://a/1", "2025-05-01"),
                article(1, "", "2025-05-02"),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(repo.count_for_topic(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent() {
        let (_dir, repo) = repository().await;

        let batch: Vec<_> = (1..=25)
            .map(|day| article(7, &format!("https://a/{day}"), &format!("2025-03-{day:02}")))
            .collect();
        repo.save_new(batch).await.unwrap();

        let deleted = repo.prune(7, 20).await.unwrap();
        assert_eq!(deleted, 5);
        assert_eq!(repo.count_for_topic(7).await.unwrap(), 20);

        let remaining = repo.articles_for_topic(7, 100).await.unwrap();
        let oldest = remaining.iter().map(|a| a.publication_date).min().unwrap();
        assert_eq!(oldest, NaiveDate::from_ymd_opt(2025, 3, 6).unwrap());
    }

    #[tokio::test]
    async fn test_prune_below_cap_is_noop() {
        let (_dir, repo) = repository().await;
        repo.save_new(vec![
            article(1, "https://a/1", "2025-05-01"),
            article(1, "https://a/2", "2025-05-02"),
        ])
        .await
        .unwrap();

        assert_eq!(repo.prune(1, 20).await.unwrap(), 0);
        assert_eq!(repo.count_for_topic(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_prune_breaks_ties_by_insertion_order() {
        let (_dir, repo) = repository().await;
        repo.save_new(vec![
            article(1, "https://a/first", "2025-05-01"),
            article(1, "https://a/second", "2025-05-01"),
            article(1, "https://a/third", "2025-05-01"),
        ])
        .await
        .unwrap();

        repo.prune(1, 2).await.unwrap();

        let links = repo.existing_links(1).await.unwrap();
        assert!(!links.contains("https://a/first"));
        assert!(links.contains("https://a/second"));
        assert!(links.contains("https://a/third"));
    }

    #[tokio::test]
    async fn test_summary_round_trip() {
        let (_dir, repo) = repository().await;
        repo.save_new(vec![article(3, "https://a/1", "2025-05-01")])
            .await
            .unwrap();

        let pending = repo.unsummarized(3, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].summary, None);

        repo.set_summary(pending[0].id, "short".into()).await.unwrap();
        assert!(repo.unsummarized(3, 10).await.unwrap().is_empty());

        let stored = repo.articles_for_topic(3, 1).await.unwrap();
        assert_eq!(stored[0].summary.as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn test_reset_topic() {
        let (_dir, repo) = repository().await;
        repo.save_new(vec![
            article(1, "https://a/1", "2025-05-01"),
            article(2, "https://a/1", "2025-05-01"),
        ])
        .await
        .unwrap();

        assert_eq!(repo.reset_topic(1).await.unwrap(), 1);
        assert_eq!(repo.count_for_topic(1).await.unwrap(), 0);
        assert_eq!(repo.count_for_topic(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_schedule_upsert_replaces_row() {
        let (_dir, repo) = repository().await;
        let mut config = ScheduleConfig {
            job_id: "period_parser".into(),
            topic_id: 0,
            interval_hours: 6,
            window: WindowParams::Relative {
                period_days: 7,
                check_previous_days: 2,
            },
            max_articles: None,
        };

        repo.upsert_schedule(&config).await.unwrap();
        config.interval_hours = 12;
        config.window = WindowParams::Explicit {
            start_date: NaiveDate::from_ymd_opt(2025, 5, 3).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
        };
        config.max_articles = Some(20);
        repo.upsert_schedule(&config).await.unwrap();

        let all = repo.all_schedules().await.unwrap();
        assert_eq!(all, vec![config.clone()]);
        assert_eq!(repo.get_schedule("period_parser").await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_delete_missing_schedule() {
        let (_dir, repo) = repository().await;
        assert!(!repo.delete_schedule("period_parser").await.unwrap());
        assert!(repo.get_schedule("period_parser").await.unwrap().is_none());
    }
}
