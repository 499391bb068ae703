use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A stored article. `link` is the natural key within a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub topic_id: i64,
    pub title: String,
    pub publication_date: NaiveDate,
    pub link: String,
    pub content: String,
    /// Filled later by the summarizer; `None` until then.
    pub summary: Option<String>,
    pub source: String,
}

/// An article produced by a crawl run, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub topic_id: i64,
    pub title: String,
    pub publication_date: NaiveDate,
    pub link: String,
    pub content: String,
    pub source: String,
}

/// Minimal reference to an article as found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleStub {
    pub title: String,
    pub link: String,
    pub raw_date: String,
}

impl ArticleStub {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        raw_date: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            raw_date: raw_date.into(),
        }
    }
}
