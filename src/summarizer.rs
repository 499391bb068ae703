use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::db::Repository;
use crate::error::{AppError, Result};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const MODEL: &str = "claude-3-5-haiku-20241022";
const API_VERSION: &str = "2023-06-01";
const MAX_CONTENT_CHARS: usize = 10_000;

const SYSTEM_PROMPT: &str = r#"You summarize Russian real-estate market news.
Reply in Russian with 2-3 sentences covering the key facts, figures and
consequences for buyers or developers. Do not add information that is not in the article."#;

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// Client for the LLM messages API that fills `summarized_text`.
pub struct Summarizer {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl Summarizer {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_endpoint(api_key, API_URL)
    }

    pub fn with_endpoint(api_key: String, endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into(),
        })
    }

    #[instrument(level = "debug", skip(self, content))]
    pub async fn summarize(&self, title: &str, content: &str) -> Result<String> {
        let content = truncate_chars(content, MAX_CONTENT_CHARS);
        let request = MessageRequest {
            model: MODEL,
            max_tokens: 512,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: format!("Заголовок: {}\n\nТекст:\n{}", title, content),
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Summarizer(format!("API returned {}: {}", status, body)));
        }

        let body = response.text().await?;
        let message: MessageResponse = serde_json::from_str(&body)?;
        let summary = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if summary.trim().is_empty() {
            return Err(AppError::Summarizer("empty summary in response".into()));
        }
        Ok(summary.trim().to_string())
    }

    pub fn model_version(&self) -> &'static str {
        MODEL
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Summarize up to `limit` stored articles of a topic that have content but
/// no summary yet. Per-article failures are logged and skipped.
pub async fn fill_pending(
    repository: &Repository,
    summarizer: &Summarizer,
    topic_id: i64,
    limit: usize,
) -> Result<usize> {
    let pending = repository.unsummarized(topic_id, limit).await?;
    let mut done = 0;

    for article in pending {
        match summarizer.summarize(&article.title, &article.content).await {
            Ok(summary) => {
                repository.set_summary(article.id, summary).await?;
                done += 1;
            }
            Err(e) => warn!(article_id = article.id, error = %e, "Summary failed, skipping"),
        }
    }

    info!(topic_id, done, model = summarizer.model_version(), "Summaries written");
    Ok(done)
}
