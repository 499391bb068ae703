use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::crawl::fetcher::DEFAULT_USER_AGENT;
use crate::crawl::AdapterKind;
use crate::error::{AppError, Result};

const APP_DIR: &str = "realty-news";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub topic_id: i64,
    pub adapter: AdapterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl From<AdapterKind> for SourceConfig {
    fn from(kind: AdapterKind) -> Self {
        Self {
            topic_id: kind.default_topic(),
            adapter: kind,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,

    /// Articles kept per topic after each run.
    pub retention_per_topic: usize,

    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,

    /// How often `serve` re-reads the schedule table.
    pub schedule_sync_secs: u64,

    /// Cap applied when neither the command nor the schedule sets one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_articles: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarizer_api_key: Option<String>,

    pub sources: Vec<SourceConfig>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("news.db").to_string_lossy().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retention_per_topic: 20,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            schedule_sync_secs: 60,
            default_max_articles: None,
            summarizer_api_key: None,
            sources: AdapterKind::ALL.into_iter().map(SourceConfig::from).collect(),
        }
    }
}

impl Config {
    /// Read the config at `path` (or the default location), writing a
    /// default file first if none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention_per_topic == 0 {
            return Err(AppError::Config("retention_per_topic must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(AppError::Config("timeouts must be greater than zero".into()));
        }
        if self.schedule_sync_secs == 0 {
            return Err(AppError::Config("schedule_sync_secs must be greater than zero".into()));
        }
        if self.default_max_articles == Some(0) {
            return Err(AppError::Config("default_max_articles must be greater than zero".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.topic_id <= 0 {
                return Err(AppError::Config(format!(
                    "source {} has non-positive topic id {}",
                    source.adapter, source.topic_id
                )));
            }
            if !seen.insert((source.topic_id, source.adapter)) {
                return Err(AppError::Config(format!(
                    "source {} is configured twice for topic {}",
                    source.adapter, source.topic_id
                )));
            }
        }
        Ok(())
    }

    /// Configured key, else the environment.
    pub fn summarizer_key(&self) -> Option<String> {
        self.summarizer_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()))
    }
}
