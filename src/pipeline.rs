use async_trait::async_trait;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::crawl::{AdapterKind, CrawlEngine, PageFetcher, SiteAdapter};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{CrawlWindow, NewArticle, RunTrigger, ScheduleConfig};
use crate::scheduler::JobRunner;

/// A configured adapter bound to the topic its articles are stored under.
pub struct Source {
    pub topic_id: i64,
    pub kind: AdapterKind,
    pub adapter: Box<dyn SiteAdapter>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    /// Articles collected by the crawl, in listing order.
    pub articles: Vec<NewArticle>,
    /// Rows actually written after the store's own dedup check.
    pub inserted: usize,
    pub pruned: usize,
}

/// existing links -> crawl -> save -> prune, per source.
pub struct Ingestor {
    repository: Repository,
    engine: CrawlEngine,
    sources: Vec<Source>,
    retention: usize,
    default_max_articles: Option<u32>,
}

impl Ingestor {
    pub fn new(repository: Repository, engine: CrawlEngine, sources: Vec<Source>, retention: usize) -> Self {
        Self {
            repository,
            engine,
            sources,
            retention,
            default_max_articles: None,
        }
    }

    pub fn from_config(config: &Config, repository: Repository) -> Result<Self> {
        let engine = CrawlEngine::new(PageFetcher::from_config(config)?);
        let sources = config
            .sources
            .iter()
            .map(|source| {
                Ok(Source {
                    topic_id: source.topic_id,
                    kind: source.adapter,
                    adapter: source.adapter.build(source.base_url.as_deref())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut ingestor = Self::new(repository, engine, sources, config.retention_per_topic);
        ingestor.default_max_articles = config.default_max_articles;
        Ok(ingestor)
    }

    /// Crawl every source of `topic_id` (0 for all sources) over `window`.
    ///
    /// Persistence failures abort the run; fetch and parse problems only
    /// shrink the result.
    #[instrument(level = "info", skip(self, window), fields(start = %window.start, end = %window.end))]
    pub async fn run_once(
        &self,
        topic_id: i64,
        window: &CrawlWindow,
        max_articles: Option<u32>,
    ) -> Result<IngestReport> {
        let selected: Vec<&Source> = self
            .sources
            .iter()
            .filter(|source| topic_id == 0 || source.topic_id == topic_id)
            .collect();
        if selected.is_empty() {
            return Err(AppError::UnknownSource(format!("no source configured for topic {}", topic_id)));
        }

        let max = max_articles
            .or(self.default_max_articles)
            .map(|max| max as usize);
        let mut report = IngestReport::default();

        for source in selected {
            let existing = self.repository.existing_links(source.topic_id).await?;
            let articles = self
                .engine
                .run(source.adapter.as_ref(), source.topic_id, window, &existing, max)
                .await;

            let inserted = self.repository.save_new(articles.clone()).await?;
            let pruned = self.repository.prune(source.topic_id, self.retention).await?;
            info!(
                source = %source.kind,
                topic_id = source.topic_id,
                collected = articles.len(),
                inserted,
                pruned,
                "Source ingested"
            );

            report.inserted += inserted;
            report.pruned += pruned;
            report.articles.extend(articles);
        }

        Ok(report)
    }
}

#[async_trait]
impl JobRunner for Ingestor {
    async fn run(&self, config: &ScheduleConfig, window: CrawlWindow, trigger: RunTrigger) {
        match self.run_once(config.topic_id, &window, config.max_articles).await {
            Ok(report) => info!(
                job_id = %config.job_id,
                ?trigger,
                inserted = report.inserted,
                "Job run complete"
            ),
            Err(e) => error!(job_id = %config.job_id, ?trigger, error = %e, "Job run failed"),
        }
    }
}
