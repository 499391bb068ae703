use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tracing::{info, warn};

mod cli;
mod config;
mod crawl;
mod db;
mod error;
mod models;
mod pipeline;
mod scheduler;
mod summarizer;

use cli::{Cli, Command, ScheduleArgs};
use config::Config;
use db::Repository;
use error::AppError;
use pipeline::Ingestor;
use scheduler::{JobScheduler, ScheduleStore};
use summarizer::Summarizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(cli::log_filter(cli.verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let repository = Repository::new(&config.db_path)
        .await
        .with_context(|| format!("opening database {}", config.db_path))?;

    match cli.command {
        Command::Run(args) => {
            let window = args.window(Local::now().date_naive())?;
            let ingestor = Ingestor::from_config(&config, repository)?;
            let report = ingestor.run_once(args.topic, &window, args.max).await?;

            println!(
                "Collected {} new articles ({} stored, {} pruned)",
                report.articles.len(),
                report.inserted,
                report.pruned
            );
            for article in &report.articles {
                println!("{}  [{}] {}\n    {}", article.publication_date, article.source, article.title, article.link);
            }
        }
        Command::Schedule(args) | Command::Update(args) => {
            schedule(&config, repository, &args).await?;
        }
        Command::Unschedule { job_id } => {
            let scheduler = job_scheduler(&config, repository)?;
            if scheduler.unschedule(&job_id).await? {
                println!("Removed job {}", job_id);
            } else {
                println!("No job named {}", job_id);
            }
        }
        Command::Jobs => {
            let jobs = repository.all_schedules().await?;
            if jobs.is_empty() {
                println!("No scheduled jobs");
            }
            for job in jobs {
                println!(
                    "{}  topic={} every {}h window={:?} max={}",
                    job.job_id,
                    job.topic_id,
                    job.interval_hours,
                    job.window,
                    job.max_articles.map_or_else(|| "-".to_string(), |m| m.to_string())
                );
            }
        }
        Command::Serve => {
            let scheduler = job_scheduler(&config, repository)?;
            let armed = scheduler.reload_all().await?;
            for job in scheduler.scheduled_jobs().await {
                info!(job_id = %job.job_id, topic_id = job.topic_id, interval_hours = job.interval_hours, "Job armed");
            }
            info!(armed, "Scheduler running, press Ctrl-C to stop");

            let period = Duration::from_secs(config.schedule_sync_secs);
            let mut resync = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let shutdown = tokio::signal::ctrl_c();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    signal = &mut shutdown => {
                        signal.context("waiting for Ctrl-C")?;
                        break;
                    }
                    _ = resync.tick() => {
                        if let Err(e) = scheduler.sync().await {
                            warn!(error = %e, "Schedule sync failed, keeping current timers");
                        }
                    }
                }
            }
            scheduler.shutdown().await;
            info!("Scheduler stopped");
        }
        Command::List { topic_id, limit } => {
            let articles = repository.articles_for_topic(topic_id, limit).await?;
            let total = repository.count_for_topic(topic_id).await?;
            println!("Topic {}: {} stored", topic_id, total);
            for article in articles {
                let marker = if article.summary.is_some() { "*" } else { " " };
                println!("{} {}  [{}] {}", marker, article.publication_date, article.source, article.title);
            }
        }
        Command::Reset { topic_id } => {
            let removed = repository.reset_topic(topic_id).await?;
            println!("Removed {} articles from topic {}", removed, topic_id);
        }
        Command::Summarize {
            topic_id,
            limit,
            api_key,
        } => {
            let key = api_key.or_else(|| config.summarizer_key()).ok_or_else(|| {
                AppError::Config("no summarizer API key (set summarizer_api_key or ANTHROPIC_API_KEY)".into())
            })?;
            let client = Summarizer::new(key)?;
            let done = summarizer::fill_pending(&repository, &client, topic_id, limit).await?;
            println!("Summarized {} articles", done);
        }
    }

    Ok(())
}

fn job_scheduler(config: &Config, repository: Repository) -> error::Result<JobScheduler> {
    let ingestor = Ingestor::from_config(config, repository.clone())?;
    Ok(JobScheduler::new(Arc::new(repository), Arc::new(ingestor)))
}

/// Persist the job and wait for its first run. A running `serve` arms the
/// timer on its next sync.
async fn schedule(config: &Config, repository: Repository, args: &ScheduleArgs) -> anyhow::Result<()> {
    let job = args.to_config()?;
    let scheduler = job_scheduler(config, repository)?;

    let first_run = scheduler.schedule(job.clone()).await?;
    first_run.await.context("first run of scheduled job")?;
    scheduler.shutdown().await;

    println!("Scheduled {} every {}h", job.job_id, job.interval_hours);
    Ok(())
}
