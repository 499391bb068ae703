//! Command-line surface: one-off runs, schedule management and the
//! long-running scheduler process.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, Result};
use crate::models::{CrawlWindow, ScheduleConfig, WindowParams};

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental real-estate news crawler", long_about = None)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level, on top of any RUST_LOG directives
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl once over a date window and store new articles
    Run(RunArgs),

    /// Create a recurring job and run it immediately
    Schedule(ScheduleArgs),

    /// Replace an existing job (same behaviour as `schedule`)
    Update(ScheduleArgs),

    /// Remove a job
    Unschedule {
        job_id: String,
    },

    /// Show persisted jobs
    Jobs,

    /// Re-arm every persisted job and run until Ctrl-C
    Serve,

    /// Show stored articles, newest first
    List {
        topic_id: i64,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete every stored article of a topic
    Reset {
        topic_id: i64,
    },

    /// Fill missing summaries for a topic
    Summarize {
        topic_id: i64,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Overrides the configured key
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Topic to crawl, 0 for every configured source
    #[arg(short, long, default_value_t = 0)]
    pub topic: i64,

    /// Window start (YYYY-MM-DD)
    #[arg(long, requires = "to", conflicts_with = "days")]
    pub from: Option<NaiveDate>,

    /// Window end (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,

    /// Look back this many days from today
    #[arg(short, long, default_value_t = 7)]
    pub days: u32,

    #[arg(short, long)]
    pub max: Option<u32>,
}

impl RunArgs {
    pub fn window(&self, today: NaiveDate) -> Result<CrawlWindow> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => CrawlWindow::new(from, to),
            _ => Ok(CrawlWindow::relative(today, self.days)),
        }
    }
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    pub job_id: String,

    /// Topic to crawl, 0 for every configured source
    #[arg(short, long, default_value_t = 0)]
    pub topic: i64,

    #[arg(short, long, default_value_t = 24)]
    pub interval_hours: u32,

    /// Lookback of the first run
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub period_days: Option<u32>,

    /// Lookback of every later run
    #[arg(long, default_value_t = 1, conflicts_with_all = ["start", "end"])]
    pub check_previous_days: u32,

    /// Fixed window start (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    pub start: Option<NaiveDate>,

    /// Fixed window end (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    pub end: Option<NaiveDate>,

    #[arg(short, long)]
    pub max: Option<u32>,
}

impl ScheduleArgs {
    pub fn to_config(&self) -> Result<ScheduleConfig> {
        let window = match (self.start, self.end) {
            (Some(start_date), Some(end_date)) => WindowParams::Explicit {
                start_date,
                end_date,
            },
            (None, None) => WindowParams::Relative {
                period_days: self.period_days.unwrap_or(7),
                check_previous_days: self.check_previous_days,
            },
            _ => {
                return Err(AppError::InvalidSchedule(
                    "--start and --end must be given together".into(),
                ))
            }
        };

        let config = ScheduleConfig {
            job_id: self.job_id.clone(),
            topic_id: self.topic,
            interval_hours: self.interval_hours,
            window,
            max_articles: self.max,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Log filter from `RUST_LOG`, falling back to `info` when it is unset or
/// unparseable. `--verbose` raises the default level to debug.
pub fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let filter = rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    if verbose {
        filter.add_directive(LevelFilter::DEBUG.into())
    } else {
        filter
    }
}
