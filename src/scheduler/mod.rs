//! Recurring crawl jobs.
//!
//! Each job id owns at most one interval timer. Timer fires spawn the
//! execution, so a slow run never delays the timer itself; an execution
//! that finds the previous one still running is skipped rather than queued.
//! Before each fire the timer checks that its row still exists.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::models::{CrawlWindow, RunTrigger, ScheduleConfig};

/// Persistence for schedule rows, keyed by job id.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert or replace the row for `config.job_id`.
    async fn upsert_schedule(&self, config: &ScheduleConfig) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete_schedule(&self, job_id: &str) -> Result<bool>;

    async fn get_schedule(&self, job_id: &str) -> Result<Option<ScheduleConfig>>;

    async fn all_schedules(&self) -> Result<Vec<ScheduleConfig>>;
}

/// The work bound to a job. Failures are the runner's to log; the
/// scheduler keeps ticking regardless.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, config: &ScheduleConfig, window: CrawlWindow, trigger: RunTrigger);
}

struct ScheduledJob {
    config: ScheduleConfig,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Jobs {
    timers: HashMap<String, ScheduledJob>,
    /// Survives replacement so a run still in flight keeps excluding
    /// executions of a re-created job with the same id. Dropped with the
    /// job once no run holds it.
    in_flight: HashMap<String, Arc<AtomicBool>>,
}

impl Jobs {
    fn flag(&mut self, job_id: &str) -> Arc<AtomicBool> {
        self.in_flight
            .entry(job_id.to_string())
            .or_default()
            .clone()
    }

    /// Abort the timer of `job_id`. Returns whether one was registered.
    fn remove(&mut self, job_id: &str) -> bool {
        let removed = match self.timers.remove(job_id) {
            Some(job) => {
                job.timer.abort();
                true
            }
            None => false,
        };
        if self
            .in_flight
            .get(job_id)
            .is_some_and(|flag| !flag.load(Ordering::Acquire))
        {
            self.in_flight.remove(job_id);
        }
        removed
    }
}

/// Clears the in-flight flag on drop, including when the run panics.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What a [`JobScheduler::sync`] pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub armed: usize,
    pub replaced: usize,
    pub removed: usize,
}

impl SyncSummary {
    pub fn changed(&self) -> bool {
        self.armed + self.replaced + self.removed > 0
    }
}

/// Timers are the in-memory side of the schedule rows. Other processes
/// sharing the store are picked up by [`JobScheduler::sync`], and a timer
/// whose row has disappeared stops at its next tick.
pub struct JobScheduler {
    store: Arc<dyn ScheduleStore>,
    runner: Arc<dyn JobRunner>,
    jobs: Mutex<Jobs>,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn ScheduleStore>, runner: Arc<dyn JobRunner>) -> Self {
        Self {
            store,
            runner,
            jobs: Mutex::new(Jobs::default()),
        }
    }

    /// Persist `config`, replace any live timer for its job id and start one
    /// immediate execution. The returned handle completes when that
    /// execution does.
    pub async fn schedule(&self, config: ScheduleConfig) -> Result<JoinHandle<()>> {
        config.validate()?;

        let mut jobs = self.jobs.lock().await;
        self.store.upsert_schedule(&config).await?;
        let flag = jobs.flag(&config.job_id);
        self.arm(&mut jobs, config.clone(), flag.clone());
        drop(jobs);

        info!(job_id = %config.job_id, interval_hours = config.interval_hours, "Job scheduled");
        let runner = self.runner.clone();
        Ok(tokio::spawn(execute(runner, config, RunTrigger::Immediate, flag)))
    }

    /// Remove the persisted row and stop the timer. A run already in
    /// progress finishes normally. Unknown ids are not an error.
    pub async fn unschedule(&self, job_id: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let removed_row = self.store.delete_schedule(job_id).await?;
        let removed_timer = jobs.remove(job_id);

        if removed_row || removed_timer {
            info!(job_id, "Job unscheduled");
        } else {
            debug!(job_id, "Unschedule of unknown job");
        }
        Ok(removed_row || removed_timer)
    }

    /// Re-arm a timer for every persisted schedule without running any of
    /// them. Rows that no longer validate are skipped with a warning.
    pub async fn reload_all(&self) -> Result<usize> {
        let mut jobs = self.jobs.lock().await;
        let configs = self.store.all_schedules().await?;
        let mut armed = 0;

        for config in configs {
            if let Err(e) = config.validate() {
                warn!(job_id = %config.job_id, error = %e, "Skipping invalid stored schedule");
                continue;
            }
            let flag = jobs.flag(&config.job_id);
            self.arm(&mut jobs, config, flag);
            armed += 1;
        }

        info!(armed, "Schedules reloaded");
        Ok(armed)
    }

    /// Bring the timers in line with the store: arm new rows, re-arm changed
    /// or stopped ones, drop timers whose row is gone. Nothing runs
    /// immediately.
    pub async fn sync(&self) -> Result<SyncSummary> {
        let mut jobs = self.jobs.lock().await;
        let configs = self.store.all_schedules().await?;
        let mut summary = SyncSummary::default();
        let mut live = HashSet::new();

        for config in configs {
            if let Err(e) = config.validate() {
                warn!(job_id = %config.job_id, error = %e, "Skipping invalid stored schedule");
                continue;
            }
            live.insert(config.job_id.clone());

            match jobs.timers.get(&config.job_id) {
                Some(job) if job.config == config && !job.timer.is_finished() => continue,
                Some(_) => summary.replaced += 1,
                None => summary.armed += 1,
            }
            debug!(job_id = %config.job_id, "Arming timer from store");
            let flag = jobs.flag(&config.job_id);
            self.arm(&mut jobs, config, flag);
        }

        let stale: Vec<String> = jobs
            .timers
            .keys()
            .filter(|job_id| !live.contains(*job_id))
            .cloned()
            .collect();
        for job_id in stale {
            debug!(%job_id, "Row gone, dropping timer");
            jobs.remove(&job_id);
            summary.removed += 1;
        }

        if summary.changed() {
            info!(armed = summary.armed, replaced = summary.replaced, removed = summary.removed, "Schedules synced");
        }
        Ok(summary)
    }

    /// Configs of every job with a live timer, ordered by job id.
    pub async fn scheduled_jobs(&self) -> Vec<ScheduleConfig> {
        let jobs = self.jobs.lock().await;
        let mut configs: Vec<_> = jobs
            .timers
            .values()
            .filter(|job| !job.timer.is_finished())
            .map(|job| job.config.clone())
            .collect();
        configs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        configs
    }

    /// Stop every timer. Persisted rows are kept for the next `reload_all`.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (job_id, job) in jobs.timers.drain() {
            debug!(%job_id, "Stopping timer");
            job.timer.abort();
        }
    }

    fn arm(&self, jobs: &mut Jobs, config: ScheduleConfig, flag: Arc<AtomicBool>) {
        let store = self.store.clone();
        let runner = self.runner.clone();
        let job_config = config.clone();
        let period = config.interval();

        let timer = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match store.get_schedule(&job_config.job_id).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        info!(job_id = %job_config.job_id, "Schedule row removed, stopping timer");
                        break;
                    }
                    Err(e) => {
                        warn!(job_id = %job_config.job_id, error = %e, "Could not read schedule row, running anyway")
                    }
                }
                tokio::spawn(execute(
                    runner.clone(),
                    job_config.clone(),
                    RunTrigger::Interval,
                    flag.clone(),
                ));
            }
        });

        if let Some(previous) = jobs.timers.insert(
            config.job_id.clone(),
            ScheduledJob { config, timer },
        ) {
            previous.timer.abort();
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        for job in self.jobs.get_mut().timers.values() {
            job.timer.abort();
        }
    }
}

#[instrument(level = "info", skip(runner, config, flag), fields(job_id = %config.job_id))]
async fn execute(
    runner: Arc<dyn JobRunner>,
    config: ScheduleConfig,
    trigger: RunTrigger,
    flag: Arc<AtomicBool>,
) {
    let Some(_guard) = RunGuard::acquire(&flag) else {
        warn!(?trigger, "Previous run still in progress, skipping");
        return;
    };

    let window = config.window_for(trigger, Local::now().date_naive());
    debug!(start = %window.start, end = %window.end, "Running job");
    runner.run(&config, window, trigger).await;
}
