use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Inclusive calendar date range a crawl run operates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CrawlWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(AppError::InvalidSchedule(format!(
                "window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// `[today - days, today]`
    pub fn relative(today: NaiveDate, days: u32) -> Self {
        Self {
            start: today - Duration::days(i64::from(days)),
            end: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Window parameters persisted with a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowParams {
    /// Rolling window ending today. `period_days` is the lookback of the
    /// immediate run, `check_previous_days` the lookback of interval ticks.
    Relative {
        period_days: u32,
        check_previous_days: u32,
    },
    Explicit {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

/// What caused a job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    /// Out-of-band execution right after `schedule()`.
    Immediate,
    /// Regular timer tick.
    Interval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub job_id: String,
    /// 0 runs every configured source.
    pub topic_id: i64,
    pub interval_hours: u32,
    pub window: WindowParams,
    pub max_articles: Option<u32>,
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.job_id.trim().is_empty() {
            return Err(AppError::InvalidSchedule("job id must not be empty".into()));
        }
        if self.interval_hours == 0 {
            return Err(AppError::InvalidSchedule(
                "interval_hours must be greater than zero".into(),
            ));
        }
        if self.topic_id < 0 {
            return Err(AppError::InvalidSchedule(format!(
                "topic id {} is negative",
                self.topic_id
            )));
        }
        if self.max_articles == Some(0) {
            return Err(AppError::InvalidSchedule(
                "max_articles must be greater than zero when set".into(),
            ));
        }
        match self.window {
            WindowParams::Relative { period_days, .. } if period_days == 0 => Err(
                AppError::InvalidSchedule("period_days must be at least 1".into()),
            ),
            WindowParams::Explicit {
                start_date,
                end_date,
            } => CrawlWindow::new(start_date, end_date).map(|_| ()),
            WindowParams::Relative { .. } => Ok(()),
        }
    }

    pub fn window_for(&self, trigger: RunTrigger, today: NaiveDate) -> CrawlWindow {
        match (self.window, trigger) {
            (WindowParams::Relative { period_days, .. }, RunTrigger::Immediate) => {
                CrawlWindow::relative(today, period_days)
            }
            (
                WindowParams::Relative {
                    check_previous_days,
                    ..
                },
                RunTrigger::Interval,
            ) => CrawlWindow::relative(today, check_previous_days),
            (
                WindowParams::Explicit {
                    start_date,
                    end_date,
                },
                _,
            ) => CrawlWindow {
                start: start_date,
                end: end_date,
            },
        }
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.interval_hours) * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn relative_job() -> ScheduleConfig {
        ScheduleConfig {
            job_id: "period_parser".into(),
            topic_id: 0,
            interval_hours: 6,
            window: WindowParams::Relative {
                period_days: 7,
                check_previous_days: 2,
            },
            max_articles: None,
        }
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(CrawlWindow::new(date(2025, 5, 10), date(2025, 5, 3)).is_err());
        let window = CrawlWindow::new(date(2025, 5, 3), date(2025, 5, 10)).unwrap();
        assert!(window.contains(date(2025, 5, 3)));
        assert!(window.contains(date(2025, 5, 10)));
        assert!(!window.contains(date(2025, 5, 11)));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut job = relative_job();
        job.interval_hours = 0;
        assert!(matches!(job.validate(), Err(AppError::InvalidSchedule(_))));
    }

    #[test]
    fn test_validate_rejects_malformed_windows() {
        let mut job = relative_job();
        job.window = WindowParams::Relative {
            period_days: 0,
            check_previous_days: 0,
        };
        assert!(job.validate().is_err());

        job.window = WindowParams::Explicit {
            start_date: date(2025, 2, 1),
            end_date: date(2025, 1, 1),
        };
        assert!(job.validate().is_err());

        job.window = WindowParams::Explicit {
            start_date: date(2025, 1, 1),
            end_date: date(2025, 1, 1),
        };
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_relative_window_depends_on_trigger() {
        let job = relative_job();
        let today = date(2025, 5, 10);

        let first = job.window_for(RunTrigger::Immediate, today);
        assert_eq!(first.start, date(2025, 5, 3));
        assert_eq!(first.end, today);

        let tick = job.window_for(RunTrigger::Interval, today);
        assert_eq!(tick.start, date(2025, 5, 8));
        assert_eq!(tick.end, today);
    }

    #[test]
    fn test_explicit_window_ignores_trigger() {
        let mut job = relative_job();
        job.window = WindowParams::Explicit {
            start_date: date(2025, 5, 3),
            end_date: date(2025, 5, 10),
        };
        let today = date(2026, 1, 1);
        assert_eq!(
            job.window_for(RunTrigger::Immediate, today),
            job.window_for(RunTrigger::Interval, today)
        );
    }
}
