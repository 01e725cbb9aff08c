use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Result, SchedulerError};
use crate::store::JobStore;
use crate::types::JobSchedule;

/// Parse a cron expression, tolerating the common 5-field Unix form
/// (minute hour day-of-month month day-of-week) by prepending a `0`
/// seconds field — the `cron` crate's parser requires one (spec.md §4.6
/// requires only 1-minute granularity, so the seconds field is always 0).
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let field_count = expression.split_whitespace().count();
    let normalized = if field_count == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedule(format!("{expression}: {e}")))
}

fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt - Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64) - Duration::seconds(dt.timestamp() % 60)
}

/// Evaluates cron-scheduled jobs at 1-minute granularity (spec.md §4.6).
/// A job fires at most once per scheduled instant across restarts: the
/// last-fired minute is compared against the job's persisted `last_run`.
pub struct CronService {
    store: Arc<JobStore>,
}

impl CronService {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Run the 1-minute tick loop until `cancel` fires. `on_due` is invoked
    /// with each due job's id and payload; the caller drives the tool-call
    /// loop with it.
    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut on_due: F)
    where
        F: FnMut(crate::types::Job) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for job in self.due_jobs(Utc::now()) {
                        let id = job.id.clone();
                        if let Err(e) = self.store.mark_run(&id, Utc::now()) {
                            error!(job_id = %id, "failed to persist cron last_run: {e}");
                        }
                        on_due(job).await;
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("cron service shutting down");
                    return;
                }
            }
        }
    }

    fn due_jobs(&self, now: DateTime<Utc>) -> Vec<crate::types::Job> {
        let this_minute = truncate_to_minute(now);
        let mut due = Vec::new();
        for job in self.store.list() {
            let JobSchedule::Cron { expression } = &job.schedule else {
                continue;
            };
            let schedule = match parse_schedule(expression) {
                Ok(s) => s,
                Err(e) => {
                    warn!(job_id = %job.id, "skipping job with invalid schedule: {e}");
                    continue;
                }
            };
            if !schedule.includes(now) {
                continue;
            }
            if let Some(last_run) = job.last_run {
                if truncate_to_minute(last_run) >= this_minute {
                    continue;
                }
            }
            due.push(job);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picoclaw_core::types::ChannelOrigin;
    use crate::types::Job;

    #[test]
    fn five_field_expression_is_accepted() {
        assert!(parse_schedule("*/5 * * * *").is_ok());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(parse_schedule("not a cron expr").is_err());
    }

    #[test]
    fn job_already_run_this_minute_is_not_due_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::open(dir.path().join("jobs.json")).unwrap());
        let mut job = Job::new_cron("every-minute", "* * * * *", "ping", ChannelOrigin::internal());
        job.last_run = Some(Utc::now());
        store.add(job).unwrap();

        let service = CronService::new(store);
        let due = service.due_jobs(Utc::now());
        assert!(due.is_empty());
    }

    #[test]
    fn job_never_run_matching_schedule_is_due() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::open(dir.path().join("jobs.json")).unwrap());
        store
            .add(Job::new_cron("every-minute", "* * * * *", "ping", ChannelOrigin::internal()))
            .unwrap();

        let service = CronService::new(store);
        let due = service.due_jobs(Utc::now());
        assert_eq!(due.len(), 1);
    }
}
