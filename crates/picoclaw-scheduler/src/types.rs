use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use picoclaw_core::types::ChannelOrigin;

/// spec.md §3 "Scheduled job": a cron expression or fixed interval, the
/// payload prompt to drive the tool-call loop with, and the origin
/// channel/chat to publish the reply on. Persisted as JSON, not SQLite
/// (unlike the teacher's `jobs` table) — see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub schedule: JobSchedule,
    pub payload: String,
    pub origin: ChannelOrigin,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSchedule {
    /// Standard 5-field (minute hour day-of-month month day-of-week) or
    /// 6-field (with a leading seconds field) cron expression.
    Cron { expression: String },
    /// Fixed interval in seconds.
    Interval { every_secs: u64 },
}

impl Job {
    pub fn new_cron(name: impl Into<String>, expression: impl Into<String>, payload: impl Into<String>, origin: ChannelOrigin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            schedule: JobSchedule::Cron { expression: expression.into() },
            payload: payload.into(),
            origin,
            last_run: None,
            created_at: Utc::now(),
        }
    }

    pub fn new_interval(name: impl Into<String>, every_secs: u64, payload: impl Into<String>, origin: ChannelOrigin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            schedule: JobSchedule::Interval { every_secs },
            payload: payload.into(),
            origin,
            last_run: None,
            created_at: Utc::now(),
        }
    }
}
