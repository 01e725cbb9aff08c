use serde::{Deserialize, Serialize};

/// VTODO (task) or VEVENT (calendar event) — spec.md §3 "CalDAV item".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Todo,
    Event,
}

impl ItemKind {
    pub fn component_name(self) -> &'static str {
        match self {
            ItemKind::Todo => "VTODO",
            ItemKind::Event => "VEVENT",
        }
    }
}

/// Lifecycle status of a VTODO. Case-insensitive on input, stored upper-case
/// (spec.md §4.7 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    NeedsAction,
    InProcess,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_ics(self) -> &'static str {
        match self {
            TaskStatus::NeedsAction => "NEEDS-ACTION",
            TaskStatus::InProcess => "IN-PROCESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NEEDS-ACTION" => Some(TaskStatus::NeedsAction),
            "IN-PROCESS" => Some(TaskStatus::InProcess),
            "COMPLETED" => Some(TaskStatus::Completed),
            "CANCELLED" | "CANCELED" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never transition further (spec.md §4.7).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// A date-only value (`;VALUE=DATE:YYYYMMDD`) or an absolute UTC instant
/// (`...Z`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcsDateTime {
    Date(String),
    DateTime(chrono::DateTime<chrono::Utc>),
}

impl IcsDateTime {
    pub fn to_ics_value(&self) -> String {
        match self {
            IcsDateTime::Date(d) => d.clone(),
            IcsDateTime::DateTime(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
        }
    }

    pub fn is_date_only(&self) -> bool {
        matches!(self, IcsDateTime::Date(_))
    }
}

/// An ICS payload identified by a UUID used as the filename (`<uuid>.ics`).
/// spec.md §3 "CalDAV item".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalDavItem {
    pub kind: ItemKind,
    pub uid: String,
    pub summary: String,
    pub status: Option<TaskStatus>,
    pub due: Option<IcsDateTime>,
    pub dtstart: Option<IcsDateTime>,
    pub priority: Option<u8>,
    pub percent_complete: Option<u8>,
    /// `FREQ=DAILY;INTERVAL=<n>` — only daily recurrence is produced by this
    /// core (spec.md §8 "Round-trip and idempotence").
    pub rrule_interval_days: Option<u32>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub completed: Option<chrono::DateTime<chrono::Utc>>,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

impl CalDavItem {
    pub fn new_todo(summary: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Todo,
            uid: uuid::Uuid::new_v4().to_string(),
            summary: summary.into(),
            status: Some(TaskStatus::NeedsAction),
            due: None,
            dtstart: None,
            priority: None,
            percent_complete: None,
            rrule_interval_days: None,
            location: None,
            description: None,
            url: None,
            completed: None,
            last_modified: None,
        }
    }

    pub fn new_event(summary: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Event,
            uid: uuid::Uuid::new_v4().to_string(),
            summary: summary.into(),
            status: None,
            due: None,
            dtstart: None,
            priority: None,
            percent_complete: None,
            rrule_interval_days: None,
            location: None,
            description: None,
            url: None,
            completed: None,
            last_modified: None,
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.ics", self.uid)
    }
}
