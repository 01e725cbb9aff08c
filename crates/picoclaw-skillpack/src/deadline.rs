use std::io::Write as _;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use picoclaw_caldav::{CalDavClient, CalDavItem, IcsDateTime, ItemKind};
use picoclaw_core::error::{PicoclawError, Result};
use picoclaw_scheduler::DeadlineInstants;
use picoclaw_skills::{Skill, SkillContext, ToolResult, Workspace};
use serde_json::{json, Value};

const IDENTITY: &str = "You are the deadline skill (architect): you classify open CalDAV items by \
due-date pressure and keep today's dashboard current.\n";

const DASHBOARD_FILE: &str = "deadlines-today.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Urgent,
    Upcoming,
    Completed,
}

impl Bucket {
    fn heading(self) -> &'static str {
        match self {
            Bucket::Urgent => "URGENT",
            Bucket::Upcoming => "UPCOMING",
            Bucket::Completed => "COMPLETED",
        }
    }
}

/// The architect skill: classifies VTODO/VEVENT items by due-date pressure
/// and writes `memory/deadlines-today.md` plus a structured instants
/// sidecar the heartbeat reads instead of scanning the markdown (spec.md §9
/// REDESIGN FLAGS).
pub struct DeadlineSkill {
    workspace: RwLock<Option<Workspace>>,
    tasks_client: CalDavClient,
    calendar_client: CalDavClient,
}

impl DeadlineSkill {
    pub fn new(tasks_client: CalDavClient, calendar_client: CalDavClient) -> Self {
        Self {
            workspace: RwLock::new(None),
            tasks_client,
            calendar_client,
        }
    }

    fn workspace(&self) -> Result<Workspace> {
        self.workspace
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| PicoclawError::Workspace("deadline skill workspace not set".to_string()))
    }

    fn due_instant(item: &CalDavItem) -> Option<DateTime<Utc>> {
        match item.due.as_ref().or(item.dtstart.as_ref())? {
            IcsDateTime::DateTime(dt) => Some(*dt),
            IcsDateTime::Date(d) => NaiveDate::parse_from_str(d, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
        }
    }

    fn classify(item: &CalDavItem, now: DateTime<Utc>) -> Bucket {
        if let Some(status) = item.status {
            if status.is_terminal() {
                return Bucket::Completed;
            }
        }
        match Self::due_instant(item) {
            Some(due) if due <= now + chrono::Duration::hours(2) => Bucket::Urgent,
            _ => Bucket::Upcoming,
        }
    }

    async fn fetch_all_items(&self) -> Result<Vec<CalDavItem>> {
        let mut items = Vec::new();
        for href in self.tasks_client.list().await.map_err(|e| PicoclawError::Remote {
            status: 0,
            message: format!("tasks list: {e}"),
        })? {
            if let Ok(item) = self.tasks_client.get(&href).await {
                items.push(item);
            }
        }
        for href in self.calendar_client.list().await.map_err(|e| PicoclawError::Remote {
            status: 0,
            message: format!("calendar list: {e}"),
        })? {
            if let Ok(item) = self.calendar_client.get(&href).await {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn sync_deadlines(&self) -> ToolResult {
        let workspace = match self.workspace() {
            Ok(w) => w,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let items = match self.fetch_all_items().await {
            Ok(i) => i,
            Err(e) => return ToolResult::error(format!("sync_deadlines: {e}")),
        };

        let now = Utc::now();
        let mut urgent = Vec::new();
        let mut upcoming = Vec::new();
        let mut completed = Vec::new();
        let mut instants = Vec::new();

        for item in &items {
            if let Some(due) = Self::due_instant(item) {
                instants.push(due);
            }
            match Self::classify(item, now) {
                Bucket::Urgent => urgent.push(item),
                Bucket::Upcoming => upcoming.push(item),
                Bucket::Completed => completed.push(item),
            }
        }
        urgent.sort_by_key(|i| Self::due_instant(i));
        upcoming.sort_by_key(|i| Self::due_instant(i));

        let mut md = format!("# Deadlines — {}\n\n", now.format("%Y-%m-%d"));
        for (bucket, list) in [(Bucket::Urgent, &urgent), (Bucket::Upcoming, &upcoming), (Bucket::Completed, &completed)] {
            md.push_str(&format!("## {}\n\n", bucket.heading()));
            if list.is_empty() {
                md.push_str("_none_\n\n");
                continue;
            }
            for item in list.iter() {
                let due = Self::due_instant(item).map(|d| d.format("%Y-%m-%dT%H:%M").to_string()).unwrap_or_default();
                md.push_str(&format!("- {} ({}) — due {}\n", item.summary, item.kind.component_name(), due));
            }
            md.push('\n');
        }

        let dashboard_path = workspace.memory_path(DASHBOARD_FILE);
        if let Err(e) = write_atomic(&dashboard_path, &md) {
            return ToolResult::error(format!("sync_deadlines: {e}"));
        }

        let sidecar = DeadlineInstants { instants };
        let sidecar_path = dashboard_path.with_extension("instants.json");
        let sidecar_json = serde_json::to_string(&sidecar).unwrap_or_default();
        if let Err(e) = write_atomic(&sidecar_path, &sidecar_json) {
            return ToolResult::error(format!("sync_deadlines: writing sidecar: {e}"));
        }

        ToolResult::success(format!(
            "Dashboard updated: {} urgent, {} upcoming, {} completed.",
            urgent.len(),
            upcoming.len(),
            completed.len()
        ))
    }

    async fn create_task(&self, args: &Value) -> ToolResult {
        let Some(title) = args.get("title").and_then(|v| v.as_str()) else {
            return ToolResult::error("'title' is required for create_task");
        };
        let is_event = args.get("kind").and_then(|v| v.as_str()) == Some("event");
        let mut item = if is_event { CalDavItem::new_event(title) } else { CalDavItem::new_todo(title) };

        if let Some(date) = args.get("target_date").and_then(|v| v.as_str()) {
            let value = IcsDateTime::Date(date.replace('-', ""));
            if item.kind == ItemKind::Event {
                item.dtstart = Some(value);
            } else {
                item.due = Some(value);
            }
        }
        if args.get("task_type").and_then(|v| v.as_str()) == Some("recurring") {
            let Some(interval) = args.get("interval_days").and_then(|v| v.as_u64()) else {
                return ToolResult::error("'interval_days' is required when task_type=recurring");
            };
            item.rrule_interval_days = Some(interval as u32);
        }

        let client = if is_event { &self.calendar_client } else { &self.tasks_client };
        match client.put(&item).await {
            Ok(()) => ToolResult::success(format!("Created '{title}' (uid {}).", item.uid)),
            Err(e) => ToolResult::error(format!("create_task: {e}")),
        }
    }

    async fn delete_task(&self, args: &Value) -> ToolResult {
        if let Some(uid) = args.get("uid").and_then(|v| v.as_str()) {
            return match self.tasks_client.delete(&format!("{uid}.ics")).await {
                Ok(()) => ToolResult::success(format!("Deleted '{uid}'.")),
                Err(e) => ToolResult::error(format!("delete_task: {e}")),
            };
        }
        let Some(title) = args.get("title").and_then(|v| v.as_str()) else {
            return ToolResult::error("either 'uid' or 'title' is required for delete_task");
        };
        let hrefs = match self.tasks_client.list().await {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("delete_task: {e}")),
        };
        for href in hrefs {
            if let Ok(item) = self.tasks_client.get(&href).await {
                if item.summary == title {
                    return match self.tasks_client.delete(&href).await {
                        Ok(()) => ToolResult::success(format!("Deleted '{title}'.")),
                        Err(e) => ToolResult::error(format!("delete_task: {e}")),
                    };
                }
            }
        }
        ToolResult::error(format!("delete_task: no item found matching title '{title}'"))
    }
}

fn write_atomic(path: &std::path::Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(content.as_bytes())?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl Skill for DeadlineSkill {
    fn name(&self) -> &str {
        "deadline"
    }

    fn description(&self) -> &str {
        "Architect skill: classifies open CalDAV items into urgent/upcoming/completed and maintains \
         today's dashboard. Commands: sync_deadlines, create_task, delete_task."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "enum": ["sync_deadlines", "create_task", "delete_task"]},
                "title": {"type": "string"},
                "uid": {"type": "string"},
                "kind": {"type": "string", "enum": ["task", "event"]},
                "target_date": {"type": "string", "description": "YYYY-MM-DD"},
                "task_type": {"type": "string", "enum": ["once", "recurring"]},
                "interval_days": {"type": "integer"}
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&self, workspace: Workspace) -> Result<()> {
        workspace.init("deadline", IDENTITY)?;
        *self.workspace.write().unwrap() = Some(workspace);
        Ok(())
    }

    async fn execute(&self, _ctx: &SkillContext, args: Value) -> ToolResult {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("missing required field 'command'");
        };
        match command {
            "sync_deadlines" => self.sync_deadlines().await,
            "create_task" => self.create_task(&args).await,
            "delete_task" => self.delete_task(&args).await,
            other => ToolResult::error(format!("unknown command '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill() -> DeadlineSkill {
        DeadlineSkill::new(
            CalDavClient::new("https://cloud.example.com/tasks/", "u", "p"),
            CalDavClient::new("https://cloud.example.com/personal/", "u", "p"),
        )
    }

    #[test]
    fn classify_terminal_status_is_completed() {
        let mut item = CalDavItem::new_todo("x");
        item.status = Some(picoclaw_caldav::TaskStatus::Completed);
        assert_eq!(DeadlineSkill::classify(&item, Utc::now()), Bucket::Completed);
    }

    #[test]
    fn classify_imminent_due_is_urgent() {
        let mut item = CalDavItem::new_todo("x");
        item.due = Some(IcsDateTime::DateTime(Utc::now() + chrono::Duration::minutes(30)));
        assert_eq!(DeadlineSkill::classify(&item, Utc::now()), Bucket::Urgent);
    }

    #[test]
    fn classify_far_due_is_upcoming() {
        let mut item = CalDavItem::new_todo("x");
        item.due = Some(IcsDateTime::DateTime(Utc::now() + chrono::Duration::days(5)));
        assert_eq!(DeadlineSkill::classify(&item, Utc::now()), Bucket::Upcoming);
    }

    #[tokio::test]
    async fn create_task_requires_title() {
        let skill = skill();
        let result = skill.create_task(&json!({})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn create_task_recurring_requires_interval_days() {
        let skill = skill();
        let result = skill.create_task(&json!({"title": "Medicine", "task_type": "recurring"})).await;
        assert!(result.is_error);
    }
}
