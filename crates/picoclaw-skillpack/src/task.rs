use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use picoclaw_caldav::{CalDavClient, CalDavItem, IcsDateTime, TaskStatus};
use picoclaw_core::error::{PicoclawError, Result};
use picoclaw_skills::{Skill, SkillContext, ToolResult, Workspace};
use serde_json::{json, Value};

use crate::format::ics_xml::{self, MirrorEntry};

const IDENTITY: &str = "You are the task skill (air-traffic controller): you triage the local task \
mirror and keep it synchronized with the Nextcloud tasks collection.\n";

const MIRROR_FILE: &str = "tasks.xml";
const KEYWORD_MIN_LEN: usize = 5;

/// Air-traffic-controller skill: local ICS-as-XML mirror plus CalDAV round
/// trips against the tasks collection (spec.md §4.7 "Task skill").
pub struct TaskSkill {
    workspace: RwLock<Option<Workspace>>,
    tasks_client: CalDavClient,
    calendar_client: CalDavClient,
}

impl TaskSkill {
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
            .ok_or_else(|| PicoclawError::Workspace("task skill workspace not set".to_string()))
    }

    fn mirror_path(&self) -> Result<std::path::PathBuf> {
        Ok(self.workspace()?.memory_path(MIRROR_FILE))
    }

    fn load_mirror(&self) -> Result<Vec<MirrorEntry>> {
        ics_xml::parse_mirror(&self.mirror_path()?)
    }

    fn save_mirror(&self, entries: &[MirrorEntry]) -> Result<()> {
        ics_xml::write_mirror(&self.mirror_path()?, entries)
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    /// Score an open "Today" item: lower priority number = more urgent;
    /// an overdue or due-today item adds pressure on top.
    fn urgency_score(entry: &MirrorEntry, today: NaiveDate) -> i32 {
        let priority_score = 10 - entry.priority.unwrap_or(5).min(9) as i32;
        let due_score = match entry.due.get(0..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
            Some(due) if due <= today => 20,
            Some(due) if due == today + chrono::Duration::days(1) => 5,
            _ => 0,
        };
        priority_score + due_score
    }

    fn analyze_tasks(&self) -> ToolResult {
        let entries = match self.load_mirror() {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("analyze_tasks: {e}")),
        };
        let today = Self::today();
        let mut open: Vec<&MirrorEntry> =
            entries.iter().filter(|e| e.category == "Today" && e.kind == "task" && e.is_open()).collect();
        open.sort_by(|a, b| Self::urgency_score(b, today).cmp(&Self::urgency_score(a, today)));

        if open.is_empty() {
            return ToolResult::success("No open tasks in Today.");
        }
        let mut out = String::from("Open Today tasks, by urgency:\n");
        for e in open {
            out.push_str(&format!(
                "- [{}] {} (priority {}, due {})\n",
                e.uid,
                e.summary,
                e.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                if e.due.is_empty() { "-" } else { &e.due }
            ));
        }
        ToolResult::success(out)
    }

    fn read_calendar(&self) -> ToolResult {
        let entries = match self.load_mirror() {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("read_calendar: {e}")),
        };
        let today = Self::today().format("%Y-%m-%d").to_string();
        let mut todays: Vec<&MirrorEntry> =
            entries.iter().filter(|e| e.kind == "event" && e.due.starts_with(&today)).collect();
        todays.sort_by(|a, b| a.due.cmp(&b.due));

        if todays.is_empty() {
            return ToolResult::success("No events today.");
        }
        let mut out = String::from("Today's events:\n");
        for e in todays {
            out.push_str(&format!("- {} at {}\n", e.summary, e.due));
        }
        ToolResult::success(out)
    }

    fn extract_keywords(&self) -> ToolResult {
        let entries = match self.load_mirror() {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("extract_keywords: {e}")),
        };
        let mut keywords: Vec<String> = Vec::new();
        for e in entries.iter().filter(|e| e.category == "Tomorrow") {
            for word in format!("{} {}", e.summary, e.description).split_whitespace() {
                let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
                if cleaned.chars().count() >= KEYWORD_MIN_LEN && !keywords.contains(&cleaned) {
                    keywords.push(cleaned);
                }
            }
        }
        if keywords.is_empty() {
            return ToolResult::success("No keywords extracted from Tomorrow items.");
        }
        ToolResult::success(keywords.join(", "))
    }

    fn update_task(&self, args: &Value) -> ToolResult {
        let Some(uid) = args.get("uid").and_then(|v| v.as_str()) else {
            return ToolResult::error("'uid' is required for update_task");
        };
        let mut entries = match self.load_mirror() {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("update_task: {e}")),
        };
        let Some(entry) = entries.iter_mut().find(|e| e.uid == uid) else {
            return ToolResult::error(format!("update_task: no local entry with uid '{uid}'"));
        };
        if let Some(status) = args.get("status").and_then(|v| v.as_str()) {
            entry.status = status.to_uppercase();
        }
        if let Some(due) = args.get("due").and_then(|v| v.as_str()) {
            entry.due = due.to_string();
        }
        if let Some(priority) = args.get("priority").and_then(|v| v.as_u64()) {
            entry.priority = Some(priority as u8);
        }
        if let Some(category) = args.get("category").and_then(|v| v.as_str()) {
            entry.category = category.to_string();
        }
        if let Some(summary) = args.get("summary").and_then(|v| v.as_str()) {
            entry.summary = summary.to_string();
        }
        if let Err(e) = self.save_mirror(&entries) {
            return ToolResult::error(format!("update_task: {e}"));
        }
        ToolResult::success(format!("Updated local task '{uid}'."))
    }

    /// Move still-open "Today" items whose due date has already passed
    /// back into "Today" so they are never silently dropped by category
    /// drift — the rollover spec.md §4.7 names without prescribing a
    /// target bucket.
    fn roll_over_tasks(&self) -> ToolResult {
        let mut entries = match self.load_mirror() {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("roll_over_tasks: {e}")),
        };
        let today = Self::today();
        let mut rolled = 0;
        for entry in entries.iter_mut() {
            if !entry.is_open() || entry.kind != "task" {
                continue;
            }
            let overdue = entry
                .due
                .get(0..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .map(|due| due < today)
                .unwrap_or(false);
            if overdue && entry.category != "Today" {
                entry.category = "Today".to_string();
                rolled += 1;
            }
        }
        if rolled > 0 {
            if let Err(e) = self.save_mirror(&entries) {
                return ToolResult::error(format!("roll_over_tasks: {e}"));
            }
        }
        ToolResult::success(format!("Rolled over {rolled} overdue task(s) into Today."))
    }

    fn category_for_due(due: &str, today: NaiveDate) -> String {
        match due.get(0..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
            Some(d) if d <= today => "Today".to_string(),
            Some(d) if d == today + chrono::Duration::days(1) => "Tomorrow".to_string(),
            _ => "Later".to_string(),
        }
    }

    async fn sync_calendar(&self) -> ToolResult {
        let hrefs = match self.calendar_client.list().await {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("sync_calendar: list failed: {e}")),
        };
        let mut entries = match self.load_mirror() {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("sync_calendar: {e}")),
        };
        let today = Self::today();
        let mut synced = 0;
        for href in &hrefs {
            let item = match self.calendar_client.get(href).await {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(href, error = %e, "sync_calendar: skipping unreadable event");
                    continue;
                }
            };
            let due = item.dtstart.as_ref().map(|d| d.to_ics_value()).unwrap_or_default();
            let category = Self::category_for_due(&due, today);
            let entry = MirrorEntry {
                uid: item.uid.clone(),
                kind: "event".to_string(),
                summary: item.summary.clone(),
                category,
                status: String::new(),
                priority: None,
                due,
                description: item.description.clone().unwrap_or_default(),
            };
            entries.retain(|e| e.uid != entry.uid);
            entries.push(entry);
            synced += 1;
        }
        if let Err(e) = self.save_mirror(&entries) {
            return ToolResult::error(format!("sync_calendar: {e}"));
        }
        ToolResult::success(format!("Synced {synced} calendar event(s) into the local mirror."))
    }

    async fn push_task(&self, args: &Value) -> ToolResult {
        let Some(title) = args.get("title").and_then(|v| v.as_str()) else {
            return ToolResult::error("'title' is required for push_task");
        };
        let mut item = CalDavItem::new_todo(title);
        if let Some(priority) = args.get("priority").and_then(|v| v.as_u64()) {
            item.priority = Some(priority as u8);
        }
        if let Some(due) = args.get("due").and_then(|v| v.as_str()) {
            item.due = Some(IcsDateTime::Date(due.replace('-', "")));
        }
        if let Some(task_type) = args.get("task_type").and_then(|v| v.as_str()) {
            if task_type == "recurring" {
                let Some(interval) = args.get("interval_days").and_then(|v| v.as_u64()) else {
                    return ToolResult::error("'interval_days' is required when task_type=recurring");
                };
                item.rrule_interval_days = Some(interval as u32);
            }
        }
        match self.tasks_client.put(&item).await {
            Ok(()) => ToolResult::success(format!("Created task '{title}' (uid {}).", item.uid)),
            Err(e) => ToolResult::error(format!("push_task: {e}")),
        }
    }

    async fn list_nextcloud_tasks(&self) -> ToolResult {
        let hrefs = match self.tasks_client.list().await {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("list_nextcloud_tasks: {e}")),
        };
        if hrefs.is_empty() {
            return ToolResult::success("No tasks on the remote collection.");
        }
        ToolResult::success(format!("{} remote task(s): {}", hrefs.len(), hrefs.join(", ")))
    }

    async fn get_task(&self, args: &Value) -> ToolResult {
        let Some(uid) = args.get("uid").and_then(|v| v.as_str()) else {
            return ToolResult::error("'uid' is required for get_task");
        };
        match self.tasks_client.get(&format!("{uid}.ics")).await {
            Ok(item) => ToolResult::success(format!(
                "{} | status {:?} | due {:?} | priority {:?}",
                item.summary, item.status, item.due, item.priority
            )),
            Err(e) => ToolResult::error(format!("get_task: {e}")),
        }
    }

    async fn merge_task(&self, args: &Value) -> ToolResult {
        let Some(uid) = args.get("uid").and_then(|v| v.as_str()) else {
            return ToolResult::error("'uid' is required for merge_task");
        };
        let status = args.get("status").and_then(|v| v.as_str()).and_then(TaskStatus::parse);
        let summary = args.get("summary").and_then(|v| v.as_str()).map(String::from);
        let priority = args.get("priority").and_then(|v| v.as_u64()).map(|p| p as u8);

        let result = self
            .tasks_client
            .merge(&format!("{uid}.ics"), |item| {
                if let Some(s) = status {
                    item.status = Some(s);
                }
                if let Some(summary) = &summary {
                    item.summary = summary.clone();
                }
                if let Some(p) = priority {
                    item.priority = Some(p);
                }
            })
            .await;

        match result {
            Ok(_) => ToolResult::success(format!("Merged task '{uid}'.")),
            Err(e) => ToolResult::error(format!("merge_task: {e}")),
        }
    }

    async fn delete_task(&self, args: &Value) -> ToolResult {
        let Some(uid) = args.get("uid").and_then(|v| v.as_str()) else {
            return ToolResult::error("'uid' is required for delete_task");
        };
        match self.tasks_client.delete(&format!("{uid}.ics")).await {
            Ok(()) => ToolResult::success(format!("Deleted task '{uid}'.")),
            Err(e) => ToolResult::error(format!("delete_task: {e}")),
        }
    }
}

#[async_trait]
impl Skill for TaskSkill {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Air-traffic controller for the local task mirror and the Nextcloud tasks collection. \
         Commands: analyze_tasks, read_calendar, extract_keywords, update_task, roll_over_tasks \
         (local mirror only); sync_calendar, push_task, list_nextcloud_tasks, get_task, merge_task, \
         delete_task (CalDAV round trips)."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": [
                        "analyze_tasks", "read_calendar", "extract_keywords", "update_task",
                        "roll_over_tasks", "sync_calendar", "push_task", "list_nextcloud_tasks",
                        "get_task", "merge_task", "delete_task"
                    ]
                },
                "uid": {"type": "string", "description": "Task UID, required for update/get/merge/delete"},
                "title": {"type": "string", "description": "Required for push_task"},
                "summary": {"type": "string"},
                "status": {"type": "string", "enum": ["NEEDS-ACTION", "IN-PROCESS", "COMPLETED", "CANCELLED"]},
                "due": {"type": "string", "description": "YYYY-MM-DD"},
                "priority": {"type": "integer", "minimum": 0, "maximum": 9},
                "category": {"type": "string", "enum": ["Today", "Tomorrow", "Later"]},
                "task_type": {"type": "string", "enum": ["once", "recurring"]},
                "interval_days": {"type": "integer", "description": "Required when task_type=recurring"}
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&self, workspace: Workspace) -> Result<()> {
        workspace.init("task", IDENTITY)?;
        *self.workspace.write().unwrap() = Some(workspace);
        Ok(())
    }

    async fn execute(&self, _ctx: &SkillContext, args: Value) -> ToolResult {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("missing required field 'command'");
        };

        match command {
            "analyze_tasks" => self.analyze_tasks(),
            "read_calendar" => self.read_calendar(),
            "extract_keywords" => self.extract_keywords(),
            "update_task" => self.update_task(&args),
            "roll_over_tasks" => self.roll_over_tasks(),
            "sync_calendar" => self.sync_calendar().await,
            "push_task" => self.push_task(&args).await,
            "list_nextcloud_tasks" => self.list_nextcloud_tasks().await,
            "get_task" => self.get_task(&args).await,
            "merge_task" => self.merge_task(&args).await,
            "delete_task" => self.delete_task(&args).await,
            other => ToolResult::error(format!("unknown command '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn skill() -> TaskSkill {
        TaskSkill::new(
            CalDavClient::new("https://cloud.example.com/tasks/", "u", "p"),
            CalDavClient::new("https://cloud.example.com/personal/", "u", "p"),
        )
    }

    fn entry(uid: &str, category: &str, priority: Option<u8>, due: &str) -> MirrorEntry {
        MirrorEntry {
            uid: uid.to_string(),
            kind: "task".to_string(),
            summary: format!("task {uid}"),
            category: category.to_string(),
            status: "NEEDS-ACTION".to_string(),
            priority,
            due: due.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn analyze_tasks_sorts_by_urgency() {
        let skill = skill();
        let dir = tempdir().unwrap();
        skill.set_workspace(Workspace::new(dir.path().join("task"))).unwrap();

        let today = TaskSkill::today().format("%Y-%m-%d").to_string();
        let entries = vec![
            entry("low", "Today", Some(9), "2099-01-01"),
            entry("urgent", "Today", Some(0), &today),
        ];
        skill.save_mirror(&entries).unwrap();

        let result = skill.analyze_tasks();
        assert!(!result.is_error);
        let urgent_pos = result.for_llm.find("urgent").unwrap();
        let low_pos = result.for_llm.find("low").unwrap();
        assert!(urgent_pos < low_pos);
    }

    #[test]
    fn extract_keywords_only_considers_tomorrow_category() {
        let skill = skill();
        let dir = tempdir().unwrap();
        skill.set_workspace(Workspace::new(dir.path().join("task"))).unwrap();

        let mut e1 = entry("a", "Tomorrow", None, "");
        e1.summary = "Finalize quarterly budget".to_string();
        let mut e2 = entry("b", "Today", None, "");
        e2.summary = "Quickcall".to_string();
        skill.save_mirror(&[e1, e2]).unwrap();

        let result = skill.extract_keywords();
        assert!(result.for_llm.contains("Finalize"));
        assert!(!result.for_llm.contains("Quickcall"));
    }

    #[test]
    fn update_task_unknown_uid_errors() {
        let skill = skill();
        let dir = tempdir().unwrap();
        skill.set_workspace(Workspace::new(dir.path().join("task"))).unwrap();
        let result = skill.update_task(&json!({"uid": "missing", "status": "COMPLETED"}));
        assert!(result.is_error);
    }

    #[test]
    fn roll_over_moves_overdue_items_into_today() {
        let skill = skill();
        let dir = tempdir().unwrap();
        skill.set_workspace(Workspace::new(dir.path().join("task"))).unwrap();
        skill.save_mirror(&[entry("a", "Tomorrow", None, "2020-01-01")]).unwrap();

        let result = skill.roll_over_tasks();
        assert!(result.for_llm.contains('1'));
        let entries = skill.load_mirror().unwrap();
        assert_eq!(entries[0].category, "Today");
    }
}
