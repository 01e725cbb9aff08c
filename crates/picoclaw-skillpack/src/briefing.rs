use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use picoclaw_core::error::{PicoclawError, Result};
use picoclaw_scheduler::DeadlineInstants;
use picoclaw_skills::{Skill, SkillContext, ToolResult, Workspace};
use serde_json::{json, Value};

const IDENTITY: &str = "You are the briefing skill (chief): you compose the morning and evening \
digests from the other skills' memory files and decide where delegated requests belong.\n";

const TASK_RECORD_CAP: usize = 20;
const NEWS_RECORD_CAP: usize = 20;
const RESEARCH_RECORD_CAP: usize = 15;

/// Where each other skill keeps the files the chief reads. These are
/// sibling `memory/` directories under the same workspace root, named by
/// the skills' own personality nicknames (spec.md §4.7 component table).
pub struct BriefingSources {
    pub task_mirror_path: PathBuf,
    pub deadlines_dashboard_path: PathBuf,
    pub news_memory_dir: PathBuf,
    pub research_memory_dir: PathBuf,
}

/// Chief skill: composes morning/evening digests, surfaces urgent
/// deadlines, and routes delegated requests by keyword (spec.md §4.7
/// "Briefing skill").
pub struct BriefingSkill {
    workspace: RwLock<Option<Workspace>>,
    sources: BriefingSources,
}

impl BriefingSkill {
    pub fn new(sources: BriefingSources) -> Self {
        Self {
            workspace: RwLock::new(None),
            sources,
        }
    }

    fn workspace(&self) -> Result<Workspace> {
        self.workspace
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| PicoclawError::Workspace("briefing skill workspace not set".to_string()))
    }

    fn read_or_placeholder(path: &std::path::Path, placeholder: &str) -> String {
        std::fs::read_to_string(path).unwrap_or_else(|_| placeholder.to_string())
    }

    fn rfc_section(dir: &std::path::Path, filename_prefix: &str, cap: usize) -> String {
        let today = Utc::now().format("%Y%m%d").to_string();
        let path = dir.join(format!("{filename_prefix}-{today}.md"));
        let records = picoclaw_rfc::parse_file(&path, cap).unwrap_or_default();
        if records.is_empty() {
            return "_nothing new_\n".to_string();
        }
        let mut out = String::new();
        for line in records.iter().take(cap) {
            if let Some(rec) = picoclaw_rfc::parse_record(line) {
                out.push_str(&format!("- {} — {}\n", rec.title, rec.url));
            }
        }
        out
    }

    /// Compose `memory/morning-brief-YYYY-MM-DD.md` from the task mirror,
    /// deadline dashboard, and the news/research RFC caches.
    fn morning_brief(&self) -> ToolResult {
        let workspace = match self.workspace() {
            Ok(w) => w,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let tasks_section = self.tasks_section();
        let deadlines_section = Self::read_or_placeholder(&self.sources.deadlines_dashboard_path, "_no deadline dashboard yet_\n");
        let news_section = Self::rfc_section(&self.sources.news_memory_dir, "news", NEWS_RECORD_CAP);
        let research_section = Self::rfc_section(&self.sources.research_memory_dir, "research", RESEARCH_RECORD_CAP);

        let md = format!(
            "# Morning Brief — {today}\n\n\
             ## Today's Tasks\n\n{tasks_section}\n\
             ## Urgent Deadlines\n\n{deadlines_section}\n\
             ## News\n\n{news_section}\n\
             ## Research\n\n{research_section}\n\
             ## Learning\n\n_none recorded_\n"
        );

        let path = workspace.memory_path(&format!("morning-brief-{today}.md"));
        if let Err(e) = std::fs::write(&path, &md) {
            return ToolResult::error(format!("morning_brief: {e}"));
        }
        ToolResult::success_for(md, format!("Morning brief written to {}.", path.display()))
    }

    fn tasks_section(&self) -> String {
        match std::fs::read_to_string(&self.sources.task_mirror_path) {
            Ok(text) => match crate::format::ics_xml::parse_mirror_str(&text) {
                Ok(entries) => {
                    let open: Vec<_> = entries
                        .iter()
                        .filter(|e| e.category == "Today" && e.kind == "task" && e.is_open())
                        .take(TASK_RECORD_CAP)
                        .collect();
                    if open.is_empty() {
                        "_nothing open for today_\n".to_string()
                    } else {
                        open.iter().map(|e| format!("- {}\n", e.summary)).collect()
                    }
                }
                Err(_) => "_task mirror unreadable_\n".to_string(),
            },
            Err(_) => "_no task mirror yet_\n".to_string(),
        }
    }

    /// Composed after the day's work: what finished, what was learned,
    /// what needs setup for tomorrow.
    fn evening_review(&self) -> ToolResult {
        let workspace = match self.workspace() {
            Ok(w) => w,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let completed_section = match std::fs::read_to_string(&self.sources.task_mirror_path) {
            Ok(text) => match crate::format::ics_xml::parse_mirror_str(&text) {
                Ok(entries) => {
                    let done: Vec<_> = entries.iter().filter(|e| e.kind == "task" && !e.is_open()).collect();
                    if done.is_empty() {
                        "_nothing completed today_\n".to_string()
                    } else {
                        done.iter().map(|e| format!("- {}\n", e.summary)).collect()
                    }
                }
                Err(_) => "_task mirror unreadable_\n".to_string(),
            },
            Err(_) => "_no task mirror yet_\n".to_string(),
        };

        let md = format!(
            "# Evening Review — {today}\n\n\
             ## Completed Today\n\n{completed_section}\n\
             ## Learning\n\n_none recorded_\n\n\
             ## Tomorrow Prep\n\n_carry over open Today items_\n"
        );

        let path = workspace.memory_path(&format!("evening-review-{today}.md"));
        if let Err(e) = std::fs::write(&path, &md) {
            return ToolResult::error(format!("evening_review: {e}"));
        }
        ToolResult::success_for(md, format!("Evening review written to {}.", path.display()))
    }

    /// Reads the deadline skill's structured sidecar directly (REDESIGN
    /// FLAGS: never re-derive this from the markdown dashboard).
    fn urgent_deadlines(&self) -> ToolResult {
        let sidecar_path = self.sources.deadlines_dashboard_path.with_extension("instants.json");
        let instants: DeadlineInstants = std::fs::read_to_string(&sidecar_path)
            .ok()
            .and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or_default();

        let now = Utc::now();
        if instants.has_instant_within(now, chrono::Duration::hours(2)) {
            ToolResult::success("Urgent: one or more deadlines fall within the next 2 hours.")
        } else {
            ToolResult::silent_ok()
        }
    }

    /// Keyword routing table: guidance text naming which skill should
    /// handle a request, since actual dispatch happens in the tool-call
    /// loop rather than this skill directly invoking others.
    fn delegate(&self, args: &Value) -> ToolResult {
        let Some(request) = args.get("request").and_then(|v| v.as_str()) else {
            return ToolResult::error("'request' is required for delegate");
        };
        let lower = request.to_lowercase();
        let target = [
            ("ielts", "habit"),
            ("exercise", "habit"),
            ("streak", "habit"),
            ("deck", "habit"),
            ("paper", "research"),
            ("arxiv", "research"),
            ("abstract", "research"),
            ("news", "news"),
            ("feed", "news"),
            ("deadline", "deadline"),
            ("due", "deadline"),
            ("calendar", "deadline"),
            ("task", "task"),
            ("todo", "task"),
        ]
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, skill)| *skill);

        match target {
            Some(skill) => ToolResult::success(format!("Route to '{skill}'.")),
            None => ToolResult::success("No clear match; handle directly or ask for clarification."),
        }
    }

    fn status(&self) -> ToolResult {
        let workspace = match self.workspace() {
            Ok(w) => w,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let has_morning = workspace.memory_path(&format!("morning-brief-{today}.md")).exists();
        let has_evening = workspace.memory_path(&format!("evening-review-{today}.md")).exists();
        ToolResult::success(format!(
            "Morning brief for {today}: {}. Evening review for {today}: {}.",
            if has_morning { "written" } else { "pending" },
            if has_evening { "written" } else { "pending" }
        ))
    }
}

#[async_trait]
impl Skill for BriefingSkill {
    fn name(&self) -> &str {
        "briefing"
    }

    fn description(&self) -> &str {
        "Chief skill: composes the morning and evening digests from the other skills' memory \
         files, surfaces urgent deadlines, and suggests routing for delegated requests. Commands: \
         morning_brief, evening_review, urgent_deadlines, delegate, status."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "enum": ["morning_brief", "evening_review", "urgent_deadlines", "delegate", "status"]},
                "request": {"type": "string", "description": "Required for delegate"}
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&self, workspace: Workspace) -> Result<()> {
        workspace.init("briefing", IDENTITY)?;
        *self.workspace.write().unwrap() = Some(workspace);
        Ok(())
    }

    async fn execute(&self, _ctx: &SkillContext, args: Value) -> ToolResult {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("missing required field 'command'");
        };
        match command {
            "morning_brief" => self.morning_brief(),
            "evening_review" => self.evening_review(),
            "urgent_deadlines" => self.urgent_deadlines(),
            "delegate" => self.delegate(&args),
            "status" => self.status(),
            other => ToolResult::error(format!("unknown command '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sources(root: &std::path::Path) -> BriefingSources {
        BriefingSources {
            task_mirror_path: root.join("atc/memory/tasks.xml"),
            deadlines_dashboard_path: root.join("architect/memory/deadlines-today.md"),
            news_memory_dir: root.join("monitor/memory"),
            research_memory_dir: root.join("scout/memory"),
        }
    }

    fn skill(root: &std::path::Path) -> BriefingSkill {
        BriefingSkill::new(sources(root))
    }

    #[test]
    fn morning_brief_handles_missing_sources_gracefully() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("chief"))).unwrap();
        let result = s.morning_brief();
        assert!(!result.is_error);
        assert!(result.for_llm.contains("Today's Tasks"));
        assert!(result.for_llm.contains("Urgent Deadlines"));
        assert!(result.for_llm.contains("no task mirror yet"));
    }

    #[test]
    fn urgent_deadlines_is_silent_without_sidecar() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("chief"))).unwrap();
        let result = s.urgent_deadlines();
        assert!(result.silent);
    }

    #[test]
    fn delegate_routes_ielts_to_habit() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("chief"))).unwrap();
        let result = s.delegate(&json!({"request": "Generate an IELTS practice set"}));
        assert!(result.for_llm.contains("habit"));
    }

    #[test]
    fn delegate_requires_request() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("chief"))).unwrap();
        let result = s.delegate(&json!({}));
        assert!(result.is_error);
    }
}
