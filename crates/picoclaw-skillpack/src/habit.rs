use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use picoclaw_caldav::{CalDavClient, TaskStatus};
use picoclaw_core::config::TelegramToolConfig;
use picoclaw_core::error::{PicoclawError, Result};
use picoclaw_skills::{Skill, SkillContext, ToolResult, Workspace};
use regex::Regex;
use rusqlite::Connection;
use serde_json::{json, Value};

const IDENTITY: &str = "You are the habit skill (coach): you track daily streaks from completed \
tasks, surface practice material, and nudge the user when momentum slips.\n";

const MOMENTUM_DB: &str = "momentum.db";
const TRACKED_HABITS: &[&str] = &["IELTS", "Exercise"];
const PRACTICE_FOLDER: &str = "IELTS_Materials/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreakState {
    Extend,
    Restart,
    Idle,
}

impl StreakState {
    fn as_str(self) -> &'static str {
        match self {
            StreakState::Extend => "extend",
            StreakState::Restart => "restart",
            StreakState::Idle => "idle",
        }
    }
}

/// Coach skill: habit streak tracking against completed CalDAV items,
/// WebDAV practice-material selection, Nextcloud Deck card moves, and a
/// Telegram nudge (spec.md §4.7 "Habit skill").
pub struct HabitSkill {
    workspace: RwLock<Option<Workspace>>,
    tasks_client: CalDavClient,
    files_base_url: String,
    deck_base_url: String,
    nextcloud_username: String,
    nextcloud_password: String,
    telegram: Option<TelegramToolConfig>,
    client: reqwest::Client,
    db: Mutex<Option<Connection>>,
}

impl HabitSkill {
    pub fn new(
        tasks_client: CalDavClient,
        files_base_url: impl Into<String>,
        deck_base_url: impl Into<String>,
        nextcloud_username: impl Into<String>,
        nextcloud_password: impl Into<String>,
        telegram: Option<TelegramToolConfig>,
    ) -> Self {
        Self {
            workspace: RwLock::new(None),
            tasks_client,
            files_base_url: files_base_url.into(),
            deck_base_url: deck_base_url.into(),
            nextcloud_username: nextcloud_username.into(),
            nextcloud_password: nextcloud_password.into(),
            telegram,
            client: reqwest::Client::new(),
            db: Mutex::new(None),
        }
    }

    fn workspace(&self) -> Result<Workspace> {
        self.workspace
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| PicoclawError::Workspace("habit skill workspace not set".to_string()))
    }

    /// Lazily open (and schema-init) `memory/momentum.db`, mirroring the
    /// dedup engine's single-`Mutex<Connection>` convention.
    fn with_db<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut guard = self.db.lock().unwrap();
        if guard.is_none() {
            let path = self.workspace()?.memory_path(MOMENTUM_DB);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(path).map_err(|e| PicoclawError::Workspace(format!("opening momentum.db: {e}")))?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS streaks (
                    habit TEXT PRIMARY KEY,
                    streak INTEGER NOT NULL DEFAULT 0,
                    last_completed TEXT,
                    state TEXT NOT NULL DEFAULT 'idle'
                ) STRICT;",
            )
            .map_err(|e| PicoclawError::Workspace(format!("initializing momentum.db: {e}")))?;
            *guard = Some(conn);
        }
        let conn = guard.as_ref().unwrap();
        f(conn).map_err(|e| PicoclawError::Workspace(format!("momentum.db: {e}")))
    }

    fn load_streak(&self, habit: &str) -> Result<(i64, Option<NaiveDate>)> {
        self.with_db(|conn| {
            conn.query_row(
                "SELECT streak, last_completed FROM streaks WHERE habit = ?1",
                [habit],
                |row| {
                    let streak: i64 = row.get(0)?;
                    let last: Option<String> = row.get(1)?;
                    Ok((streak, last.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())))
                },
            )
            .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok((0, None)) } else { Err(e) })
        })
    }

    fn save_streak(&self, habit: &str, streak: i64, today: NaiveDate, state: StreakState) -> Result<()> {
        self.with_db(|conn| {
            conn.execute(
                "INSERT INTO streaks (habit, streak, last_completed, state) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(habit) DO UPDATE SET streak = excluded.streak, last_completed = excluded.last_completed, state = excluded.state",
                rusqlite::params![habit, streak, today.format("%Y-%m-%d").to_string(), state.as_str()],
            )?;
            Ok(())
        })
    }

    /// Fetch today's COMPLETED VTODOs and report which tracked habits they
    /// matched by summary substring (case-insensitive).
    async fn check_habits(&self) -> ToolResult {
        let hrefs = match self.tasks_client.list().await {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("check_habits: {e}")),
        };

        let today = Utc::now().date_naive();
        let mut completed_summaries: Vec<String> = Vec::new();
        for href in hrefs {
            let Ok(item) = self.tasks_client.get(&href).await else { continue };
            if item.status != Some(TaskStatus::Completed) {
                continue;
            }
            let completed_today = item
                .completed
                .map(|c| c.date_naive() == today)
                .unwrap_or(true);
            if completed_today {
                completed_summaries.push(item.summary);
            }
        }

        let mut report = String::new();
        for habit in TRACKED_HABITS {
            let matched = completed_summaries.iter().any(|s| s.to_lowercase().contains(&habit.to_lowercase()));
            let (streak, last) = match self.load_streak(habit) {
                Ok(v) => v,
                Err(e) => return ToolResult::error(format!("check_habits: {e}")),
            };

            if !matched {
                report.push_str(&format!("- {habit}: idle (streak {streak})\n"));
                continue;
            }

            let (new_streak, state) = match last {
                Some(d) if d == today - Duration::days(1) => (streak + 1, StreakState::Extend),
                Some(d) if d == today => (streak, StreakState::Extend),
                _ => (1, StreakState::Restart),
            };
            if let Err(e) = self.save_streak(habit, new_streak, today, state) {
                return ToolResult::error(format!("check_habits: {e}"));
            }
            report.push_str(&format!("- {habit}: {} (streak {new_streak})\n", state.as_str()));
        }

        ToolResult::success(format!("Habit check for {}:\n{}", today.format("%Y-%m-%d"), report))
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.nextcloud_username, Some(&self.nextcloud_password))
    }

    /// PROPFIND `IELTS_Materials/` and pick one entry deterministically by
    /// a caller-supplied seed (so callers/tests don't depend on
    /// wall-clock-seeded randomness inside the skill).
    async fn generate_practice(&self, args: &Value) -> ToolResult {
        let url = format!("{}{}", self.files_base_url.trim_end_matches('/'), format!("/{PRACTICE_FOLDER}"));
        let resp = self
            .auth(self.client.request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), &url))
            .header("Depth", "1")
            .send()
            .await;
        let body = match resp {
            Ok(r) if r.status().is_success() || r.status().as_u16() == 207 => match r.text().await {
                Ok(t) => t,
                Err(e) => return ToolResult::error(format!("generate_practice: reading response: {e}")),
            },
            Ok(r) => return ToolResult::error(format!("generate_practice: remote returned {}", r.status())),
            Err(e) => return ToolResult::error(format!("generate_practice: {e}")),
        };

        let files = extract_file_hrefs(&body);
        if files.is_empty() {
            return ToolResult::success("No practice materials found in IELTS_Materials/.");
        }

        let seed = args.get("seed").and_then(|v| v.as_u64()).unwrap_or_else(|| Utc::now().timestamp() as u64);
        let pick = &files[(seed as usize) % files.len()];
        ToolResult::success(format!("Practice material: {pick}"))
    }

    /// PUT the card with its new `stackId` (Nextcloud Deck API moves a
    /// card between stacks by updating that field in place).
    async fn update_deck(&self, args: &Value) -> ToolResult {
        let (Some(board_id), Some(card_id), Some(stack_id)) = (
            args.get("board_id").and_then(|v| v.as_u64()),
            args.get("card_id").and_then(|v| v.as_u64()),
            args.get("target_stack_id").and_then(|v| v.as_u64()),
        ) else {
            return ToolResult::error("'board_id', 'card_id', and 'target_stack_id' are required for update_deck");
        };

        let url = format!(
            "{}boards/{}/stacks/{}/cards/{}",
            self.deck_base_url.trim_end_matches('/'),
            board_id,
            stack_id,
            card_id
        );
        let resp = self
            .auth(self.client.put(&url))
            .header("OCS-APIRequest", "true")
            .json(&json!({"stackId": stack_id}))
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => ToolResult::success(format!("Moved card {card_id} to stack {stack_id}.")),
            Ok(r) => ToolResult::error(format!("update_deck: remote returned {}", r.status())),
            Err(e) => ToolResult::error(format!("update_deck: {e}")),
        }
    }

    async fn nudge_telegram(&self, args: &Value) -> ToolResult {
        let Some(telegram) = &self.telegram else {
            return ToolResult::error("tools.telegram is not configured");
        };
        let Some(text) = args.get("text").and_then(|v| v.as_str()) else {
            return ToolResult::error("'text' is required for nudge_telegram");
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", telegram.bot_token);
        let resp = self
            .client
            .post(&url)
            .json(&json!({"chat_id": telegram.chat_id, "text": text}))
            .timeout(std::time::Duration::from_secs(telegram.timeout_seconds))
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => ToolResult::success("Nudge sent."),
            Ok(r) => ToolResult::error(format!("nudge_telegram: remote returned {}", r.status())),
            Err(e) => ToolResult::error(format!("nudge_telegram: {e}")),
        }
    }
}

fn extract_file_hrefs(body: &str) -> Vec<String> {
    let re = Regex::new(r"(?i)<[a-z0-9]*:?href[^>]*>([^<]+)</[a-z0-9]*:?href>").unwrap();
    re.captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|href| !href.ends_with('/'))
        .filter_map(|href| href.rsplit('/').next().map(|s| s.to_string()))
        .map(|name| urlencoding::decode(&name).map(|s| s.to_string()).unwrap_or(name))
        .collect()
}

#[async_trait]
impl Skill for HabitSkill {
    fn name(&self) -> &str {
        "habit"
    }

    fn description(&self) -> &str {
        "Coach skill: tracks daily streaks from completed tasks, surfaces IELTS practice material, \
         moves Nextcloud Deck cards, and nudges via Telegram. Commands: check_habits, \
         generate_practice, update_deck, nudge_telegram."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "enum": ["check_habits", "generate_practice", "update_deck", "nudge_telegram"]},
                "seed": {"type": "integer", "description": "Optional deterministic seed for generate_practice"},
                "board_id": {"type": "integer"},
                "card_id": {"type": "integer"},
                "target_stack_id": {"type": "integer"},
                "text": {"type": "string", "description": "Required for nudge_telegram"}
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&self, workspace: Workspace) -> Result<()> {
        workspace.init("habit", IDENTITY)?;
        *self.workspace.write().unwrap() = Some(workspace);
        Ok(())
    }

    async fn execute(&self, _ctx: &SkillContext, args: Value) -> ToolResult {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("missing required field 'command'");
        };
        match command {
            "check_habits" => self.check_habits().await,
            "generate_practice" => self.generate_practice(&args).await,
            "update_deck" => self.update_deck(&args).await,
            "nudge_telegram" => self.nudge_telegram(&args).await,
            other => ToolResult::error(format!("unknown command '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn skill() -> HabitSkill {
        HabitSkill::new(
            CalDavClient::new("https://cloud.example.com/tasks/", "u", "p"),
            "https://cloud.example.com/remote.php/webdav/",
            "https://cloud.example.com/index.php/apps/deck/api/v1.0/",
            "u",
            "p",
            None,
        )
    }

    #[test]
    fn extract_file_hrefs_skips_directory_entries() {
        let body = r#"<multistatus>
            <response><href>/webdav/IELTS_Materials/</href></response>
            <response><href>/webdav/IELTS_Materials/listening-1.mp3</href></response>
        </multistatus>"#;
        let files = extract_file_hrefs(body);
        assert_eq!(files, vec!["listening-1.mp3"]);
    }

    #[test]
    fn save_then_load_streak_round_trips() {
        let dir = tempdir().unwrap();
        let skill = skill();
        skill.set_workspace(Workspace::new(dir.path().join("coach"))).unwrap();

        let today = Utc::now().date_naive();
        skill.save_streak("IELTS", 3, today, StreakState::Extend).unwrap();
        let (streak, last) = skill.load_streak("IELTS").unwrap();
        assert_eq!(streak, 3);
        assert_eq!(last, Some(today));
    }

    #[test]
    fn unknown_habit_loads_as_zero_streak() {
        let dir = tempdir().unwrap();
        let skill = skill();
        skill.set_workspace(Workspace::new(dir.path().join("coach"))).unwrap();
        let (streak, last) = skill.load_streak("Exercise").unwrap();
        assert_eq!(streak, 0);
        assert!(last.is_none());
    }

    #[tokio::test]
    async fn nudge_telegram_without_config_errors() {
        let dir = tempdir().unwrap();
        let skill = skill();
        skill.set_workspace(Workspace::new(dir.path().join("coach"))).unwrap();
        let result = skill.nudge_telegram(&json!({"text": "hi"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn update_deck_requires_all_ids() {
        let dir = tempdir().unwrap();
        let skill = skill();
        skill.set_workspace(Workspace::new(dir.path().join("coach"))).unwrap();
        let result = skill.update_deck(&json!({"board_id": 1})).await;
        assert!(result.is_error);
    }
}
