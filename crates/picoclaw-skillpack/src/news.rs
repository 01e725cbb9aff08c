use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use picoclaw_core::config::FeedConfig;
use picoclaw_core::error::{PicoclawError, Result};
use picoclaw_dedup::{DedupEngine, NewsItem};
use picoclaw_skills::{Skill, SkillContext, ToolResult, Workspace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinSet;

const IDENTITY: &str = "You are the news skill (monitor): you fan out across RSS/Atom feeds, dedup \
admitted items, and hand a digest to the briefing composer.\n";

const FETCH_CONCURRENCY: usize = 5;
const DEFAULT_LIMIT: usize = 10;
const RFC_TTL_HOURS: i64 = 6;
const ROTATION_STATE_FILE: &str = "rotation_state.json";

/// Persisted quota-filler state: the last admitted items shown, and a
/// rotating fetch index (spec.md §9 Open Questions — the source mixes
/// duplicate-guard with quota-filler via an internal counter whose
/// wrap/restart behavior is unstated; this implementation's policy is
/// recorded in DESIGN.md: the index persists across restarts and advances
/// by one per `fetch` call, wrapping modulo the shown-item count).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RotationState {
    fetch_index: u64,
    last_shown: Vec<ShownItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShownItem {
    title: String,
    url: String,
    category: String,
}

/// Monitor skill: concurrent feed fan-out, dedup admission, RFC cache
/// publication (spec.md §4.7 "News skill").
pub struct NewsSkill {
    workspace: RwLock<Option<Workspace>>,
    feeds: Vec<FeedConfig>,
    composer_memory_dir: PathBuf,
    dedup: DedupEngine,
    client: reqwest::Client,
}

impl NewsSkill {
    pub fn new(feeds: Vec<FeedConfig>, composer_memory_dir: PathBuf, dedup: DedupEngine) -> Self {
        Self {
            workspace: RwLock::new(None),
            feeds,
            composer_memory_dir,
            dedup,
            client: reqwest::Client::new(),
        }
    }

    fn workspace(&self) -> Result<Workspace> {
        self.workspace
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| PicoclawError::Workspace("news skill workspace not set".to_string()))
    }

    fn rotation_path(&self) -> Result<PathBuf> {
        Ok(self.workspace()?.memory_path(ROTATION_STATE_FILE))
    }

    fn load_rotation(&self) -> RotationState {
        let Ok(path) = self.rotation_path() else {
            return RotationState::default();
        };
        std::fs::read_to_string(path).ok().and_then(|t| serde_json::from_str(&t).ok()).unwrap_or_default()
    }

    fn save_rotation(&self, state: &RotationState) -> Result<()> {
        let path = self.rotation_path()?;
        let text = serde_json::to_string(state)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    async fn fetch_one(client: reqwest::Client, feed: FeedConfig) -> (FeedConfig, std::result::Result<Vec<NewsItem>, String>) {
        let result = async {
            let bytes = client
                .get(&feed.url)
                .send()
                .await
                .map_err(|e| e.to_string())?
                .bytes()
                .await
                .map_err(|e| e.to_string())?;
            let parsed = feed_rs::parser::parse(&bytes[..]).map_err(|e| e.to_string())?;
            let mut items = Vec::new();
            for entry in parsed.entries {
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
                if title.is_empty() || link.is_empty() {
                    continue;
                }
                let summary = entry
                    .summary
                    .map(|s| s.content)
                    .or_else(|| entry.content.and_then(|c| c.body))
                    .unwrap_or_default();
                items.push(NewsItem::new(
                    link,
                    title,
                    summary,
                    feed.name.clone(),
                    feed.tier,
                    feed.lang.clone(),
                    feed.category.clone(),
                    entry.published,
                ));
            }
            Ok(items)
        }
        .await;
        (feed, result)
    }

    /// Fan out across active feeds with a concurrency cap (spec.md §5); one
    /// feed's parse failure is logged and skipped, never fatal to the others
    /// (the "panic containment" policy applied to ordinary errors too).
    async fn fetch(&self, args: &Value) -> ToolResult {
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(DEFAULT_LIMIT);

        let active: Vec<FeedConfig> = self.feeds.iter().filter(|f| f.active).cloned().collect();
        if active.is_empty() {
            return ToolResult::success("No active feeds configured.");
        }

        let mut per_source: std::collections::HashMap<String, Vec<NewsItem>> = std::collections::HashMap::new();
        let mut pending = active.into_iter();
        let mut in_flight = JoinSet::new();

        for feed in pending.by_ref().take(FETCH_CONCURRENCY) {
            let client = self.client.clone();
            in_flight.spawn(Self::fetch_one(client, feed));
        }

        while let Some(joined) = in_flight.join_next().await {
            let (feed, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "feed fetch task panicked");
                    continue;
                }
            };
            match result {
                Ok(items) => {
                    per_source.entry(feed.name.clone()).or_default().extend(items);
                }
                Err(e) => tracing::warn!(feed = %feed.name, error = %e, "feed fetch failed, skipping"),
            }
            if let Some(next) = pending.next() {
                let client = self.client.clone();
                in_flight.spawn(Self::fetch_one(client, next));
            }
        }

        // Round-robin across sources so no single feed dominates.
        let mut admitted: Vec<NewsItem> = Vec::new();
        let mut cursors: Vec<(String, usize)> = per_source.keys().map(|k| (k.clone(), 0)).collect();
        cursors.sort();
        'outer: loop {
            let mut advanced = false;
            for (source, cursor) in cursors.iter_mut() {
                let Some(items) = per_source.get(source) else { continue };
                let Some(item) = items.get(*cursor) else { continue };
                *cursor += 1;
                advanced = true;
                match self.dedup.try_admit(item).await {
                    Ok(true) => admitted.push(item.clone()),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "dedup admission failed"),
                }
                if admitted.len() >= limit {
                    break 'outer;
                }
            }
            if !advanced {
                break;
            }
        }

        let mut rotation = self.load_rotation();
        let shortfall = limit.saturating_sub(admitted.len());
        let mut filled_from_rotation = 0;
        if shortfall > 0 && !rotation.last_shown.is_empty() {
            let n = rotation.last_shown.len();
            for i in 0..shortfall.min(n) {
                let idx = (rotation.fetch_index as usize + i) % n;
                let shown = &rotation.last_shown[idx];
                admitted.push(NewsItem::new(
                    shown.url.clone(),
                    shown.title.clone(),
                    String::new(),
                    "rotation".to_string(),
                    3,
                    "en".to_string(),
                    shown.category.clone(),
                    None,
                ));
                filled_from_rotation += 1;
            }
        }
        rotation.fetch_index = rotation.fetch_index.wrapping_add(1);
        if !admitted.is_empty() {
            rotation.last_shown = admitted
                .iter()
                .map(|i| ShownItem { title: i.raw_title.clone(), url: i.canonical_url.clone(), category: i.category.clone() })
                .collect();
        }
        if let Err(e) = self.save_rotation(&rotation) {
            tracing::warn!(error = %e, "failed to persist news rotation state");
        }

        let today = Utc::now().format("%Y%m%d").to_string();
        let lines: Vec<String> = admitted
            .iter()
            .map(|i| picoclaw_rfc::encode_record("news", &i.raw_url, &i.raw_title, &i.category, &today))
            .collect();
        let cache_path = self.composer_memory_dir.join(format!("news-{today}.md"));
        if let Err(e) = picoclaw_rfc::write_file(&cache_path, "monitor", RFC_TTL_HOURS, &lines) {
            return ToolResult::error(format!("fetch: writing RFC cache: {e}"));
        }

        ToolResult::success(format!(
            "Fetched {} new item(s) ({} from rotation fill), wrote {}.",
            admitted.len(),
            filled_from_rotation,
            cache_path.display()
        ))
    }

    fn status(&self) -> ToolResult {
        let rotation = self.load_rotation();
        ToolResult::success(format!(
            "{} configured feed(s), {} active; fetch index {}, {} item(s) in rotation buffer.",
            self.feeds.len(),
            self.feeds.iter().filter(|f| f.active).count(),
            rotation.fetch_index,
            rotation.last_shown.len()
        ))
    }

    fn feeds(&self) -> ToolResult {
        if self.feeds.is_empty() {
            return ToolResult::success("No feeds configured.");
        }
        let mut out = String::from("Configured feeds:\n");
        for f in &self.feeds {
            out.push_str(&format!("- {} [{}] {} ({})\n", f.name, f.category, f.url, if f.active { "active" } else { "inactive" }));
        }
        ToolResult::success(out)
    }
}

#[async_trait]
impl Skill for NewsSkill {
    fn name(&self) -> &str {
        "news"
    }

    fn description(&self) -> &str {
        "Monitor skill: fetches configured RSS/Atom feeds, dedups across restarts, writes a daily \
         RFC cache for the briefing composer. Commands: fetch, status, feeds."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "enum": ["fetch", "status", "feeds"]},
                "limit": {"type": "integer", "description": "Max items to admit per fetch, default 10"}
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&self, workspace: Workspace) -> Result<()> {
        workspace.init("news", IDENTITY)?;
        *self.workspace.write().unwrap() = Some(workspace);
        Ok(())
    }

    async fn execute(&self, _ctx: &SkillContext, args: Value) -> ToolResult {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("missing required field 'command'");
        };
        match command {
            "fetch" => self.fetch(&args).await,
            "status" => self.status(),
            "feeds" => self.feeds(),
            other => ToolResult::error(format!("unknown command '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::tempdir;

    fn skill(dir: &std::path::Path) -> NewsSkill {
        let dedup = DedupEngine::new(Connection::open_in_memory().unwrap()).unwrap();
        NewsSkill::new(Vec::new(), dir.to_path_buf(), dedup)
    }

    #[tokio::test]
    async fn fetch_with_no_active_feeds_is_a_no_op() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("news"))).unwrap();
        let result = s.fetch(&json!({})).await;
        assert!(!result.is_error);
        assert!(result.for_llm.contains("No active feeds"));
    }

    #[test]
    fn status_reports_zero_feeds_when_unconfigured() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("news"))).unwrap();
        let result = s.status();
        assert!(result.for_llm.contains("0 configured"));
    }

    #[test]
    fn feeds_command_lists_nothing_when_empty() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("news"))).unwrap();
        let result = s.feeds();
        assert_eq!(result.for_llm, "No feeds configured.");
    }
}
