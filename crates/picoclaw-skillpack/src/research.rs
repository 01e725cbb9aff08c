use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use picoclaw_core::error::{PicoclawError, Result};
use picoclaw_skills::{Skill, SkillContext, ToolResult, Workspace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const IDENTITY: &str = "You are the research skill (scout): you query arXiv for papers, back-fill \
abstracts, and hand a digest to the briefing composer.\n";

const RFC_TTL_HOURS: i64 = 24;
const DEFAULT_MAX_RESULTS: usize = 10;
const DOWNLOAD_SIZE_CAP_BYTES: u64 = 50 * 1024 * 1024;
const FINDINGS_FILE: &str = "findings.jsonl";

/// One accumulated finding, appended to `memory/findings.jsonl` on every
/// `fetch` and surfaced verbatim by `memory` (spec.md §4.7 "Research
/// skill").
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Finding {
    title: String,
    url: String,
    abstract_text: String,
    source: String,
    fetched_at: chrono::DateTime<Utc>,
}

/// Scout skill: arXiv querying with abstract back-fill, an optional
/// Atom-feed "trending papers" source (same `feed-rs` mechanism the news
/// skill uses — see DESIGN.md), paper download with a size pre-check, and
/// an RFC cache for the briefing composer (spec.md §4.7 "Research skill").
pub struct ResearchSkill {
    workspace: RwLock<Option<Workspace>>,
    composer_memory_dir: PathBuf,
    arxiv_base_url: String,
    trending_feed_url: Option<String>,
    client: reqwest::Client,
}

impl ResearchSkill {
    pub fn new(composer_memory_dir: PathBuf, arxiv_base_url: impl Into<String>, trending_feed_url: Option<String>) -> Self {
        Self {
            workspace: RwLock::new(None),
            composer_memory_dir,
            arxiv_base_url: arxiv_base_url.into(),
            trending_feed_url,
            client: reqwest::Client::new(),
        }
    }

    fn workspace(&self) -> Result<Workspace> {
        self.workspace
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| PicoclawError::Workspace("research skill workspace not set".to_string()))
    }

    fn findings_path(&self) -> Result<PathBuf> {
        Ok(self.workspace()?.memory_path(FINDINGS_FILE))
    }

    fn load_findings(&self) -> Vec<Finding> {
        let Ok(path) = self.findings_path() else {
            return Vec::new();
        };
        let Ok(text) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        text.lines().filter_map(|l| serde_json::from_str(l).ok()).collect()
    }

    fn append_findings(&self, findings: &[Finding]) -> Result<()> {
        use std::io::Write as _;
        let path = self.findings_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        for finding in findings {
            writeln!(f, "{}", serde_json::to_string(finding)?)?;
        }
        Ok(())
    }

    async fn query_arxiv(&self, query: &str, max_results: usize) -> Result<Vec<Finding>> {
        let url = format!(
            "{}/api/query?search_query=all:{}&start=0&max_results={}",
            self.arxiv_base_url.trim_end_matches('/'),
            urlencoding::encode(query),
            max_results
        );
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PicoclawError::Remote { status: 0, message: format!("arXiv query: {e}") })?
            .bytes()
            .await
            .map_err(|e| PicoclawError::Remote { status: 0, message: format!("arXiv body: {e}") })?;
        let parsed = feed_rs::parser::parse(&bytes[..]).map_err(|e| PicoclawError::Parse(format!("arXiv atom: {e}")))?;

        Ok(parsed
            .entries
            .into_iter()
            .map(|entry| Finding {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                url: entry.links.first().map(|l| l.href.clone()).unwrap_or_default(),
                abstract_text: entry.summary.map(|s| s.content).unwrap_or_default(),
                source: "arxiv".to_string(),
                fetched_at: Utc::now(),
            })
            .collect())
    }

    /// Back-fill any finding whose abstract is empty by re-querying arXiv
    /// with its title (spec.md §4.7: "abstracts back-filled via arXiv if
    /// missing").
    async fn backfill_abstracts(&self, findings: &mut [Finding]) {
        for finding in findings.iter_mut() {
            if !finding.abstract_text.is_empty() || finding.title.is_empty() {
                continue;
            }
            if let Ok(hits) = self.query_arxiv(&finding.title, 1).await {
                if let Some(hit) = hits.into_iter().next() {
                    finding.abstract_text = hit.abstract_text;
                }
            }
        }
    }

    async fn fetch_trending(&self) -> Vec<Finding> {
        let Some(url) = &self.trending_feed_url else {
            return Vec::new();
        };
        let result: std::result::Result<Vec<Finding>, String> = async {
            let bytes = self.client.get(url).send().await.map_err(|e| e.to_string())?.bytes().await.map_err(|e| e.to_string())?;
            let parsed = feed_rs::parser::parse(&bytes[..]).map_err(|e| e.to_string())?;
            Ok(parsed
                .entries
                .into_iter()
                .map(|entry| Finding {
                    title: entry.title.map(|t| t.content).unwrap_or_default(),
                    url: entry.links.first().map(|l| l.href.clone()).unwrap_or_default(),
                    abstract_text: entry.summary.map(|s| s.content).unwrap_or_default(),
                    source: "trending".to_string(),
                    fetched_at: Utc::now(),
                })
                .collect())
        }
        .await;
        match result {
            Ok(findings) => findings,
            Err(e) => {
                tracing::warn!(error = %e, "trending feed fetch failed, skipping");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, args: &Value) -> ToolResult {
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return ToolResult::error("'query' is required for fetch");
        };
        let max_results = args.get("max_results").and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(DEFAULT_MAX_RESULTS);
        let include_trending = args.get("include_trending").and_then(|v| v.as_bool()).unwrap_or(false);

        let mut findings = match self.query_arxiv(query, max_results).await {
            Ok(f) => f,
            Err(e) => return ToolResult::error(format!("fetch: arXiv query failed: {e}")),
        };
        if include_trending {
            findings.extend(self.fetch_trending().await);
        }
        self.backfill_abstracts(&mut findings).await;

        if let Err(e) = self.append_findings(&findings) {
            return ToolResult::error(format!("fetch: persisting findings: {e}"));
        }

        let today = Utc::now().format("%Y%m%d").to_string();
        let lines: Vec<String> = findings
            .iter()
            .map(|f| picoclaw_rfc::encode_record("paper", &f.url, &f.title, &f.source, &today))
            .collect();
        let cache_path = self.composer_memory_dir.join(format!("research-{today}.md"));
        if let Err(e) = picoclaw_rfc::write_file(&cache_path, "scout", RFC_TTL_HOURS, &lines) {
            return ToolResult::error(format!("fetch: writing RFC cache: {e}"));
        }

        ToolResult::success(format!("Found {} paper(s), wrote {}.", findings.len(), cache_path.display()))
    }

    /// Derive a filesystem-safe filename from a title: strip anything but
    /// alphanumerics/dash/underscore/space, collapse whitespace to `_`, cap
    /// length, and force a `.pdf` extension.
    fn safe_filename(title: &str) -> String {
        let cleaned: String = title
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c.is_whitespace() { c } else { ' ' })
            .collect();
        let slug: String = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
        let slug = if slug.is_empty() { "paper".to_string() } else { slug };
        let slug: String = slug.chars().take(120).collect();
        format!("{slug}.pdf")
    }

    async fn download(&self, args: &Value) -> ToolResult {
        let Some(url) = args.get("url").and_then(|v| v.as_str()) else {
            return ToolResult::error("'url' is required for download");
        };
        let title = args.get("title").and_then(|v| v.as_str()).unwrap_or("paper");

        let workspace = match self.workspace() {
            Ok(w) => w,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let head = self.client.head(url).send().await;
        if let Ok(resp) = head {
            if let Some(len) = resp.content_length() {
                if len > DOWNLOAD_SIZE_CAP_BYTES {
                    return ToolResult::error(format!(
                        "download: {} exceeds the 50 MB pre-check ({} bytes)",
                        url, len
                    ));
                }
            }
        }

        let bytes = match self.client.get(url).send().await {
            Ok(resp) => match resp.bytes().await {
                Ok(b) => b,
                Err(e) => return ToolResult::error(format!("download: reading body: {e}")),
            },
            Err(e) => return ToolResult::error(format!("download: request failed: {e}")),
        };
        if bytes.len() as u64 > DOWNLOAD_SIZE_CAP_BYTES {
            return ToolResult::error(format!("download: body exceeded the 50 MB cap ({} bytes)", bytes.len()));
        }

        let filename = Self::safe_filename(title);
        let dest = workspace.memory_dir().join("papers").join(&filename);
        if let Some(parent) = dest.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::error(format!("download: creating papers dir: {e}"));
            }
        }
        if let Err(e) = std::fs::write(&dest, &bytes) {
            return ToolResult::error(format!("download: writing file: {e}"));
        }

        ToolResult::success(format!("Downloaded {} bytes to {}.", bytes.len(), dest.display()))
    }

    fn memory(&self) -> ToolResult {
        let findings = self.load_findings();
        if findings.is_empty() {
            return ToolResult::success("No accumulated findings yet.");
        }
        let mut out = format!("{} accumulated finding(s):\n", findings.len());
        for f in &findings {
            out.push_str(&format!("- [{}] {} — {}\n", f.source, f.title, f.url));
        }
        ToolResult::success(out)
    }
}

#[async_trait]
impl Skill for ResearchSkill {
    fn name(&self) -> &str {
        "research"
    }

    fn description(&self) -> &str {
        "Scout skill: queries arXiv (and optionally a trending-papers feed), back-fills abstracts, \
         downloads papers, and maintains accumulated findings. Commands: fetch, download, memory."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "enum": ["fetch", "download", "memory"]},
                "query": {"type": "string", "description": "Required for fetch"},
                "max_results": {"type": "integer"},
                "include_trending": {"type": "boolean"},
                "url": {"type": "string", "description": "Required for download"},
                "title": {"type": "string", "description": "Used to derive the saved filename for download"}
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&self, workspace: Workspace) -> Result<()> {
        workspace.init("research", IDENTITY)?;
        *self.workspace.write().unwrap() = Some(workspace);
        Ok(())
    }

    async fn execute(&self, _ctx: &SkillContext, args: Value) -> ToolResult {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("missing required field 'command'");
        };
        match command {
            "fetch" => self.fetch(&args).await,
            "download" => self.download(&args).await,
            "memory" => self.memory(),
            other => ToolResult::error(format!("unknown command '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn skill(dir: &std::path::Path) -> ResearchSkill {
        ResearchSkill::new(dir.to_path_buf(), "https://export.arxiv.org", None)
    }

    #[test]
    fn safe_filename_strips_unsafe_chars_and_collapses_whitespace() {
        let name = ResearchSkill::safe_filename("Attention / Is: All You Need?");
        assert_eq!(name, "Attention_Is_All_You_Need.pdf");
    }

    #[test]
    fn safe_filename_falls_back_to_paper_when_title_is_empty() {
        assert_eq!(ResearchSkill::safe_filename(""), "paper.pdf");
    }

    #[tokio::test]
    async fn memory_reports_empty_when_no_findings() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("scout"))).unwrap();
        let result = s.memory();
        assert!(result.for_llm.contains("No accumulated findings"));
    }

    #[tokio::test]
    async fn fetch_requires_query() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("scout"))).unwrap();
        let result = s.fetch(&json!({})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn download_requires_url() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("scout"))).unwrap();
        let result = s.download(&json!({})).await;
        assert!(result.is_error);
    }

    #[test]
    fn append_then_load_round_trips_findings() {
        let dir = tempdir().unwrap();
        let s = skill(dir.path());
        s.set_workspace(Workspace::new(dir.path().join("scout"))).unwrap();
        let findings = vec![Finding {
            title: "A paper".to_string(),
            url: "https://arxiv.org/abs/1".to_string(),
            abstract_text: "abstract".to_string(),
            source: "arxiv".to_string(),
            fetched_at: Utc::now(),
        }];
        s.append_findings(&findings).unwrap();
        let loaded = s.load_findings();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "A paper");
    }
}
