use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::db::init_db;
use crate::error::Result;
use crate::fuzzy;
use crate::types::NewsItem;

const URL_WINDOW_DAYS: i64 = 7;
const BODY_HASH_WINDOW_DAYS: i64 = 7;
const STORE_TTL_DAYS: i64 = 7;

/// Category-scoped time window for the fuzzy-title check (spec.md §4.3).
/// The corpus exposes two overlapping taxonomies (an older
/// `breaking/ai_labs/china_ai/robotics/defence/research` set and a newer
/// `world/bangladesh/tech/ai` one); this engine canonicalizes on the newer
/// one and maps unknown categories to `default`.
fn category_window(category: &str) -> Duration {
    match category {
        "world" | "breaking" => Duration::hours(6),
        "bangladesh" => Duration::hours(24),
        "tech" => Duration::hours(48),
        "ai" => Duration::hours(48),
        "research" => Duration::days(7),
        _ => Duration::hours(24),
    }
}

/// Optional hook for an LLM-backed conflict check layered on top of the
/// fuzzy-title pass. Disabled by default (spec.md §4.3 SUPPLEMENT); the
/// dedup engine has no compile-time dependency on any LM provider.
#[async_trait]
pub trait ConflictChecker: Send + Sync {
    async fn likely_same_story(&self, a: &str, b: &str) -> Result<bool>;
}

struct SeenEntry {
    seen_at: DateTime<Utc>,
}

/// Three-layer duplicate detector with a SQLite-backed persistent store
/// (spec.md §4.3). Reads (category-window scans) and writes (`mark_seen`)
/// are split across a `RwLock` since the former vastly outnumber the
/// latter.
pub struct DedupEngine {
    db: std::sync::Mutex<Connection>,
    url_map: RwLock<HashMap<String, SeenEntry>>,
    body_hash_map: RwLock<HashMap<String, SeenEntry>>,
    title_map: RwLock<HashMap<String, (SeenEntry, String, String)>>,
    conflict_checker: Option<Box<dyn ConflictChecker>>,
}

impl DedupEngine {
    /// Open `conn`, purge expired rows, and repopulate the in-memory maps
    /// from the surviving rows.
    pub fn new(conn: Connection) -> Result<Self> {
        Self::with_conflict_checker(conn, None)
    }

    pub fn with_conflict_checker(
        conn: Connection,
        conflict_checker: Option<Box<dyn ConflictChecker>>,
    ) -> Result<Self> {
        init_db(&conn)?;

        let now = Utc::now().to_rfc3339();
        conn.execute("DELETE FROM dedup_cache WHERE expires_at < ?1", [&now])?;

        let mut url_map = HashMap::new();
        let mut body_hash_map = HashMap::new();
        let mut title_map: HashMap<String, (SeenEntry, String, String)> = HashMap::new();

        {
            let mut stmt = conn.prepare("SELECT hash, hash_type, seen_at FROM dedup_cache")?;
            let rows = stmt.query_map([], |row| {
                let hash: String = row.get(0)?;
                let hash_type: String = row.get(1)?;
                let seen_at: String = row.get(2)?;
                Ok((hash, hash_type, seen_at))
            })?;
            for row in rows {
                let (hash, hash_type, seen_at) = row?;
                let Ok(seen_at) = DateTime::parse_from_rfc3339(&seen_at) else {
                    continue;
                };
                let seen_at = seen_at.with_timezone(&Utc);
                match hash_type.as_str() {
                    "url" => {
                        url_map.insert(hash, SeenEntry { seen_at });
                    }
                    "body" => {
                        body_hash_map.insert(hash, SeenEntry { seen_at });
                    }
                    "title" => {
                        // Title rows carry the normalized title and its
                        // category in the hash key itself: `category\0title`.
                        if let Some((category, title)) = hash.split_once('\0') {
                            title_map.insert(
                                hash.clone(),
                                (SeenEntry { seen_at }, category.to_string(), title.to_string()),
                            );
                        }
                    }
                    _ => {}
                }
            }
        }

        debug!(
            urls = url_map.len(),
            bodies = body_hash_map.len(),
            titles = title_map.len(),
            "dedup engine restored from store"
        );

        Ok(Self {
            db: std::sync::Mutex::new(conn),
            url_map: RwLock::new(url_map),
            body_hash_map: RwLock::new(body_hash_map),
            title_map: RwLock::new(title_map),
            conflict_checker,
        })
    }

    /// The three admission checks of spec.md §4.3. Returns `true` iff the
    /// item is *not* a duplicate.
    pub fn admit(&self, item: &NewsItem) -> bool {
        let now = Utc::now();

        {
            let urls = self.url_map.read().unwrap();
            if let Some(entry) = urls.get(&item.canonical_url) {
                if now - entry.seen_at < Duration::days(URL_WINDOW_DAYS) {
                    return false;
                }
            }
        }

        {
            let bodies = self.body_hash_map.read().unwrap();
            if let Some(entry) = bodies.get(&item.body_hash) {
                if now - entry.seen_at < Duration::days(BODY_HASH_WINDOW_DAYS) {
                    return false;
                }
            }
        }

        let window = category_window(&item.category);
        {
            let titles = self.title_map.read().unwrap();
            for (entry, category, title) in titles.values() {
                if category != &item.category {
                    continue;
                }
                if now - entry.seen_at > window {
                    continue;
                }
                if fuzzy::score(title, &item.normalized_title) >= fuzzy::THRESHOLD {
                    return false;
                }
            }
        }

        true
    }

    /// Record `item` as seen across all three maps and upsert the
    /// corresponding store rows (spec.md §4.3 "Marking seen").
    pub fn mark_seen(&self, item: &NewsItem) -> Result<()> {
        let seen_at = item.seen_at();
        let expires_at = seen_at + Duration::days(STORE_TTL_DAYS);
        let title_key = format!("{}\0{}", item.category, item.normalized_title);

        {
            let db = self.db.lock().unwrap();
            for (hash, hash_type) in [
                (item.canonical_url.as_str(), "url"),
                (item.body_hash.as_str(), "body"),
                (title_key.as_str(), "title"),
            ] {
                db.execute(
                    "INSERT INTO dedup_cache (hash, hash_type, seen_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(hash, hash_type) DO UPDATE SET
                        seen_at = excluded.seen_at,
                        expires_at = excluded.expires_at",
                    rusqlite::params![hash, hash_type, seen_at.to_rfc3339(), expires_at.to_rfc3339()],
                )?;
            }
        }

        self.url_map
            .write()
            .unwrap()
            .insert(item.canonical_url.clone(), SeenEntry { seen_at });
        self.body_hash_map
            .write()
            .unwrap()
            .insert(item.body_hash.clone(), SeenEntry { seen_at });
        self.title_map.write().unwrap().insert(
            title_key,
            (SeenEntry { seen_at }, item.category.clone(), item.normalized_title.clone()),
        );

        Ok(())
    }

    /// Admit and, if not a duplicate, mark seen and optionally confirm via
    /// the injected conflict checker. Returns `true` if the item was
    /// admitted.
    pub async fn try_admit(&self, item: &NewsItem) -> Result<bool> {
        if !self.admit(item) {
            return Ok(false);
        }
        if let Some(checker) = &self.conflict_checker {
            // The conflict checker is an additional confirmation layer, not
            // a replacement for the fuzzy pass: it only ever vetoes an
            // admission the fuzzy pass already allowed.
            let near_duplicate_titles: Vec<String> = {
                let titles = self.title_map.read().unwrap();
                titles
                    .values()
                    .filter(|(_, category, _)| category == &item.category)
                    .map(|(_, _, title)| title.clone())
                    .collect()
            };
            for other in near_duplicate_titles {
                if checker.likely_same_story(&other, &item.normalized_title).await? {
                    return Ok(false);
                }
            }
        }
        self.mark_seen(item)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DedupEngine {
        DedupEngine::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn first_item_is_admitted() {
        let e = engine();
        let item = NewsItem::new("https://a.com/1", "Big story", "summary", "src", 1, "en", "world", None);
        assert!(e.admit(&item));
    }

    #[test]
    fn identical_canonical_url_rejected_within_window() {
        let e = engine();
        let a = NewsItem::new(
            "https://reuters.com/story/abc?utm_source=rss",
            "Big breaking story",
            "summary",
            "reuters",
            1,
            "en",
            "world",
            None,
        );
        e.mark_seen(&a).unwrap();

        let b = NewsItem::new(
            "https://reuters.com/story/abc?utm_source=twitter",
            "Big breaking story",
            "summary",
            "reuters",
            1,
            "en",
            "world",
            None,
        );
        assert!(!e.admit(&b));
    }

    #[test]
    fn identical_body_hash_rejected() {
        let e = engine();
        let a = NewsItem::new("https://a.com/1", "Title A", "same body text", "src", 1, "en", "world", None);
        e.mark_seen(&a).unwrap();
        let b = NewsItem::new("https://a.com/2", "Totally different title", "same body text", "src", 1, "en", "world", None);
        assert!(!e.admit(&b));
    }

    #[test]
    fn near_duplicate_title_within_window_rejected() {
        let e = engine();
        let a = NewsItem::new("https://a.com/1", "Budget plan announced by PM", "s1", "src", 1, "en", "tech", None);
        e.mark_seen(&a).unwrap();
        let b = NewsItem::new("https://a.com/2", "PM announces budget plan", "s2", "src", 1, "en", "tech", None);
        assert!(!e.admit(&b));
    }

    #[test]
    fn different_category_does_not_cross_contaminate_title_window() {
        let e = engine();
        let a = NewsItem::new("https://a.com/1", "Budget plan announced", "s1", "src", 1, "en", "tech", None);
        e.mark_seen(&a).unwrap();
        let b = NewsItem::new("https://a.com/2", "Budget plan announced", "s2", "src", 1, "en", "research", None);
        assert!(e.admit(&b));
    }

    #[test]
    fn restart_repopulates_maps_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.sqlite");

        {
            let conn = Connection::open(&path).unwrap();
            let e = DedupEngine::new(conn).unwrap();
            let a = NewsItem::new(
                "https://reuters.com/story/abc?utm_source=rss",
                "Big breaking story",
                "s1",
                "reuters",
                1,
                "en",
                "world",
                None,
            );
            e.mark_seen(&a).unwrap();
        }

        {
            let conn = Connection::open(&path).unwrap();
            let e = DedupEngine::new(conn).unwrap();
            let b = NewsItem::new(
                "https://reuters.com/story/abc?utm_source=twitter",
                "Big breaking story",
                "s2",
                "reuters",
                1,
                "en",
                "world",
                None,
            );
            assert!(!e.admit(&b));
        }
    }

    #[test]
    fn expired_rows_are_purged_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.sqlite");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS dedup_cache (
                    hash TEXT NOT NULL, hash_type TEXT NOT NULL,
                    seen_at TEXT NOT NULL, expires_at TEXT NOT NULL,
                    PRIMARY KEY (hash, hash_type)
                ) STRICT;",
            )
            .unwrap();
            conn.execute(
                "INSERT INTO dedup_cache VALUES ('https://a.com/1', 'url', ?1, ?2)",
                rusqlite::params![
                    (Utc::now() - Duration::days(10)).to_rfc3339(),
                    (Utc::now() - Duration::days(3)).to_rfc3339()
                ],
            )
            .unwrap();
        }

        let conn = Connection::open(&path).unwrap();
        let e = DedupEngine::new(conn).unwrap();
        let item = NewsItem::new("https://a.com/1", "t", "s", "src", 1, "en", "world", None);
        assert!(e.admit(&item));
    }
}
