use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// spec.md §3 "News item". `canonical_url`/`normalized_title`/`body_hash`
/// are derived once at construction so admission checks never recompute
/// them.
#[derive(Debug, Clone)]
pub struct NewsItem {
    pub raw_url: String,
    pub canonical_url: String,
    pub raw_title: String,
    pub normalized_title: String,
    pub summary: String,
    pub body_hash: String,
    pub published_at: Option<DateTime<Utc>>,
    pub ingest_ts: DateTime<Utc>,
    pub source_name: String,
    pub source_tier: u8,
    pub lang: String,
    pub category: String,
}

impl NewsItem {
    pub fn new(
        raw_url: impl Into<String>,
        raw_title: impl Into<String>,
        summary: impl Into<String>,
        source_name: impl Into<String>,
        source_tier: u8,
        lang: impl Into<String>,
        category: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        let raw_url = raw_url.into();
        let raw_title = raw_title.into();
        let summary = summary.into();

        let canonical_url = picoclaw_rfc::canonical_url(&raw_url);
        let normalized_title = normalize_title(&raw_title);
        let body_hash = hex::encode(Sha256::digest(clean_summary(&summary).as_bytes()));

        Self {
            raw_url,
            canonical_url,
            raw_title,
            normalized_title,
            summary,
            body_hash,
            published_at,
            ingest_ts: Utc::now(),
            source_name: source_name.into(),
            source_tier,
            lang: lang.into(),
            category: category.into(),
        }
    }

    /// `publishedAt`, or now if absent (spec.md §4.3 "Marking seen").
    pub fn seen_at(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.ingest_ts)
    }
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_summary(summary: &str) -> String {
    summary.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_title_whitespace_and_case() {
        assert_eq!(normalize_title("  Big,  BREAKING Story!!  "), "big breaking story");
    }

    #[test]
    fn body_hash_is_stable_over_whitespace_variance() {
        let a = NewsItem::new("https://a.com/1", "t", "hello   world", "src", 1, "en", "world", None);
        let b = NewsItem::new("https://a.com/1", "t", "hello world", "src", 1, "en", "world", None);
        assert_eq!(a.body_hash, b.body_hash);
    }
}
