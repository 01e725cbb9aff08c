use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::record::parse_record;
use picoclaw_core::error::{PicoclawError, Result};

/// Parsed header of an RFC cache file.
#[derive(Debug, Clone)]
struct Header {
    agent: String,
    ts: DateTime<Utc>,
    ttl_hours: i64,
}

fn parse_ttl_hours(s: &str) -> Option<i64> {
    s.trim().strip_suffix('h')?.parse().ok()
}

fn parse_header(text: &str) -> Option<Header> {
    let mut agent = None;
    let mut ts = None;
    let mut ttl_hours = None;
    for line in text.lines() {
        if let Some(v) = line.strip_prefix("AGENT:") {
            agent = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("TS:") {
            ts = DateTime::parse_from_rfc3339(v.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        } else if let Some(v) = line.strip_prefix("TTL:") {
            ttl_hours = parse_ttl_hours(v.trim());
        } else if line.trim().is_empty() {
            break;
        }
    }
    Some(Header {
        agent: agent.unwrap_or_default(),
        ts: ts?,
        ttl_hours: ttl_hours?,
    })
}

/// Read and parse the record lines of an RFC cache file.
///
/// If the header's `TS`/`TTL` parse and `now - TS > TTL`, the file is
/// deleted (passive GC) and an empty vec is returned. A missing file is not
/// an error — it is simply treated as empty (spec.md §4.1).
pub fn parse_file(path: &Path, max_records: usize) -> Result<Vec<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PicoclawError::Io(e)),
    };

    if let Some(header) = parse_header(&text) {
        let age = Utc::now().signed_duration_since(header.ts);
        if age.num_hours() > header.ttl_hours {
            debug!(path = %path.display(), "RFC cache expired, deleting");
            let _ = std::fs::remove_file(path);
            return Ok(Vec::new());
        }
    }

    let records: Vec<String> = text
        .lines()
        .filter(|l| l.starts_with('['))
        .take(max_records)
        .map(|l| l.to_string())
        .collect();

    Ok(records)
}

/// Merge `new_lines` into the existing file at `path` (newest wins, first
/// insertion order preserved, keyed by ID12), then write the result
/// atomically (write to `path.tmp`, then rename).
pub fn write_file(path: &Path, agent: &str, ttl_hours: i64, new_lines: &[String]) -> Result<()> {
    let existing_text = std::fs::read_to_string(path).unwrap_or_default();
    let existing_records: Vec<String> = existing_text
        .lines()
        .filter(|l| l.starts_with('['))
        .map(|l| l.to_string())
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, String> = HashMap::new();

    for line in existing_records.iter().chain(new_lines.iter()) {
        let Some(rec) = parse_record(line) else {
            continue;
        };
        if !by_id.contains_key(&rec.id12) {
            order.push(rec.id12.clone());
        }
        by_id.insert(rec.id12, line.clone());
    }

    let records: Vec<&String> = order.iter().filter_map(|id| by_id.get(id)).collect();

    let mut out = String::new();
    out.push_str(&format!("AGENT: {}\n", agent));
    out.push_str(&format!("TS: {}\n", Utc::now().to_rfc3339()));
    out.push_str(&format!("TTL: {}h\n", ttl_hours));
    out.push_str(&format!("COUNT: {}\n", records.len()));
    out.push('\n');
    for rec in &records {
        out.push_str(rec);
        out.push('\n');
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(out.as_bytes())?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_record;
    use tempfile::tempdir;

    #[test]
    fn write_then_parse_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("news-20260223.md");
        let lines = vec![
            encode_record("news", "https://a.com/1", "Story One", "world", "20260223"),
            encode_record("news", "https://a.com/2", "Story Two", "world", "20260223"),
        ];
        write_file(&path, "monitor", 6, &lines).unwrap();

        let parsed = parse_file(&path, 100).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn write_file_is_idempotent_under_same_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("news-20260223.md");
        let lines = vec![encode_record(
            "news",
            "https://a.com/1",
            "Story One",
            "world",
            "20260223",
        )];
        write_file(&path, "monitor", 6, &lines).unwrap();
        write_file(&path, "monitor", 6, &lines).unwrap();
        let parsed = parse_file(&path, 100).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn write_file_upserts_by_id12_newest_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("news-20260223.md");
        let first = vec![encode_record(
            "news",
            "https://a.com/1",
            "Old Title",
            "world",
            "20260223",
        )];
        write_file(&path, "monitor", 6, &first).unwrap();

        let second = vec![encode_record(
            "news",
            "https://a.com/1",
            "New Title",
            "world",
            "20260223",
        )];
        write_file(&path, "monitor", 6, &second).unwrap();

        let parsed = parse_file(&path, 100).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].contains("New Title"));
    }

    #[test]
    fn missing_file_parses_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.md");
        let parsed = parse_file(&path, 100).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn expired_file_is_deleted_and_parses_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("news-old.md");
        let mut out = String::new();
        out.push_str("AGENT: monitor\n");
        out.push_str(&format!(
            "TS: {}\n",
            (Utc::now() - chrono::Duration::hours(48)).to_rfc3339()
        ));
        out.push_str("TTL: 6h\n");
        out.push_str("COUNT: 1\n\n");
        out.push_str(&encode_record("news", "https://a.com/1", "t", "tag", "20260101"));
        out.push('\n');
        std::fs::write(&path, out).unwrap();

        let parsed = parse_file(&path, 100).unwrap();
        assert!(parsed.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn records_capped_at_max_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("news-20260223.md");
        let lines: Vec<String> = (0..10)
            .map(|i| encode_record("news", &format!("https://a.com/{i}"), "t", "tag", "20260223"))
            .collect();
        write_file(&path, "monitor", 6, &lines).unwrap();
        let parsed = parse_file(&path, 3).unwrap();
        assert_eq!(parsed.len(), 3);
    }
}
