use chrono::Utc;

use crate::url::id12;

const MAX_TITLE_CHARS: usize = 80;
const MAX_TAG_CHARS: usize = 20;

/// Strip characters that would break the single-line record format: the
/// bracket/pipe delimiters and any embedded newline.
fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '|' | '\r' | '\n'))
        .collect()
}

/// Truncate to `max_chars`, appending `…` when truncated. Operates on chars,
/// not bytes, so multi-byte UTF-8 is never split.
fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", truncated)
}

/// Normalize a date string to `YYYYMMDD`: strip dashes/slashes; if empty,
/// use today's UTC date.
fn normalize_date(date: &str) -> String {
    let stripped: String = date.chars().filter(|c| *c != '-' && *c != '/').collect();
    if stripped.is_empty() {
        Utc::now().format("%Y%m%d").to_string()
    } else {
        stripped
    }
}

/// Encode a single RFC cache record line: `[TYPE:ID12:TAG] TITLE | DATE | URL`.
pub fn encode_record(rec_type: &str, url: &str, title: &str, tag: &str, date: &str) -> String {
    let id = id12(url);
    let title = truncate_with_ellipsis(&sanitize(title), MAX_TITLE_CHARS);
    let tag = truncate_with_ellipsis(&sanitize(tag), MAX_TAG_CHARS);
    let date = normalize_date(date);
    format!("[{}:{}:{}] {} | {} | {}", rec_type, id, tag, title, date, url)
}

/// A parsed RFC cache record line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfcRecord {
    pub rec_type: String,
    pub id12: String,
    pub tag: String,
    pub title: String,
    pub date: String,
    pub url: String,
    /// The original line, preserved verbatim for write-back.
    pub raw: String,
}

/// Parse the leading `[TYPE:ID12:TAG]` bracket tuple and the ` | `-delimited
/// body of a single record line. Returns `None` if the line does not start
/// with `[` or is otherwise malformed.
pub fn parse_record(line: &str) -> Option<RfcRecord> {
    let line = line.trim_end();
    if !line.starts_with('[') {
        return None;
    }
    let close = line.find(']')?;
    let bracket = &line[1..close];
    let mut parts = bracket.splitn(3, ':');
    let rec_type = parts.next()?.to_string();
    let id12 = parts.next()?.to_string();
    let tag = parts.next().unwrap_or("").to_string();

    let rest = line[close + 1..].trim_start();
    let mut fields = rest.splitn(3, " | ");
    let title = fields.next().unwrap_or("").to_string();
    let date = fields.next().unwrap_or("").to_string();
    let url = fields.next().unwrap_or("").to_string();

    Some(RfcRecord {
        rec_type,
        id12,
        tag,
        title,
        date,
        url,
        raw: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_round_trips_id12() {
        let line = encode_record("news", "https://example.com/a", "Hello World", "world", "");
        let rec = parse_record(&line).unwrap();
        assert_eq!(rec.id12, id12("https://example.com/a"));
        assert_eq!(rec.rec_type, "news");
        assert_eq!(rec.tag, "world");
    }

    #[test]
    fn title_is_truncated_with_ellipsis() {
        let long_title = "x".repeat(120);
        let line = encode_record("news", "https://e.com/a", &long_title, "t", "20260101");
        let rec = parse_record(&line).unwrap();
        assert_eq!(rec.title.chars().count(), MAX_TITLE_CHARS);
        assert!(rec.title.ends_with('…'));
    }

    #[test]
    fn title_and_tag_strip_pipes_and_newlines() {
        let line = encode_record("news", "https://e.com/a", "A | weird\ntitle", "t|ag", "20260101");
        let rec = parse_record(&line).unwrap();
        assert!(!rec.title.contains('|'));
        assert!(!rec.title.contains('\n'));
        assert!(!rec.tag.contains('|'));
    }

    #[test]
    fn empty_date_defaults_to_today() {
        let line = encode_record("news", "https://e.com/a", "t", "tag", "");
        let rec = parse_record(&line).unwrap();
        assert_eq!(rec.date.len(), 8);
        assert!(rec.date.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn date_strips_dashes_and_slashes() {
        let line = encode_record("news", "https://e.com/a", "t", "tag", "2026-02-23");
        let rec = parse_record(&line).unwrap();
        assert_eq!(rec.date, "20260223");
    }

    #[test]
    fn non_bracket_line_does_not_parse() {
        assert!(parse_record("AGENT: chief").is_none());
        assert!(parse_record("").is_none());
    }
}
