use std::io::Write as _;
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use serde::{Deserialize, Serialize};

use picoclaw_core::error::{PicoclawError, Result};

/// One row of the task skill's local ICS-as-XML mirror (`memory/tasks.xml`).
///
/// REDESIGN FLAGS: "ad-hoc XML unmarshaling inside skills" — this is the
/// one shared parser the task, deadline, and news/calendar paths read and
/// write, instead of each skill rolling its own tag-scraping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub uid: String,
    /// `"task"` or `"event"` — spec.md §3 "CalDAV item" kind.
    pub kind: String,
    pub summary: String,
    /// Free-form grouping the task skill filters on (`"Today"`,
    /// `"Tomorrow"`, …) — not part of the CalDAV item itself.
    pub category: String,
    pub status: String,
    pub priority: Option<u8>,
    /// ISO-8601 date or date-time, or empty if absent.
    pub due: String,
    pub description: String,
}

impl MirrorEntry {
    pub fn is_open(&self) -> bool {
        !matches!(self.status.to_uppercase().as_str(), "COMPLETED" | "CANCELLED")
    }
}

/// Parse the `<tasks><task>...</task>...</tasks>` mirror file. A missing
/// file parses as empty (same convention as the RFC cache codec).
pub fn parse_mirror(path: &Path) -> Result<Vec<MirrorEntry>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PicoclawError::Io(e)),
    };
    parse_mirror_str(&text)
}

pub fn parse_mirror_str(text: &str) -> Result<Vec<MirrorEntry>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<MirrorEntry> = None;
    let mut field: Option<String> = None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "task" || name == "event" {
                    let mut entry = MirrorEntry {
                        uid: String::new(),
                        kind: if name == "event" { "event".to_string() } else { "task".to_string() },
                        summary: String::new(),
                        category: String::new(),
                        status: "NEEDS-ACTION".to_string(),
                        priority: None,
                        due: String::new(),
                        description: String::new(),
                    };
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"uid" {
                            entry.uid = String::from_utf8_lossy(&attr.value).to_string();
                        }
                    }
                    current = Some(entry);
                } else {
                    field = Some(name);
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field.as_deref()) {
                    let value = t.unescape().map_err(|e| PicoclawError::Parse(e.to_string()))?.into_owned();
                    match f {
                        "uid" => entry.uid = value,
                        "summary" => entry.summary = value,
                        "category" => entry.category = value,
                        "status" => entry.status = value,
                        "priority" => entry.priority = value.parse().ok(),
                        "due" => entry.due = value,
                        "description" => entry.description = value,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "task" || name == "event" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                } else {
                    field = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PicoclawError::Parse(e.to_string())),
            _ => {}
        }
    }

    Ok(entries)
}

/// Write the mirror atomically (write-temp-then-rename, the same convention
/// `picoclaw-rfc` uses for cache files).
pub fn write_mirror(path: &Path, entries: &[MirrorEntry]) -> Result<()> {
    let mut buf = Vec::new();
    {
        let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);
        writer
            .write_event(Event::Start(BytesStart::new("tasks")))
            .map_err(|e| PicoclawError::Parse(e.to_string()))?;
        for entry in entries {
            let tag = entry.kind.as_str();
            let mut start = BytesStart::new(tag);
            start.push_attribute(("uid", entry.uid.as_str()));
            writer.write_event(Event::Start(start)).map_err(|e| PicoclawError::Parse(e.to_string()))?;

            write_field(&mut writer, "summary", &entry.summary)?;
            write_field(&mut writer, "category", &entry.category)?;
            write_field(&mut writer, "status", &entry.status)?;
            if let Some(p) = entry.priority {
                write_field(&mut writer, "priority", &p.to_string())?;
            }
            write_field(&mut writer, "due", &entry.due)?;
            write_field(&mut writer, "description", &entry.description)?;

            writer.write_event(Event::End(BytesEnd::new(tag))).map_err(|e| PicoclawError::Parse(e.to_string()))?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("tasks")))
            .map_err(|e| PicoclawError::Parse(e.to_string()))?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("xml.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(&buf)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn write_field(writer: &mut Writer<&mut Vec<u8>>, name: &str, value: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name))).map_err(|e| PicoclawError::Parse(e.to_string()))?;
    if !value.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(|e| PicoclawError::Parse(e.to_string()))?;
    }
    writer.write_event(Event::End(BytesEnd::new(name))).map_err(|e| PicoclawError::Parse(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> MirrorEntry {
        MirrorEntry {
            uid: "abc-123".to_string(),
            kind: "task".to_string(),
            summary: "Pay rent".to_string(),
            category: "Today".to_string(),
            status: "NEEDS-ACTION".to_string(),
            priority: Some(1),
            due: "2026-02-23".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn write_then_parse_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.xml");
        write_mirror(&path, &[sample()]).unwrap();
        let parsed = parse_mirror(&path).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0], sample());
    }

    #[test]
    fn missing_file_parses_as_empty() {
        let dir = tempdir().unwrap();
        let parsed = parse_mirror(&dir.path().join("missing.xml")).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn is_open_excludes_terminal_statuses() {
        let mut e = sample();
        assert!(e.is_open());
        e.status = "COMPLETED".to_string();
        assert!(!e.is_open());
        e.status = "CANCELLED".to_string();
        assert!(!e.is_open());
    }

    #[test]
    fn parses_mixed_task_and_event_entries() {
        let xml = r#"<tasks>
  <task uid="t1"><summary>Write report</summary><category>Today</category><status>NEEDS-ACTION</status><priority>0</priority><due>2026-02-23</due><description></description></task>
  <event uid="e1"><summary>Standup</summary><category>Today</category><status></status><due>2026-02-23T09:00:00Z</due><description></description></event>
</tasks>"#;
        let entries = parse_mirror_str(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, "task");
        assert_eq!(entries[1].kind, "event");
        assert_eq!(entries[0].priority, Some(0));
    }
}
