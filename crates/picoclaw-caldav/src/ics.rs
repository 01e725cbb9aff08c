use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{CalDavError, Result};
use crate::types::{CalDavItem, IcsDateTime, ItemKind, TaskStatus};

/// Undo RFC 5545 line folding: any line starting with a space or tab is a
/// continuation of the previous line.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split("\r\n").flat_map(|l| l.split('\n')) {
        if (raw.starts_with(' ') || raw.starts_with('\t')) && !lines.is_empty() {
            let last = lines.last_mut().unwrap();
            last.push_str(&raw[1..]);
        } else if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

fn unescape(s: &str) -> String {
    s.replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(';', "\\;")
        .replace('\n', "\\n")
}

struct Field {
    name: String,
    params: HashMap<String, String>,
    value: String,
}

/// Split an unfolded line into `KEY;PARAM=VAL;...:VALUE`.
fn parse_line(line: &str) -> Option<Field> {
    let colon = line.find(':')?;
    let (head, value) = line.split_at(colon);
    let value = &value[1..];
    let mut parts = head.split(';');
    let name = parts.next()?.to_uppercase();
    let mut params = HashMap::new();
    for p in parts {
        if let Some((k, v)) = p.split_once('=') {
            params.insert(k.to_uppercase(), v.to_string());
        }
    }
    Some(Field {
        name,
        params,
        value: value.to_string(),
    })
}

fn parse_ics_datetime(field: &Field) -> Option<IcsDateTime> {
    if field.params.get("VALUE").map(|v| v.as_str()) == Some("DATE") {
        return Some(IcsDateTime::Date(field.value.clone()));
    }
    if field.value.len() == 8 && !field.value.contains('T') {
        return Some(IcsDateTime::Date(field.value.clone()));
    }
    let fmt = if field.value.ends_with('Z') {
        "%Y%m%dT%H%M%SZ"
    } else {
        "%Y%m%dT%H%M%S"
    };
    let naive = chrono::NaiveDateTime::parse_from_str(&field.value, fmt).ok()?;
    Some(IcsDateTime::DateTime(DateTime::from_naive_utc_and_offset(
        naive,
        Utc,
    )))
}

fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    let naive = chrono::NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ").ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Parse the `RRULE` value, extracting a daily interval if present. Only
/// `FREQ=DAILY` recurrence is understood by this core (spec.md §4.2).
fn parse_rrule_interval_days(value: &str) -> Option<u32> {
    let mut freq_daily = false;
    let mut interval = 1u32;
    for part in value.split(';') {
        if let Some((k, v)) = part.split_once('=') {
            match k.to_uppercase().as_str() {
                "FREQ" if v.eq_ignore_ascii_case("DAILY") => freq_daily = true,
                "INTERVAL" => interval = v.parse().unwrap_or(1),
                _ => {}
            }
        }
    }
    freq_daily.then_some(interval)
}

/// Parse a full ICS document (VCALENDAR wrapping one VTODO or VEVENT) into a
/// [`CalDavItem`].
pub fn parse_item(text: &str) -> Result<CalDavItem> {
    let lines = unfold(text);
    let mut kind = None;
    let mut uid = None;
    let mut summary = String::new();
    let mut status = None;
    let mut due = None;
    let mut dtstart = None;
    let mut priority = None;
    let mut percent_complete = None;
    let mut rrule_interval_days = None;
    let mut location = None;
    let mut description = None;
    let mut url = None;
    let mut completed = None;
    let mut last_modified = None;

    for line in &lines {
        let Some(field) = parse_line(line) else {
            continue;
        };
        match field.name.as_str() {
            "BEGIN" if field.value == "VTODO" => kind = Some(ItemKind::Todo),
            "BEGIN" if field.value == "VEVENT" => kind = Some(ItemKind::Event),
            "UID" => uid = Some(field.value.clone()),
            "SUMMARY" => summary = unescape(&field.value),
            "STATUS" => status = TaskStatus::parse(&field.value),
            "DUE" => due = parse_ics_datetime(&field),
            "DTSTART" => dtstart = parse_ics_datetime(&field),
            "PRIORITY" => priority = field.value.parse().ok(),
            "PERCENT-COMPLETE" => percent_complete = field.value.parse().ok(),
            "RRULE" => rrule_interval_days = parse_rrule_interval_days(&field.value),
            "LOCATION" => location = Some(unescape(&field.value)),
            "DESCRIPTION" => description = Some(unescape(&field.value)),
            "URL" => url = Some(field.value.clone()),
            "COMPLETED" => completed = parse_utc(&field.value),
            "LAST-MODIFIED" => last_modified = parse_utc(&field.value),
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| CalDavError::Parse("missing VTODO/VEVENT component".into()))?;
    let uid = uid.ok_or_else(|| CalDavError::Parse("missing UID".into()))?;

    Ok(CalDavItem {
        kind,
        uid,
        summary,
        status,
        due,
        dtstart,
        priority,
        percent_complete,
        rrule_interval_days,
        location,
        description,
        url,
        completed,
        last_modified,
    })
}

/// Synthesize an ICS envelope (VCALENDAR/VTODO|VEVENT) for upload.
pub fn emit_item(item: &CalDavItem) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    out.push_str("PRODID:-//picoclaw//picoclaw-caldav//EN\r\n");
    out.push_str(&format!("BEGIN:{}\r\n", item.kind.component_name()));
    out.push_str(&format!("UID:{}\r\n", item.uid));
    out.push_str(&format!("SUMMARY:{}\r\n", escape(&item.summary)));

    if let Some(status) = item.status {
        out.push_str(&format!("STATUS:{}\r\n", status.as_ics()));
    }
    if let Some(due) = &item.due {
        write_dt_field(&mut out, "DUE", due);
    }
    if let Some(dtstart) = &item.dtstart {
        write_dt_field(&mut out, "DTSTART", dtstart);
    }
    if let Some(priority) = item.priority {
        out.push_str(&format!("PRIORITY:{}\r\n", priority));
    }
    if let Some(pct) = item.percent_complete {
        out.push_str(&format!("PERCENT-COMPLETE:{}\r\n", pct));
    }
    if let Some(n) = item.rrule_interval_days {
        out.push_str(&format!("RRULE:FREQ=DAILY;INTERVAL={}\r\n", n));
    }
    if let Some(location) = &item.location {
        out.push_str(&format!("LOCATION:{}\r\n", escape(location)));
    }
    if let Some(description) = &item.description {
        out.push_str(&format!("DESCRIPTION:{}\r\n", escape(description)));
    }
    if let Some(url) = &item.url {
        out.push_str(&format!("URL:{}\r\n", url));
    }
    if let Some(completed) = item.completed {
        out.push_str(&format!(
            "COMPLETED:{}\r\n",
            completed.format("%Y%m%dT%H%M%SZ")
        ));
    }
    out.push_str(&format!(
        "LAST-MODIFIED:{}\r\n",
        item.last_modified
            .unwrap_or_else(Utc::now)
            .format("%Y%m%dT%H%M%SZ")
    ));
    out.push_str(&format!("DTSTAMP:{}\r\n", Utc::now().format("%Y%m%dT%H%M%SZ")));

    out.push_str(&format!("END:{}\r\n", item.kind.component_name()));
    out.push_str("END:VCALENDAR\r\n");
    out
}

fn write_dt_field(out: &mut String, name: &str, dt: &IcsDateTime) {
    if dt.is_date_only() {
        out.push_str(&format!("{};VALUE=DATE:{}\r\n", name, dt.to_ics_value()));
    } else {
        out.push_str(&format!("{}:{}\r\n", name, dt.to_ics_value()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_todo_with_due_date() {
        let mut item = CalDavItem::new_todo("Pay rent");
        item.due = Some(IcsDateTime::Date("20260301".into()));
        item.priority = Some(1);

        let ics = emit_item(&item);
        let parsed = parse_item(&ics).unwrap();

        assert_eq!(parsed.uid, item.uid);
        assert_eq!(parsed.summary, "Pay rent");
        assert_eq!(parsed.due, Some(IcsDateTime::Date("20260301".into())));
        assert_eq!(parsed.priority, Some(1));
        assert_eq!(parsed.status, Some(TaskStatus::NeedsAction));
    }

    #[test]
    fn unfolds_continuation_lines() {
        let text = "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:abc\r\nSUMMARY:Hello\r\n wo\r\n rld\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let parsed = parse_item(text).unwrap();
        assert_eq!(parsed.summary, "Hello world");
    }

    #[test]
    fn unescapes_commas_semicolons_and_newlines() {
        let text = "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:abc\r\nSUMMARY:a\\, b\\; c\\nd\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let parsed = parse_item(text).unwrap();
        assert_eq!(parsed.summary, "a, b; c\nd");
    }

    #[test]
    fn recurring_task_round_trips_rrule() {
        let mut item = CalDavItem::new_todo("Water plants");
        item.rrule_interval_days = Some(3);
        let ics = emit_item(&item);
        let parsed = parse_item(&ics).unwrap();
        assert_eq!(parsed.rrule_interval_days, Some(3));
    }

    #[test]
    fn missing_component_is_parse_error() {
        let text = "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n";
        assert!(parse_item(text).is_err());
    }

    #[test]
    fn event_round_trips_dtstart_datetime() {
        let mut item = CalDavItem::new_event("Standup");
        item.dtstart = Some(IcsDateTime::DateTime(
            DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));
        let ics = emit_item(&item);
        let parsed = parse_item(&ics).unwrap();
        assert_eq!(parsed.dtstart, item.dtstart);
        assert_eq!(parsed.kind, ItemKind::Event);
    }
}
