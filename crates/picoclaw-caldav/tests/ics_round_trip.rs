use picoclaw_caldav::{CalDavItem, IcsDateTime};

#[test]
fn full_todo_with_recurrence_round_trips_through_ics() {
    let mut item = CalDavItem::new_todo("Take out recycling");
    item.due = Some(IcsDateTime::Date("20260301".into()));
    item.priority = Some(3);
    item.percent_complete = Some(0);
    item.rrule_interval_days = Some(7);
    item.location = Some("Curbside, bin #2".into());
    item.description = Some("Blue bin; cardboard, bin; glass".into());

    let ics = picoclaw_caldav::ics::emit_item(&item);
    let parsed = picoclaw_caldav::ics::parse_item(&ics).expect("parse");

    assert_eq!(parsed.uid, item.uid);
    assert_eq!(parsed.summary, "Take out recycling");
    assert_eq!(parsed.due, item.due);
    assert_eq!(parsed.priority, Some(3));
    assert_eq!(parsed.percent_complete, Some(0));
    assert_eq!(parsed.rrule_interval_days, Some(7));
    assert_eq!(parsed.location.as_deref(), Some("Curbside, bin #2"));
    assert_eq!(
        parsed.description.as_deref(),
        Some("Blue bin; cardboard, bin; glass")
    );
}

#[test]
fn event_without_optional_fields_round_trips() {
    let item = CalDavItem::new_event("Quarterly review");
    let ics = picoclaw_caldav::ics::emit_item(&item);
    let parsed = picoclaw_caldav::ics::parse_item(&ics).expect("parse");
    assert_eq!(parsed.kind, item.kind);
    assert_eq!(parsed.summary, "Quarterly review");
    assert!(parsed.due.is_none());
    assert!(parsed.rrule_interval_days.is_none());
}
