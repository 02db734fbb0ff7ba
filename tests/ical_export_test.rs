use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use coachboard::models::CalendarEvent;
use coachboard::services::IcalExporter;

fn event(title: &str, day: u32, all_day: bool) -> CalendarEvent {
    CalendarEvent {
        id: Uuid::new_v4(),
        coach_id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        location: None,
        starts_at: Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap(),
        ends_at: Utc.with_ymd_and_hms(2024, 4, day, 11, 30, 0).unwrap(),
        all_day,
        google_event_id: None,
        google_synced_at: None,
        created_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
    }
}

#[test]
fn exports_one_vevent_per_event() {
    let events = vec![
        event("Morning run", 2, false),
        event("Recovery day", 3, true),
        event("Intervals", 4, false),
    ];

    let ics = IcalExporter::new().export(&events);

    assert_eq!(ics.matches("BEGIN:VEVENT\r\n").count(), 3);
    assert_eq!(ics.matches("END:VEVENT\r\n").count(), 3);
    assert_eq!(ics.matches("BEGIN:VTIMEZONE\r\n").count(), 1);
}

#[test]
fn empty_export_is_still_a_valid_calendar() {
    let ics = IcalExporter::new().export(&[]);

    assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics.contains("VERSION:2.0\r\n"));
    assert!(ics.contains("PRODID:"));
    assert!(ics.contains("END:VTIMEZONE\r\n"));
    assert!(ics.ends_with("END:VCALENDAR\r\n"));
    assert!(!ics.contains("BEGIN:VEVENT"));
}

#[test]
fn every_line_ends_with_crlf_and_stays_within_fold_limit() {
    let mut long = event("Team meeting", 5, false);
    long.description = Some("agenda item ".repeat(40));
    long.location = Some("Conference room with a fairly long descriptive name".to_string());

    let ics = IcalExporter::new().export(&[long]);

    // no bare newlines outside CRLF pairs
    assert!(!ics.replace("\r\n", "").contains('\n'));
    for line in ics.split("\r\n") {
        assert!(line.len() <= 75, "folded line too long: {line:?}");
    }
}

#[test]
fn timed_events_round_times_to_utc_basic_format() {
    let ics = IcalExporter::new().export(&[event("Tempo", 9, false)]);

    assert!(ics.contains("DTSTART:20240409T100000Z\r\n"));
    assert!(ics.contains("DTEND:20240409T113000Z\r\n"));
}

#[test]
fn uid_is_derived_from_event_id() {
    let e = event("Hills", 11, false);
    let expected = format!("UID:{}@coachboard\r\n", e.id);

    let ics = IcalExporter::new().export(&[e]);

    assert!(ics.contains(&expected));
}
