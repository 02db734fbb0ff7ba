use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::models::CalendarEvent;

const FOLD_LIMIT: usize = 75;

/// RFC 5545 subset writer: one VCALENDAR wrapping a VTIMEZONE block and one
/// VEVENT per exported event. All instants are emitted in UTC basic format.
#[derive(Clone)]
pub struct IcalExporter {
    prod_id: String,
}

impl Default for IcalExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IcalExporter {
    pub fn new() -> Self {
        Self {
            prod_id: "-//coachboard//calendar//EN".to_string(),
        }
    }

    pub fn export(&self, events: &[CalendarEvent]) -> String {
        let mut lines: Vec<String> = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            format!("PRODID:{}", self.prod_id),
            "CALSCALE:GREGORIAN".to_string(),
            "METHOD:PUBLISH".to_string(),
        ];

        push_vtimezone(&mut lines);
        for event in events {
            push_vevent(&mut lines, event);
        }

        lines.push("END:VCALENDAR".to_string());

        let mut out = String::new();
        for line in lines {
            out.push_str(&fold_line(&line));
            out.push_str("\r\n");
        }
        out
    }
}

fn push_vtimezone(lines: &mut Vec<String>) {
    lines.push("BEGIN:VTIMEZONE".to_string());
    lines.push("TZID:Etc/UTC".to_string());
    lines.push("BEGIN:STANDARD".to_string());
    lines.push("DTSTART:19700101T000000".to_string());
    lines.push("TZOFFSETFROM:+0000".to_string());
    lines.push("TZOFFSETTO:+0000".to_string());
    lines.push("TZNAME:UTC".to_string());
    lines.push("END:STANDARD".to_string());
    lines.push("END:VTIMEZONE".to_string());
}

fn push_vevent(lines: &mut Vec<String>, event: &CalendarEvent) {
    lines.push("BEGIN:VEVENT".to_string());
    lines.push(format!("UID:{}@coachboard", event.id));
    lines.push(format!("DTSTAMP:{}", format_utc(event.updated_at)));

    if event.all_day {
        let start = event.starts_at.date_naive();
        // DTEND is exclusive for VALUE=DATE events
        let mut end = event.ends_at.date_naive();
        if end <= start {
            end = start + Duration::days(1);
        }
        lines.push(format!("DTSTART;VALUE=DATE:{}", format_date(start)));
        lines.push(format!("DTEND;VALUE=DATE:{}", format_date(end)));
    } else {
        lines.push(format!("DTSTART:{}", format_utc(event.starts_at)));
        lines.push(format!("DTEND:{}", format_utc(event.ends_at)));
    }

    lines.push(format!("SUMMARY:{}", escape_text(&event.title)));
    if let Some(description) = &event.description {
        lines.push(format!("DESCRIPTION:{}", escape_text(description)));
    }
    if let Some(location) = &event.location {
        lines.push(format!("LOCATION:{}", escape_text(location)));
    }
    lines.push("STATUS:CONFIRMED".to_string());
    lines.push("END:VEVENT".to_string());
}

fn format_utc(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date(date: NaiveDate) -> String {
    format!("{:04}{:02}{:02}", date.year(), date.month(), date.day())
}

/// Escape TEXT values: backslash, semicolon, comma, and newlines.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Fold a content line at 75 octets, continuation lines prefixed with one
/// space. Splits on UTF-8 character boundaries.
fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_LIMIT {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + line.len() / FOLD_LIMIT * 3);
    let mut width = 0usize;
    for ch in line.chars() {
        let octets = ch.len_utf8();
        if width + octets > FOLD_LIMIT {
            out.push_str("\r\n ");
            width = 1; // continuation space counts against the limit
        }
        out.push(ch);
        width += octets;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sample_event(all_day: bool) -> CalendarEvent {
        CalendarEvent {
            id: Uuid::parse_str("8d8ac610-566d-4ef0-9c22-186b2a5ed793").unwrap(),
            coach_id: Uuid::new_v4(),
            title: "Track session; sprints, starts".to_string(),
            description: Some("Warm up\nMain set".to_string()),
            location: Some("City Stadium".to_string()),
            starts_at: Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2024, 3, 15, 11, 0, 0).unwrap(),
            all_day,
            google_event_id: None,
            google_synced_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn exports_calendar_wrapper_and_timezone() {
        let ics = IcalExporter::new().export(&[sample_event(false)]);

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("BEGIN:VTIMEZONE\r\n"));
        assert!(ics.contains("TZID:Etc/UTC\r\n"));
    }

    #[test]
    fn exports_timed_event_in_utc_basic_format() {
        let ics = IcalExporter::new().export(&[sample_event(false)]);

        assert!(ics.contains("UID:8d8ac610-566d-4ef0-9c22-186b2a5ed793@coachboard\r\n"));
        assert!(ics.contains("DTSTART:20240315T093000Z\r\n"));
        assert!(ics.contains("DTEND:20240315T110000Z\r\n"));
        assert!(ics.contains("DTSTAMP:20240302T080000Z\r\n"));
    }

    #[test]
    fn exports_all_day_event_as_date_values() {
        let ics = IcalExporter::new().export(&[sample_event(true)]);

        assert!(ics.contains("DTSTART;VALUE=DATE:20240315\r\n"));
        // same-day window rolls DTEND forward: VALUE=DATE end is exclusive
        assert!(ics.contains("DTEND;VALUE=DATE:20240316\r\n"));
    }

    #[test]
    fn escapes_text_values() {
        let ics = IcalExporter::new().export(&[sample_event(false)]);

        assert!(ics.contains("SUMMARY:Track session\\; sprints\\, starts\r\n"));
        assert!(ics.contains("DESCRIPTION:Warm up\\nMain set\r\n"));
    }

    #[test]
    fn escape_handles_backslash() {
        assert_eq!(escape_text(r"a\b"), r"a\\b");
    }

    #[test]
    fn folds_long_lines_at_75_octets() {
        let mut event = sample_event(false);
        event.description = Some("x".repeat(300));
        let ics = IcalExporter::new().export(&[event]);

        for line in ics.split("\r\n") {
            assert!(
                line.len() <= FOLD_LIMIT,
                "line exceeds fold limit: {} octets",
                line.len()
            );
        }
    }

    #[test]
    fn folded_lines_unfold_to_original() {
        let line = format!("DESCRIPTION:{}", "y".repeat(200));
        let folded = fold_line(&line);
        let unfolded = folded.replace("\r\n ", "");
        assert_eq!(unfolded, line);
    }
}
