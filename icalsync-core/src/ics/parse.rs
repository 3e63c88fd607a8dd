//! Feed text to event assembly.
//!
//! Unfolds the feed, normalizes each content line and walks VEVENT blocks
//! into [`CalendarEvent`] records. A malformed line or event is skipped with
//! a warning; it never aborts the feed.

use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::event::{is_whole_day, CalendarEvent};
use crate::ics::line::{normalize_line, ContentLine};
use crate::recurrence::map_recurrence;
use crate::rrule::ParsedRRule;
use crate::timezone::{validate, TimezoneMap};

const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const DATE_FORMAT: &str = "%Y%m%d";

/// Undo RFC 5545 line folding: a line starting with a space or tab continues
/// the previous one.
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            // A continuation with no line before it continues nothing; drop
            // it rather than let the leading space corrupt a property name.
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
            }
            continue;
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

/// Parse feed text into normalized events.
///
/// `report_offset` is forwarded to the recurrence mapper for UNTIL
/// truncation.
pub fn parse_calendar(
    text: &str,
    zones: &TimezoneMap,
    report_offset: FixedOffset,
) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut current: Option<EventBuilder> = None;
    // Nested components (VALARM etc.) carry their own properties; skip them.
    let mut nested_depth = 0usize;

    for raw in unfold(text) {
        let line = match normalize_line(&raw, zones) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "skipping malformed content line");
                continue;
            }
        };

        match (line.name.as_str(), line.value.to_uppercase().as_str()) {
            ("begin", "VEVENT") => {
                current = Some(EventBuilder::default());
                continue;
            }
            ("end", "VEVENT") => {
                if let Some(builder) = current.take() {
                    match builder.build(report_offset) {
                        Some(event) => events.push(event),
                        None => warn!("skipping unusable VEVENT"),
                    }
                }
                nested_depth = 0;
                continue;
            }
            ("begin", _) if current.is_some() => {
                nested_depth += 1;
                continue;
            }
            ("end", _) if current.is_some() => {
                nested_depth = nested_depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }

        if nested_depth > 0 {
            continue;
        }
        if let Some(builder) = current.as_mut() {
            builder.apply(line);
        }
    }

    events
}

/// A parsed DTSTART/DTEND value.
#[derive(Debug, Clone, Copy)]
struct EventInstant {
    utc: DateTime<Utc>,
    is_date: bool,
}

#[derive(Debug, Default)]
struct EventBuilder {
    uid: String,
    summary: String,
    description: String,
    location: String,
    start: Option<EventInstant>,
    end: Option<EventInstant>,
    sequence: i64,
    last_modified: String,
    tzid: String,
    rrule: String,
    vendor_all_day: bool,
}

impl EventBuilder {
    fn apply(&mut self, line: ContentLine) {
        match line.name.as_str() {
            "uid" => self.uid = line.value,
            "summary" => self.summary = line.value,
            "description" => self.description = line.value,
            "location" => self.location = line.value,
            "sequence" => {
                self.sequence = line.value.trim().parse().ok().filter(|&s| s >= 0).unwrap_or(0);
            }
            "last-modified" => self.last_modified = line.value,
            "rrule" => self.rrule = line.value,
            "x-microsoft-cdo-alldayevent" => {
                let value = line.value.trim().to_uppercase();
                self.vendor_all_day = value == "TRUE" || value == "1";
            }
            "dtstart" => {
                if let Some((instant, tzid)) = parse_instant(&line) {
                    self.start = Some(instant);
                    self.tzid = tzid;
                }
            }
            "dtend" => {
                if let Some((instant, _)) = parse_instant(&line) {
                    self.end = Some(instant);
                }
            }
            _ => {}
        }
    }

    fn build(self, report_offset: FixedOffset) -> Option<CalendarEvent> {
        if self.uid.is_empty() {
            warn!(summary = %self.summary, "VEVENT without UID");
            return None;
        }
        let Some(start) = self.start else {
            warn!(uid = %self.uid, "VEVENT without DTSTART");
            return None;
        };

        let end = match self.end {
            Some(end) => end.utc,
            // A date-only DTSTART without DTEND spans one day per RFC 5545;
            // a timed one defaults to zero duration.
            None if start.is_date => start.utc + Duration::days(1),
            None => start.utc,
        };
        let end = if end < start.utc {
            warn!(uid = %self.uid, "DTEND before DTSTART, clamping");
            start.utc
        } else {
            end
        };

        let all_day = is_whole_day(start.utc, end, self.vendor_all_day);

        let recurrence = if self.rrule.is_empty() {
            None
        } else {
            match ParsedRRule::parse(&self.rrule) {
                Ok(parsed) => map_recurrence(&parsed, report_offset),
                Err(err) => {
                    // Degrade to no recurrence rather than dropping the event.
                    warn!(uid = %self.uid, %err, "invalid RRULE, syncing without recurrence");
                    None
                }
            }
        };

        Some(CalendarEvent {
            uid: self.uid,
            summary: self.summary,
            description: self.description,
            location: self.location,
            start: start.utc,
            end,
            sequence: self.sequence,
            last_modified: self.last_modified,
            tzid: self.tzid,
            rrule: self.rrule,
            all_day,
            recurrence,
        })
    }
}

/// Interpret a DTSTART/DTEND value, returning the UTC instant and the
/// validated TZID (empty when absent or rejected).
///
/// Handles `YYYYMMDD` dates, `...Z` UTC datetimes, TZID-qualified local
/// datetimes and floating datetimes (taken as UTC, matching the importer's
/// treatment of feeds without timezone information).
fn parse_instant(line: &ContentLine) -> Option<(EventInstant, String)> {
    let value = line.value.trim();

    let is_date = line.param("value") == Some("DATE")
        || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()));
    if is_date {
        let date = NaiveDate::parse_from_str(value, DATE_FORMAT).ok()?;
        let utc = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        return Some((EventInstant { utc, is_date: true }, String::new()));
    }

    if let Some(datetime) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(datetime, DATETIME_FORMAT).ok()?;
        return Some((
            EventInstant {
                utc: Utc.from_utc_datetime(&naive),
                is_date: false,
            },
            String::new(),
        ));
    }

    let naive = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).ok()?;

    if let Some(tzid) = line.param("tzid").and_then(validate) {
        if let Ok(tz) = Tz::from_str(tzid) {
            let utc = match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                LocalResult::None => Utc.from_utc_datetime(&naive),
            };
            return Some((EventInstant { utc, is_date: false }, tzid.to_string()));
        }
        warn!(tzid = %tzid, "unknown IANA zone, treating value as UTC");
    }

    Some((
        EventInstant {
            utc: Utc.from_utc_datetime(&naive),
            is_date: false,
        },
        String::new(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::{Cadence, RecurrencePattern};
    use chrono::Offset;

    fn zones() -> TimezoneMap {
        TimezoneMap::bundled()
    }

    fn parse(text: &str) -> Vec<CalendarEvent> {
        parse_calendar(text, &zones(), Utc.fix())
    }

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:one@example.com\r\n\
SUMMARY:Weekly standup\r\n\
DESCRIPTION:Recurring every \r\n Thursday\\, as usual.\r\n\
DTSTART:20170810T180000Z\r\n\
DTEND:20170810T183000Z\r\n\
SEQUENCE:2\r\n\
LAST-MODIFIED:20170801T120000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=TH\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn parses_a_timed_event() {
        let events = parse(FEED);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.uid, "one@example.com");
        assert_eq!(event.summary, "Weekly standup");
        assert_eq!(event.description, "Recurring every Thursday, as usual.");
        assert_eq!(event.sequence, 2);
        assert_eq!(event.last_modified, "20170801T120000Z");
        assert_eq!(event.start, Utc.with_ymd_and_hms(2017, 8, 10, 18, 0, 0).unwrap());
        assert!(!event.all_day);
        let rule = event.recurrence.as_ref().unwrap();
        assert!(matches!(
            rule.pattern,
            RecurrencePattern::Custom { cadence: Cadence::Weekly, .. }
        ));
    }

    #[test]
    fn unfolds_continuation_lines() {
        // The DESCRIPTION above is folded across two physical lines.
        let events = parse(FEED);
        assert!(events[0].description.contains("every Thursday"));
    }

    #[test]
    fn continuation_at_start_of_text_is_dropped() {
        let lines = unfold(" orphan continuation\r\nSUMMARY:Real\r\n");
        assert_eq!(lines, vec!["SUMMARY:Real".to_string()]);
    }

    #[test]
    fn event_without_uid_is_skipped() {
        let feed = "BEGIN:VEVENT\r\nSUMMARY:No id\r\nDTSTART:20200101T100000Z\r\nEND:VEVENT\r\n";
        assert!(parse(feed).is_empty());
    }

    #[test]
    fn event_without_dtstart_is_skipped() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:No start\r\nEND:VEVENT\r\n";
        assert!(parse(feed).is_empty());
    }

    #[test]
    fn malformed_line_does_not_abort_the_event() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nGARBAGE-NO-SEPARATOR\r\nDTSTART:20200101T100000Z\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid, "x");
    }

    #[test]
    fn date_only_event_is_whole_day() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nDTSTART;VALUE=DATE:20200601\r\nDTEND;VALUE=DATE:20200602\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert!(events[0].all_day);
        assert_eq!(events[0].start, Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn date_only_event_without_dtend_spans_one_day() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nDTSTART;VALUE=DATE:20200601\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert!(events[0].all_day);
        assert_eq!(events[0].end - events[0].start, Duration::days(1));
    }

    #[test]
    fn vendor_flag_marks_timed_event_whole_day() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nDTSTART:20200601T090000Z\r\nDTEND:20200601T100000Z\r\nX-MICROSOFT-CDO-ALLDAYEVENT:TRUE\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert!(events[0].all_day);
    }

    #[test]
    fn zoned_dtstart_converts_to_utc() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nDTSTART;TZID=America/Vancouver:20200115T100000\r\nDTEND;TZID=America/Vancouver:20200115T110000\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        let event = &events[0];
        assert_eq!(event.tzid, "America/Vancouver");
        assert_eq!(event.start, Utc.with_ymd_and_hms(2020, 1, 15, 18, 0, 0).unwrap());
    }

    #[test]
    fn outlook_tzid_is_normalized_before_assembly() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nDTSTART;TZID=\"(UTC-08:00) Pacific Standard Time\":20200115T100000\r\nDTEND;TZID=\"(UTC-08:00) Pacific Standard Time\":20200115T110000\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        let event = &events[0];
        // The rewrite strips the vendor TZID entirely.
        assert_eq!(event.tzid, "");
        assert_eq!(event.start, Utc.with_ymd_and_hms(2020, 1, 15, 18, 0, 0).unwrap());
    }

    #[test]
    fn invalid_rrule_degrades_to_no_recurrence() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nDTSTART:20200101T100000Z\r\nRRULE:BYDAY=MO\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert_eq!(events.len(), 1);
        assert!(events[0].recurrence.is_none());
        assert_eq!(events[0].rrule, "BYDAY=MO");
    }

    #[test]
    fn alarm_properties_do_not_leak_into_the_event() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Meeting\r\nDTSTART:20200101T100000Z\r\n\
BEGIN:VALARM\r\nTRIGGER:-PT15M\r\nDESCRIPTION:Reminder\r\nEND:VALARM\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert_eq!(events[0].description, "");
        assert_eq!(events[0].summary, "Meeting");
    }

    #[test]
    fn dtend_before_dtstart_is_clamped() {
        let feed = "BEGIN:VEVENT\r\nUID:x\r\nDTSTART:20200101T100000Z\r\nDTEND:20200101T090000Z\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert_eq!(events[0].start, events[0].end);
    }

    #[test]
    fn multiple_events_parse_in_order() {
        let feed = "BEGIN:VEVENT\r\nUID:a\r\nDTSTART:20200101T100000Z\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:b\r\nDTSTART:20200102T100000Z\r\nEND:VEVENT\r\n";
        let events = parse(feed);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid, "a");
        assert_eq!(events[1].uid, "b");
    }
}
