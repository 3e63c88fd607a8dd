//! Content line normalization.
//!
//! A logical (already unfolded) iCalendar line has the shape
//! `NAME;PARAM=VALUE;...:DATA`. This module splits it into a [`ContentLine`],
//! unescapes the data, and rewrites the Outlook `TZID="(UTC±HH:MM) ..."`
//! quirk on DTSTART/DTEND into a plain UTC timestamp.

use std::collections::HashMap;

use chrono::{FixedOffset, LocalResult, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::error::ParseError;
use crate::timezone::TimezoneMap;

const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One normalized content line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// Property name, lowercased (`dtstart`, `summary`, ...).
    pub name: String,
    /// Parameters with lowercased keys and surrounding quotes stripped
    /// from values.
    pub params: HashMap<String, String>,
    /// Property value with text escapes resolved.
    pub value: String,
}

impl ContentLine {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Split a raw content line into a [`ContentLine`], applying text unescaping
/// and the Outlook timezone correction.
pub fn normalize_line(line: &str, zones: &TimezoneMap) -> Result<ContentLine, ParseError> {
    // The separator is the first ':' that is neither backslash-escaped nor
    // inside a double-quoted parameter value ("(UTC-08:00) ..." legitimately
    // contains one).
    let sep = find_value_separator(line)
        .ok_or_else(|| ParseError::MalformedLine(line.to_string()))?;
    let (head, data) = (&line[..sep], &line[sep + 1..]);

    let mut segments = split_outside_quotes(head, ';');
    let name = segments.remove(0).to_lowercase();

    let mut params = HashMap::new();
    for segment in segments {
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| ParseError::MalformedParameter(segment.to_string()))?;
        params.insert(key.to_lowercase(), strip_quotes(value).to_string());
    }

    let mut line = ContentLine {
        name,
        params,
        value: unescape(data),
    };

    // The Microsoft correction applies only to DTSTART/DTEND; other
    // properties keep their TZID untouched.
    if line.name == "dtstart" || line.name == "dtend" {
        if let Some(tzid) = line.param("tzid") {
            if tzid.contains("(UTC") {
                rewrite_outlook_tzid(&mut line, zones);
            }
        }
    }

    Ok(line)
}

fn find_value_separator(line: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some(idx),
            _ => {}
        }
    }
    None
}

fn split_outside_quotes(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == sep && !in_quotes {
            parts.push(&text[start..idx]);
            start = idx + sep.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Resolve RFC 5545 text escapes by literal substring replacement. Any other
/// backslash sequence is kept verbatim.
fn unescape(value: &str) -> String {
    value
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\:", ":")
        .replace("\\\"", "\"")
        .replace("\\n", "\n")
        .replace("\\N", "\n")
}

/// Rewrite an Outlook-style `TZID="(UTC±HH:MM) Display Name"` line into a
/// UTC value with the parameter removed.
fn rewrite_outlook_tzid(line: &mut ContentLine, zones: &TimezoneMap) {
    let tzid = line.params.get("tzid").cloned().unwrap_or_default();

    // "(UTC)" means the value already is UTC; just drop the parameter.
    if tzid.contains("(UTC)") {
        line.params.remove("tzid");
        return;
    }

    let Some((offset, display_name)) = parse_offset_tzid(&tzid) else {
        warn!(tzid = %tzid, "unparsable Outlook TZID, leaving line untouched");
        return;
    };

    let Ok(local) = NaiveDateTime::parse_from_str(line.value.trim_end_matches('Z'), DATETIME_FORMAT)
    else {
        warn!(value = %line.value, "Outlook TZID on a non-datetime value, leaving line untouched");
        return;
    };

    let utc = match zones.resolve_tz(&display_name) {
        // A mapped IANA zone interprets the value as local time there.
        Some(tz) => match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            // The local time falls in a DST gap; the fixed offset is the
            // best remaining interpretation.
            LocalResult::None => fixed_offset_to_utc(local, offset),
        },
        // No mapping: apply the fixed offset from the display string. This
        // is wrong by an hour for part of the year in zones observing
        // daylight saving, but it is all the feed gives us.
        None => fixed_offset_to_utc(local, offset),
    };

    line.params.remove("tzid");
    line.value = utc.format(DATETIME_FORMAT).to_string();
}

fn fixed_offset_to_utc(local: NaiveDateTime, offset: FixedOffset) -> chrono::DateTime<Utc> {
    match offset.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // Unreachable for fixed offsets, but stay total.
        LocalResult::None => Utc.from_utc_datetime(&local),
    }
}

/// Split `(UTC±HH:MM) Display Name` into the fixed offset and the display
/// name that follows it.
fn parse_offset_tzid(tzid: &str) -> Option<(FixedOffset, String)> {
    let open = tzid.find("(UTC")?;
    let rest = &tzid[open + 4..];
    let close = rest.find(')')?;
    let offset_text = &rest[..close];
    let display_name = rest[close + 1..].trim().to_string();

    let sign = match offset_text.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let (hours, minutes) = offset_text[1..].split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;

    Some((offset, display_name))
}
