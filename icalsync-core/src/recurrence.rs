//! Mapping parsed RRULEs onto the constrained target recurrence model.
//!
//! The target scheduling system supports far fewer recurrence shapes than
//! RFC 5545: a simple cadence, or a custom cadence with an interval, an end
//! condition and at most one day constraint. Everything the model cannot
//! express (BYSECOND, BYMINUTE, BYHOUR, BYWEEKNO, BYSETPOS, WKST, list values
//! beyond the first) is dropped with a warning, never rejected.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RRuleError;
use crate::rrule::ParsedRRule;

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    /// Map a FREQ value onto a cadence. Cadences outside the supported set
    /// (SECONDLY, MINUTELY, HOURLY) yield `None`.
    fn from_freq(freq: &str) -> Option<Self> {
        match freq.to_uppercase().as_str() {
            "DAILY" => Some(Cadence::Daily),
            "WEEKLY" => Some(Cadence::Weekly),
            "MONTHLY" => Some(Cadence::Monthly),
            "YEARLY" => Some(Cadence::Yearly),
            _ => None,
        }
    }
}

/// When a recurrence stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceEnd {
    Never,
    /// COUNT: stop after this many occurrences.
    After(u32),
    /// UNTIL, truncated to a calendar date in the reporting offset.
    On(NaiveDate),
}

/// Position of a weekday within a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ordinal {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Last,
}

/// The single day constraint a custom monthly/yearly rule may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrdinalDayRule {
    /// BYMONTHDAY=n for plain days of the month.
    Nth(u8),
    /// BYMONTHDAY=1. The original importer maps this to its first-of-month
    /// sentinel instead of `Nth(1)`; preserved as observed behavior.
    First,
    /// BYMONTHDAY=-1, the last day of the month.
    Last,
    /// An ordinal weekday such as "2nd Tuesday" or "last Friday".
    NthWeekday { ordinal: Ordinal, weekday: Weekday },
}

/// The shape of a mapped recurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrencePattern {
    /// Interval 1 and no BY* constraints: plain "every day/week/month/year".
    Simple { cadence: Cadence },
    /// Anything else the target model can still express.
    Custom {
        cadence: Cadence,
        /// Weekdays for weekly rules.
        by_weekday: Vec<Weekday>,
        /// At most one day constraint for monthly/yearly rules.
        by_month_day: Option<OrdinalDayRule>,
        /// Months (1-12) for yearly rules.
        by_month: Vec<u32>,
    },
}

/// A recurrence expressed in the target model.
///
/// Interval and end condition apply to simple patterns too; the source
/// computes them before deciding between simple and custom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub interval: u32,
    pub end: RecurrenceEnd,
    pub pattern: RecurrencePattern,
}

/// Parse an RRULE value and map it onto the target model.
///
/// `Ok(None)` means the rule was syntactically valid but names a cadence the
/// target cannot express; the event is then synced without recurrence.
pub fn parse_rrule(text: &str) -> Result<Option<RecurrenceRule>, RRuleError> {
    let parsed = ParsedRRule::parse(text)?;
    Ok(map_recurrence(&parsed, Utc.fix()))
}

/// Map an already-parsed RRULE onto the target model.
///
/// `report_offset` is the offset in which UNTIL is truncated to a date.
pub fn map_recurrence(rule: &ParsedRRule, report_offset: FixedOffset) -> Option<RecurrenceRule> {
    let Some(cadence) = Cadence::from_freq(rule.freq()) else {
        warn!(freq = %rule.freq(), "unsupported FREQ, dropping recurrence");
        return None;
    };

    let interval = rule
        .part("INTERVAL")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|&v| v >= 1)
        .unwrap_or(1);

    let end = parse_end(rule, report_offset);

    warn_ignored_parts(rule);

    // Interval 1 with no BY* constraints is the simple shape.
    if interval == 1 && !rule.has_by_parts() {
        return Some(RecurrenceRule {
            interval,
            end,
            pattern: RecurrencePattern::Simple { cadence },
        });
    }

    let mut by_weekday = Vec::new();
    let mut by_month_day = None;
    let mut by_month = Vec::new();

    match cadence {
        Cadence::Daily => {}
        Cadence::Weekly => {
            for token in rule.by_list("BYDAY").unwrap_or_default() {
                if token.is_empty() {
                    continue;
                }
                // Ordinal-prefixed entries like "1MO" are meaningless for a
                // weekly cadence and are dropped.
                match weekday_from_code(token) {
                    Some(weekday) => by_weekday.push(weekday),
                    None => warn!(token = %token, "BYDAY entry not valid for WEEKLY, ignoring"),
                }
            }
        }
        Cadence::Monthly => {
            // The target model supports a single constraint; BYMONTHDAY wins
            // over BYDAY, and only the first value of either is honored.
            if let Some(day) = first_by_value(rule, "BYMONTHDAY") {
                by_month_day = month_day_rule(day);
            } else if let Some(token) = first_by_value(rule, "BYDAY") {
                by_month_day = ordinal_weekday_rule(token);
            }
        }
        Cadence::Yearly => {
            if let Some(months) = rule.by_list("BYMONTH") {
                by_month = months
                    .iter()
                    .filter_map(|m| m.parse::<u32>().ok())
                    .filter(|&m| (1..=12).contains(&m))
                    .collect();
            }
            if let Some(token) = first_by_value(rule, "BYDAY") {
                by_month_day = ordinal_weekday_rule(token);
            }
        }
    }

    Some(RecurrenceRule {
        interval,
        end,
        pattern: RecurrencePattern::Custom {
            cadence,
            by_weekday,
            by_month_day,
            by_month,
        },
    })
}

fn parse_end(rule: &ParsedRRule, report_offset: FixedOffset) -> RecurrenceEnd {
    if let Some(count) = rule.part("COUNT").and_then(|v| v.parse::<u32>().ok()) {
        if count > 0 {
            return RecurrenceEnd::After(count);
        }
    }
    if let Some(until) = rule.part("UNTIL") {
        if let Some(date) = parse_until(until, report_offset) {
            return RecurrenceEnd::On(date);
        }
        warn!(until = %until, "unparsable UNTIL, treating recurrence as unbounded");
    }
    RecurrenceEnd::Never
}

/// Parse an UNTIL value and truncate it to a date in the reporting offset.
///
/// Accepts `YYYYMMDD`, `YYYYMMDDTHHMMSS[Z]` and explicit-offset forms like
/// `20170817T113631-0700`. A bare datetime is taken as UTC.
fn parse_until(value: &str, report_offset: FixedOffset) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y%m%dT%H%M%S%z") {
        return Some(dt.with_timezone(&report_offset).date_naive());
    }
    let naive =
        NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S").ok()?;
    Some(
        naive
            .and_utc()
            .with_timezone(&report_offset)
            .date_naive(),
    )
}

/// BYMONTHDAY resolution for monthly rules.
fn month_day_rule(day: &str) -> Option<OrdinalDayRule> {
    match day {
        "-1" => Some(OrdinalDayRule::Last),
        // The original importer treats day 1 as its first-of-month sentinel
        // rather than Nth(1); kept as-is.
        "1" => Some(OrdinalDayRule::First),
        other => match other.parse::<u8>() {
            Ok(n) if (1..=31).contains(&n) => Some(OrdinalDayRule::Nth(n)),
            _ => {
                // Negative days other than -1 ("last but one") have no
                // counterpart in the target model.
                warn!(day = %other, "unsupported BYMONTHDAY value, ignoring");
                None
            }
        },
    }
}

/// BYDAY token resolution for monthly/yearly rules: `[-]?[1-5]?WEEKDAY`.
fn ordinal_weekday_rule(token: &str) -> Option<OrdinalDayRule> {
    if let Some(suffix) = token.strip_prefix('-') {
        // Only "last <weekday>" is expressible; "-2MO" and friends are not.
        return match weekday_from_code(suffix) {
            Some(weekday) => Some(OrdinalDayRule::NthWeekday {
                ordinal: Ordinal::Last,
                weekday,
            }),
            None => {
                warn!(token = %token, "unsupported negative BYDAY ordinal, ignoring");
                None
            }
        };
    }

    let mut chars = token.chars();
    match chars.next() {
        Some(digit @ '1'..='5') => {
            let ordinal = match digit {
                '1' => Ordinal::First,
                '2' => Ordinal::Second,
                '3' => Ordinal::Third,
                '4' => Ordinal::Fourth,
                _ => Ordinal::Fifth,
            };
            let weekday = weekday_from_code(chars.as_str())?;
            Some(OrdinalDayRule::NthWeekday { ordinal, weekday })
        }
        // A bare weekday ("every Monday of every month") has no counterpart
        // in the target model.
        _ => {
            warn!(token = %token, "BYDAY entry without ordinal, ignoring");
            None
        }
    }
}

fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn first_by_value<'a>(rule: &'a ParsedRRule, name: &str) -> Option<&'a str> {
    let values = rule.by_list(name)?;
    if values.len() > 1 {
        warn!(part = name, "multiple {} values, honoring only the first", name);
    }
    values.first().map(String::as_str).filter(|v| !v.is_empty())
}

/// Warn once per rule part the target model cannot express.
fn warn_ignored_parts(rule: &ParsedRRule) {
    const IGNORED: [&str; 6] = [
        "BYSECOND", "BYMINUTE", "BYHOUR", "BYWEEKNO", "BYSETPOS", "WKST",
    ];
    for name in IGNORED {
        if rule.part(name).is_some() {
            warn!(part = name, "rule part not supported by the target model, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(text: &str) -> Option<RecurrenceRule> {
        parse_rrule(text).unwrap()
    }

    #[test]
    fn plain_cadences_map_to_simple() {
        for (text, cadence) in [
            ("FREQ=DAILY", Cadence::Daily),
            ("FREQ=WEEKLY", Cadence::Weekly),
            ("FREQ=MONTHLY", Cadence::Monthly),
            ("FREQ=YEARLY", Cadence::Yearly),
        ] {
            let rule = map(text).unwrap();
            assert_eq!(rule.interval, 1);
            assert_eq!(rule.end, RecurrenceEnd::Never);
            assert_eq!(rule.pattern, RecurrencePattern::Simple { cadence });
        }
    }

    #[test]
    fn byday_forces_custom_even_at_interval_one() {
        let rule = map("FREQ=WEEKLY;BYDAY=TH").unwrap();
        assert_eq!(rule.interval, 1);
        assert_eq!(
            rule.pattern,
            RecurrencePattern::Custom {
                cadence: Cadence::Weekly,
                by_weekday: vec![Weekday::Thu],
                by_month_day: None,
                by_month: vec![],
            }
        );
    }

    #[test]
    fn interval_alone_forces_custom() {
        let rule = map("FREQ=DAILY;INTERVAL=3").unwrap();
        assert_eq!(rule.interval, 3);
        assert!(matches!(
            rule.pattern,
            RecurrencePattern::Custom { cadence: Cadence::Daily, .. }
        ));
    }

    #[test]
    fn weekly_collects_all_weekdays() {
        let rule = map("FREQ=WEEKLY;BYDAY=MO,WE,FR").unwrap();
        match rule.pattern {
            RecurrencePattern::Custom { by_weekday, .. } => {
                assert_eq!(by_weekday, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
            }
            other => panic!("expected custom pattern, got {other:?}"),
        }
    }

    #[test]
    fn weekly_ignores_ordinal_prefixed_days() {
        let rule = map("FREQ=WEEKLY;BYDAY=1MO,TU").unwrap();
        match rule.pattern {
            RecurrencePattern::Custom { by_weekday, .. } => {
                assert_eq!(by_weekday, vec![Weekday::Tue]);
            }
            other => panic!("expected custom pattern, got {other:?}"),
        }
    }

    #[test]
    fn monthly_last_day() {
        let rule = map("FREQ=MONTHLY;BYMONTHDAY=-1").unwrap();
        assert_eq!(day_rule(&rule), Some(OrdinalDayRule::Last));
    }

    #[test]
    fn monthly_first_day_sentinel_quirk() {
        // Observed importer behavior: day 1 becomes the first-of-month
        // sentinel, not Nth(1). Kept until the target system's intent is
        // confirmed.
        let rule = map("FREQ=MONTHLY;BYMONTHDAY=1").unwrap();
        assert_eq!(day_rule(&rule), Some(OrdinalDayRule::First));
    }

    #[test]
    fn monthly_nth_day() {
        let rule = map("FREQ=MONTHLY;BYMONTHDAY=15").unwrap();
        assert_eq!(day_rule(&rule), Some(OrdinalDayRule::Nth(15)));
    }

    #[test]
    fn monthly_honors_only_first_monthday() {
        let rule = map("FREQ=MONTHLY;BYMONTHDAY=15,20").unwrap();
        assert_eq!(day_rule(&rule), Some(OrdinalDayRule::Nth(15)));
    }

    #[test]
    fn monthly_second_tuesday() {
        let rule = map("FREQ=MONTHLY;BYDAY=2TU").unwrap();
        assert_eq!(
            day_rule(&rule),
            Some(OrdinalDayRule::NthWeekday {
                ordinal: Ordinal::Second,
                weekday: Weekday::Tue,
            })
        );
    }

    #[test]
    fn monthly_last_friday() {
        let rule = map("FREQ=MONTHLY;BYDAY=-1FR").unwrap();
        assert_eq!(
            day_rule(&rule),
            Some(OrdinalDayRule::NthWeekday {
                ordinal: Ordinal::Last,
                weekday: Weekday::Fri,
            })
        );
    }

    #[test]
    fn monthly_last_but_one_is_dropped() {
        let rule = map("FREQ=MONTHLY;BYDAY=-2MO").unwrap();
        assert_eq!(day_rule(&rule), None);
    }

    #[test]
    fn monthly_bare_weekday_is_dropped() {
        let rule = map("FREQ=MONTHLY;BYDAY=MO").unwrap();
        assert_eq!(day_rule(&rule), None);
    }

    #[test]
    fn monthly_prefers_monthday_over_byday() {
        let rule = map("FREQ=MONTHLY;BYMONTHDAY=10;BYDAY=2TU").unwrap();
        assert_eq!(day_rule(&rule), Some(OrdinalDayRule::Nth(10)));
    }

    #[test]
    fn yearly_captures_months_and_ordinal_weekday() {
        let rule = map("FREQ=YEARLY;BYMONTH=3,11;BYDAY=1SU").unwrap();
        match rule.pattern {
            RecurrencePattern::Custom {
                by_month,
                by_month_day,
                ..
            } => {
                assert_eq!(by_month, vec![3, 11]);
                assert_eq!(
                    by_month_day,
                    Some(OrdinalDayRule::NthWeekday {
                        ordinal: Ordinal::First,
                        weekday: Weekday::Sun,
                    })
                );
            }
            other => panic!("expected custom pattern, got {other:?}"),
        }
    }

    #[test]
    fn count_becomes_after() {
        let rule = map("FREQ=DAILY;COUNT=10").unwrap();
        assert_eq!(rule.end, RecurrenceEnd::After(10));
    }

    #[test]
    fn until_truncates_to_date_in_report_offset() {
        let parsed = ParsedRRule::parse("FREQ=WEEKLY;UNTIL=20170818T023631Z").unwrap();
        // UTC-7: 2017-08-18 02:36 UTC is still 2017-08-17 locally.
        let offset = FixedOffset::west_opt(7 * 3600).unwrap();
        let rule = map_recurrence(&parsed, offset).unwrap();
        assert_eq!(
            rule.end,
            RecurrenceEnd::On(NaiveDate::from_ymd_opt(2017, 8, 17).unwrap())
        );
    }

    #[test]
    fn until_with_explicit_offset() {
        let rule = map("FREQ=WEEKLY;BYDAY=TH;UNTIL=20170817T113631-0700").unwrap();
        assert_eq!(
            rule.end,
            RecurrenceEnd::On(NaiveDate::from_ymd_opt(2017, 8, 17).unwrap())
        );
    }

    #[test]
    fn count_wins_over_until() {
        let rule = map("FREQ=DAILY;COUNT=5;UNTIL=20250101").unwrap();
        assert_eq!(rule.end, RecurrenceEnd::After(5));
    }

    #[test]
    fn unsupported_freq_drops_recurrence() {
        assert!(map("FREQ=HOURLY;INTERVAL=2").is_none());
        assert!(map("FREQ=SECONDLY").is_none());
    }

    #[test]
    fn missing_freq_is_invalid() {
        assert!(parse_rrule("BYDAY=MO").is_err());
    }

    #[test]
    fn ignored_parts_do_not_force_custom() {
        // WKST is not a BY* list part and must not affect the shape.
        let rule = map("FREQ=DAILY;WKST=SU").unwrap();
        assert!(matches!(rule.pattern, RecurrencePattern::Simple { .. }));
    }

    #[test]
    fn time_granular_by_parts_do_not_force_custom() {
        // BYSECOND/BYMINUTE/BYHOUR are accepted syntactically but ignored
        // semantically; a rule carrying only those stays simple.
        let rule = map("FREQ=DAILY;BYMINUTE=30").unwrap();
        assert!(matches!(rule.pattern, RecurrencePattern::Simple { .. }));
        let rule = map("FREQ=WEEKLY;BYSECOND=0;BYHOUR=9").unwrap();
        assert!(matches!(rule.pattern, RecurrencePattern::Simple { .. }));
    }

    fn day_rule(rule: &RecurrenceRule) -> Option<OrdinalDayRule> {
        match &rule.pattern {
            RecurrencePattern::Custom { by_month_day, .. } => *by_month_day,
            other => panic!("expected custom pattern, got {other:?}"),
        }
    }

    #[test]
    fn until_date_only() {
        let parsed = ParsedRRule::parse("FREQ=DAILY;UNTIL=20240601").unwrap();
        let rule = map_recurrence(&parsed, chrono::Utc.fix()).unwrap();
        assert_eq!(
            rule.end,
            RecurrenceEnd::On(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        );
    }
}
