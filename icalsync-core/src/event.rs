//! The normalized calendar event record.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recurrence::RecurrenceRule;

const SECONDS_PER_DAY: i64 = 86_400;

/// One event parsed from a feed, normalized and ready for sync.
///
/// Immutable after construction; owned by the sync pass that produced it.
/// Persistence belongs to the external event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Feed-unique identifier, never empty.
    pub uid: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    /// Always `>= start` once whole-day adjustment is applied.
    pub end: DateTime<Utc>,
    /// SEQUENCE revision number, `>= 0`.
    pub sequence: i64,
    /// Raw LAST-MODIFIED value, empty when the feed omits it.
    pub last_modified: String,
    /// Validated IANA zone name, empty when unknown or rejected.
    pub tzid: String,
    /// Raw RRULE value, empty when the event does not recur.
    pub rrule: String,
    pub all_day: bool,
    /// The RRULE mapped onto the target model, when expressible.
    pub recurrence: Option<RecurrenceRule>,
}

impl CalendarEvent {
    /// Start and end as display datetimes in the reporting offset.
    ///
    /// Whole-day events collapse: the iCalendar exclusive end-of-day
    /// convention becomes an inclusive same-day one, and the zero offset is
    /// used instead of the reporting offset so the calendar date never
    /// shifts.
    pub fn display_times(&self, report_offset: FixedOffset) -> (NaiveDateTime, NaiveDateTime) {
        if self.all_day {
            let start = self.start.naive_utc();
            (start, start)
        } else {
            (
                self.start.with_timezone(&report_offset).naive_local(),
                self.end.with_timezone(&report_offset).naive_local(),
            )
        }
    }
}

/// Decide whether an event spans whole calendar days.
///
/// True when the vendor all-day flag is set, or when the duration is a
/// strictly positive exact multiple of 24 hours.
pub fn is_whole_day(start: DateTime<Utc>, end: DateTime<Utc>, vendor_flag: bool) -> bool {
    if vendor_flag {
        return true;
    }
    let seconds = (end - start).num_seconds();
    seconds > 0 && seconds % SECONDS_PER_DAY == 0
}
