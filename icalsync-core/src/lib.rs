//! Core library for icalsync.
//!
//! Ingests remote iCalendar feeds and reconciles their events against a
//! locally stored catalog:
//! - `ics` normalizes content lines (including the Outlook
//!   timezone-in-parameter quirk) and assembles VEVENT blocks;
//! - `rrule` and `recurrence` map RRULEs onto a constrained recurrence
//!   model;
//! - `sync` diffs a feed's current UIDs against the stored set and emits
//!   create/update/delete decisions.
//!
//! The crate performs no I/O of its own; fetching and persistence come in
//! through the `FeedFetcher` and `EventStore` traits.

pub mod error;
pub mod event;
pub mod ics;
pub mod recurrence;
pub mod rrule;
pub mod sync;
pub mod timezone;

pub use error::{FetchError, ParseError, RRuleError};
pub use event::{is_whole_day, CalendarEvent};
pub use ics::{normalize_line, parse_calendar, ContentLine};
pub use recurrence::{
    map_recurrence, parse_rrule, Cadence, Ordinal, OrdinalDayRule, RecurrenceEnd,
    RecurrencePattern, RecurrenceRule,
};
pub use rrule::ParsedRRule;
pub use sync::{
    EventId, EventStore, FeedFetcher, FeedReport, FeedSpec, StoredEvent, SyncDecision, Syncer,
};
pub use timezone::{validate, TimezoneMap};
