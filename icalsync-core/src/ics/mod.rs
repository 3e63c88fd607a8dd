//! iCalendar text handling: content line normalization and VEVENT assembly.

mod line;
mod parse;

pub use line::{normalize_line, ContentLine};
pub use parse::{parse_calendar, unfold};
