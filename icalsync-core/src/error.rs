//! Error types for the icalsync core.
//!
//! Nothing here is fatal to a sync batch: line and event errors skip the
//! offending unit, fetch errors skip the feed, and an invalid RRULE degrades
//! the event to "no recurrence".

use thiserror::Error;

/// Errors produced while normalizing a single content line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line has no `:` separating the property from its value.
    #[error("content line has no value separator: {0:?}")]
    MalformedLine(String),

    /// A parameter segment has no `=` separating key from value.
    #[error("parameter has no '=': {0:?}")]
    MalformedParameter(String),
}

/// Error produced when an RRULE value cannot name a cadence.
///
/// Unknown rule parts are never an error (forward compatibility); only a
/// missing FREQ is, since every downstream rule requires a cadence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("RRULE has no FREQ part: {0:?}")]
pub struct RRuleError(pub String);

/// Errors produced while fetching a feed.
///
/// Cloneable so a failed feed's error can be carried in its report while the
/// rest of the batch continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The feed could not be retrieved at all.
    #[error("failed to fetch {url}: {message}")]
    Unreachable { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("fetch of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body does not look like iCalendar data.
    #[error("{url} did not return calendar data (content type {content_type:?})")]
    NotCalendar { url: String, content_type: String },
}
