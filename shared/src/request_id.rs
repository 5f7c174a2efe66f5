//! Timestamp-derived request identifiers
//!
//! Every outgoing command carries an id of the form:
//! ```text
//! YYYYMMDDHHMMSSmmm   (17 ASCII digits, local wall-clock time)
//! ```
//!
//! Ids generated in strictly increasing milliseconds sort lexically in
//! generation order. Two ids generated within the same millisecond are
//! identical; callers that register ids must check for duplicates.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a well-formed request id
pub const REQUEST_ID_LEN: usize = 17;

/// Opaque request identifier echoed back on every response
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Build an id from a specific instant
    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(at.format("%Y%m%d%H%M%S%3f").to_string())
    }

    /// Human-readable timestamp, or the raw id if it is not a timestamp id
    pub fn readable(&self) -> String {
        readable_timestamp(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id has the fixed-width timestamp shape
    pub fn is_well_formed(&self) -> bool {
        is_timestamp_id(&self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Produces one id per outgoing command from the local clock
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdGenerator;

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate an id for the current instant
    pub fn next(&self) -> RequestId {
        RequestId::from_datetime(&Local::now())
    }
}

fn is_timestamp_id(raw: &str) -> bool {
    raw.len() == REQUEST_ID_LEN && raw.bytes().all(|b| b.is_ascii_digit())
}

/// Render `YYYYMMDDHHMMSSmmm` as `YYYY-MM-DD HH:MM:SS.mmm`
///
/// Anything that is not exactly 17 ASCII digits is returned unchanged.
pub fn readable_timestamp(raw: &str) -> String {
    if !is_timestamp_id(raw) {
        return raw.to_string();
    }

    format!(
        "{}-{}-{} {}:{}:{}.{}",
        &raw[0..4],
        &raw[4..6],
        &raw[6..8],
        &raw[8..10],
        &raw[10..12],
        &raw[12..14],
        &raw[14..17]
    )
}
