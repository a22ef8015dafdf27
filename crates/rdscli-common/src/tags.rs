//! Activity record tag keys for the scaling group
//!
//! The scaling group's tags are the only persistent state of the system.
//! Exactly three keys are used, each holding a UTC timestamp.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `LastActivity` | Last time the instance reported at least one active session |
//! | `LastRequest` | Last time a client requested activation |
//! | `FirstCleanup` | First cleanup check of the current idle episode |

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

/// Tag key for the last reported session activity
pub const TAG_LAST_ACTIVITY: &str = "LastActivity";

/// Tag key for the last client activation request
pub const TAG_LAST_REQUEST: &str = "LastRequest";

/// Tag key for the grace-period anchor of the current idle episode
pub const TAG_FIRST_CLEANUP: &str = "FirstCleanup";

/// Timestamp format used in tag values (UTC, second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One of the three activity record keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityKey {
    LastActivity,
    LastRequest,
    FirstCleanup,
}

impl ActivityKey {
    /// All keys, in tag-schema order
    pub const ALL: [ActivityKey; 3] = [
        ActivityKey::LastActivity,
        ActivityKey::LastRequest,
        ActivityKey::FirstCleanup,
    ];

    /// Tag key as stored on the scaling group
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKey::LastActivity => TAG_LAST_ACTIVITY,
            ActivityKey::LastRequest => TAG_LAST_REQUEST,
            ActivityKey::FirstCleanup => TAG_FIRST_CLEANUP,
        }
    }

    /// Map a tag key back to an activity key; unrelated tags yield `None`
    pub fn from_tag_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format a timestamp for a tag value
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a tag value; malformed values are treated as absent
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
