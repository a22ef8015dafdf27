//! Control function event payload and invocation outcome
//!
//! The control function is invoked by the on-instance reporter, the
//! scheduled cleanup rule and the client. All three send the same JSON shape:
//!
//! ```json
//! {"Action": "report", "ActiveSessions": 2}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action name sent by the on-instance session reporter
pub const ACTION_REPORT: &str = "report";

/// Action name sent by the client to bring the instance up
pub const ACTION_ACTIVATE: &str = "activate";

/// Action name sent by the scheduled cleanup rule
pub const ACTION_CLEANUP: &str = "cleanup";

/// Raw control event as received on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEvent {
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(
        rename = "ActiveSessions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub active_sessions: Option<i64>,
}

/// The event's action was missing or unknown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid action: {}", .0.as_deref().unwrap_or("<missing>"))]
pub struct InvalidEvent(pub Option<String>);

/// A validated control event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Periodic session count from the instance
    Report { active_sessions: i64 },
    /// Client asks for the instance to be brought up
    Activate,
    /// Scheduled idle check
    Cleanup,
}

impl ControlEvent {
    pub fn report(active_sessions: i64) -> Self {
        Self {
            action: Some(ACTION_REPORT.to_string()),
            active_sessions: Some(active_sessions),
        }
    }

    pub fn activate() -> Self {
        Self {
            action: Some(ACTION_ACTIVATE.to_string()),
            active_sessions: None,
        }
    }

    pub fn cleanup() -> Self {
        Self {
            action: Some(ACTION_CLEANUP.to_string()),
            active_sessions: None,
        }
    }

    /// Validate the action.
    ///
    /// A `report` without a session count is read as zero sessions.
    pub fn kind(&self) -> Result<EventKind, InvalidEvent> {
        match self.action.as_deref() {
            Some(ACTION_REPORT) => Ok(EventKind::Report {
                active_sessions: self.active_sessions.unwrap_or(0),
            }),
            Some(ACTION_ACTIVATE) => Ok(EventKind::Activate),
            Some(ACTION_CLEANUP) => Ok(EventKind::Cleanup),
            _ => Err(InvalidEvent(self.action.clone())),
        }
    }
}

/// What a control invocation did, returned to the caller as JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// `LastActivity` was stamped
    ActivityRecorded,
    /// `LastRequest` was stamped and capacity set to one
    Activated {
        /// The idle-episode anchor was cleared on the 0 -> 1 transition
        rearmed: bool,
    },
    /// Idle check ran and kept the instance
    Kept { idle_seconds: Option<i64> },
    /// Idle check ran and set desired capacity to zero
    ScaledToZero { idle_seconds: i64 },
}
