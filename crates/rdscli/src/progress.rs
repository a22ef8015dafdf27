//! Progress reporting for long-running client steps
//!
//! Waiting loops announce what they are waiting for. The same loop runs
//! under an interactive terminal and in plain log output, so the sink is a
//! trait.

use std::sync::Mutex;
use tracing::info;

/// Sink for human-readable progress messages
pub trait ProgressReporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Reports progress through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, message: &str) {
        info!("{message}");
    }
}

/// Prints progress to stderr, leaving stdout to the caller
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn report(&self, message: &str) {
        eprintln!("{message}...");
    }
}

/// Keeps every message, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// Forwards a status label only when it differs from the previous one
pub struct StatusAnnouncer<'a, R: ?Sized> {
    reporter: &'a R,
    last: Mutex<Option<String>>,
}

impl<'a, R: ProgressReporter + ?Sized> StatusAnnouncer<'a, R> {
    pub fn new(reporter: &'a R) -> Self {
        Self {
            reporter,
            last: Mutex::new(None),
        }
    }

    /// Announce `label`, returning whether it was forwarded
    pub fn announce(&self, label: &str) -> bool {
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if last.as_deref() == Some(label) {
            return false;
        }
        *last = Some(label.to_string());
        self.reporter.report(label);
        true
    }
}
