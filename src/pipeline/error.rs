//! Error reporting for the recording pipeline.
//!
//! Faults that must not abort a session (playback launch, shutdown steps,
//! schedule loading) are reported here and swallowed by the caller.

use crate::error::EegSyncError;
use std::sync::{Arc, Mutex};

/// Trait for reporting pipeline errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a pipeline component.
    fn report(&self, component: &str, error: &EegSyncError);
}

/// Simple error reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, component: &str, error: &EegSyncError) {
        eprintln_clear(&format_report(component, error));
    }
}

/// One log line for a reported error; errors the session survives are warnings.
pub fn format_report(component: &str, error: &EegSyncError) -> String {
    if error.is_fatal() {
        format!("eegsync: {}: {}", component, error)
    } else {
        format!("eegsync: {}: warning: {}", component, error)
    }
}

/// Reporter that keeps what it was given, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    reports: Arc<Mutex<Vec<(String, String)>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(component, message)` pairs in report order.
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, component: &str, error: &EegSyncError) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((component.to_string(), error.to_string()));
    }
}

/// Print a message to stderr, clearing any active status line first.
pub fn eprintln_clear(msg: &str) {
    eprint!("\r{:80}\r", "");
    eprintln!("{}", msg);
}
