//! eegsync - EEG recording synchronized with a cue video
//!
//! Streams samples from an acquisition board to CSV while a video plays and
//! a marker schedule labels each sample with the active stimulus.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod device;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod markers;
pub mod output;
pub mod pipeline;
pub mod playback;
pub mod sys;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Core traits (device → stream → sink)
pub use clock::{Clock, SystemClock};
pub use device::AcquisitionDevice;
pub use pipeline::sink::{CollectorSink, CsvSink, RecordSink};

// Session
pub use pipeline::orchestrator::{Recorder, RecorderConfig, RecordingControl};
pub use pipeline::types::{SessionEvent, SessionSummary};

// Markers
pub use markers::{MarkerSchedule, MarkerScheduler};

// Error handling
pub use error::{EegSyncError, Result};

// Config
pub use config::Config;

pub use pipeline::error::ErrorReporter;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
