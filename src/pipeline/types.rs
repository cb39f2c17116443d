//! Types flowing through the recording pipeline.

use crate::defaults::{AUXILIARY_CHANNELS, PRIMARY_CHANNELS, RESERVED_COLUMNS};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One tagged sample, persisted as one output row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// 1-based, gapless sample index.
    pub index: u64,
    pub primary: [f64; PRIMARY_CHANNELS],
    pub auxiliary: [f64; AUXILIARY_CHANNELS],
    pub reserved: [f64; RESERVED_COLUMNS],
    /// Device-reported timestamp, seconds since the Unix epoch.
    pub device_timestamp: f64,
    /// Active marker label at emission time; empty when none.
    pub label: Arc<str>,
    /// Local-time rendering of `device_timestamp` with millisecond precision.
    pub formatted_timestamp: String,
}

/// Column names of the output file, OpenBCI GUI compatible.
pub fn output_header() -> Vec<String> {
    let mut header = Vec::with_capacity(1 + PRIMARY_CHANNELS + AUXILIARY_CHANNELS + RESERVED_COLUMNS + 3);
    header.push("Sample Index".to_string());
    header.extend((0..PRIMARY_CHANNELS).map(|i| format!("EXG Channel {}", i)));
    header.extend((0..AUXILIARY_CHANNELS).map(|i| format!("Accel Channel {}", i)));
    header.extend((0..RESERVED_COLUMNS).map(|_| "Other".to_string()));
    header.push("Timestamp".to_string());
    header.push("Marker Channel".to_string());
    header.push("Timestamp (Formatted)".to_string());
    header
}

/// One reading of the rate monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateReport {
    /// Total samples recorded so far.
    pub samples: u64,
    /// Rate over the last interval, Hz.
    pub instantaneous_hz: f64,
    /// Mean of the readings in the window, Hz.
    pub average_hz: f64,
    /// Seconds since the recording start reference.
    pub recording_secs: f64,
}

/// Final statistics of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_samples: u64,
    pub average_rate_hz: Option<f64>,
    /// Where the samples were written.
    pub output: String,
    /// Data source the samples came from (`cyton-daisy`, `synthetic`, ...).
    #[serde(default)]
    pub device: String,
    /// Seconds between the start reference and shutdown; zero if streaming never began.
    pub duration_secs: f64,
    /// Player that showed the stimulus video, if any.
    pub player: Option<String>,
}

/// Observational events for console rendering. Nothing in the pipeline consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Seconds left before recording starts.
    Countdown { remaining_secs: u64 },
    /// A candidate player could not be started.
    PlayerFailed { player: String, error: String },
    /// The stimulus video is playing.
    PlaybackStarted { player: String },
    /// No candidate player could be started; recording continues without video.
    PlaybackUnavailable,
    /// Samples are flowing.
    StreamingStarted { output: String },
    /// A marker became active.
    Marker { elapsed_secs: f64, label: String },
    /// The active marker was cleared.
    MarkerCleared { elapsed_secs: f64 },
    Rate(RateReport),
    /// Shutdown completed.
    Finished(SessionSummary),
}

/// Sends an event without blocking. A full or disconnected channel drops it.
pub(crate) fn publish(tx: Option<&Sender<SessionEvent>>, event: SessionEvent) {
    if let Some(tx) = tx {
        tx.try_send(event).ok();
    }
}
