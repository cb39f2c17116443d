//! Default configuration constants for eegsync.
//!
//! Shared by the config file, the CLI and the pipeline so every layer agrees
//! on the same numbers.

/// Number of primary (EXG) channels in every output row.
///
/// Cyton + Daisy exposes 16; boards with fewer are zero-padded.
pub const PRIMARY_CHANNELS: usize = 16;

/// Number of auxiliary (accelerometer) channels in every output row.
pub const AUXILIARY_CHANNELS: usize = 3;

/// Number of reserved ("Other") numeric columns, always zero.
pub const RESERVED_COLUMNS: usize = 10;

/// Default synthetic board sample rate in Hz (Cyton + Daisy streams at 125 Hz).
pub const SAMPLE_RATE: u32 = 125;

/// Serial port of the OpenBCI USB dongle.
pub const SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Countdown before recording starts, in seconds.
///
/// Gives the participant time to settle before the cue video starts.
pub const COUNTDOWN_SECS: u64 = 15;

/// Idle wait between streaming loop iterations, in microseconds.
pub const STREAM_POLL_INTERVAL_US: u64 = 1000;

/// Marker scheduler polling interval in milliseconds.
pub const MARKER_POLL_INTERVAL_MS: u64 = 10;

/// How long a marker label stays active before it is cleared, in milliseconds.
pub const MARKER_CLEAR_AFTER_MS: u64 = 100;

/// Default marker schedule file.
pub const MARKER_FILE: &str = "marker.csv";

/// Rate monitor reporting interval in milliseconds.
pub const MONITOR_INTERVAL_MS: u64 = 1000;

/// Number of instantaneous rate readings kept for the moving average.
pub const MONITOR_WINDOW: usize = 10;

/// Grace period between SIGTERM and SIGKILL for the video player, in seconds.
pub const PLAYER_TERMINATE_TIMEOUT_SECS: u64 = 5;

/// Placeholder replaced with the video path in player arguments.
pub const VIDEO_PLACEHOLDER: &str = "{video}";

/// Base name of generated output files.
pub const OUTPUT_STEM: &str = "eeg_data";

/// Capacity of the observational event channel.
pub const EVENT_BUFFER: usize = 256;
