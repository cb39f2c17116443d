use crate::defaults;
use crate::error::{EegSyncError, Result};
use crate::pipeline::RecorderConfig;
use crate::playback::PlayerCandidate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub recording: RecordingConfig,
    pub device: DeviceConfig,
    pub markers: MarkersConfig,
    pub playback: PlaybackConfig,
    pub monitor: MonitorConfig,
}

/// Output and session timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory for generated output files.
    pub output_dir: PathBuf,
    /// Subject identifier prefixed to generated file names.
    pub subject: Option<String>,
    pub countdown_secs: u64,
    /// Idle wait between streaming loop iterations.
    pub poll_interval_us: u64,
}

/// Acquisition device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    /// Serial port of the board's USB dongle.
    pub serial_port: String,
    /// Sample rate of the synthetic board, Hz. The Cyton streams at its own rate.
    pub sample_rate: u32,
}

/// Where samples come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// OpenBCI Cyton with Daisy module over a serial port.
    #[default]
    CytonDaisy,
    /// Generated signal, no hardware.
    Synthetic,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::CytonDaisy => "cyton-daisy",
            DeviceKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cyton-daisy" | "cyton" => Ok(DeviceKind::CytonDaisy),
            "synthetic" => Ok(DeviceKind::Synthetic),
            other => Err(format!(
                "unknown device '{}' (expected cyton-daisy or synthetic)",
                other
            )),
        }
    }
}

/// Marker schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkersConfig {
    pub path: PathBuf,
    pub poll_interval_ms: u64,
    pub clear_after_ms: u64,
}

/// Stimulus video configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub video: Option<PathBuf>,
    pub terminate_timeout_secs: u64,
    /// Players tried in order.
    pub players: Vec<PlayerCandidate>,
}

/// Rate monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    pub window: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            subject: None,
            countdown_secs: defaults::COUNTDOWN_SECS,
            poll_interval_us: defaults::STREAM_POLL_INTERVAL_US,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::default(),
            serial_port: defaults::SERIAL_PORT.to_string(),
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::MARKER_FILE),
            poll_interval_ms: defaults::MARKER_POLL_INTERVAL_MS,
            clear_after_ms: defaults::MARKER_CLEAR_AFTER_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            video: None,
            terminate_timeout_secs: defaults::PLAYER_TERMINATE_TIMEOUT_SECS,
            players: PlayerCandidate::defaults(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::MONITOR_INTERVAL_MS,
            window: defaults::MONITOR_WINDOW,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - EEGSYNC_VIDEO → playback.video
    /// - EEGSYNC_MARKERS → markers.path
    /// - EEGSYNC_OUTPUT_DIR → recording.output_dir
    /// - EEGSYNC_SUBJECT → recording.subject
    /// - EEGSYNC_SERIAL_PORT → device.serial_port
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(video) = std::env::var("EEGSYNC_VIDEO")
            && !video.is_empty()
        {
            self.playback.video = Some(PathBuf::from(video));
        }

        if let Ok(markers) = std::env::var("EEGSYNC_MARKERS")
            && !markers.is_empty()
        {
            self.markers.path = PathBuf::from(markers);
        }

        if let Ok(dir) = std::env::var("EEGSYNC_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.recording.output_dir = PathBuf::from(dir);
        }

        if let Ok(subject) = std::env::var("EEGSYNC_SUBJECT")
            && !subject.is_empty()
        {
            self.recording.subject = Some(subject);
        }

        if let Ok(port) = std::env::var("EEGSYNC_SERIAL_PORT")
            && !port.is_empty()
        {
            self.device.serial_port = port;
        }

        self
    }

    /// Rejects values that would stall or spin the pipeline.
    pub fn validate(&self) -> Result<()> {
        fn positive(key: &str, value: u64) -> Result<()> {
            if value == 0 {
                return Err(EegSyncError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            Ok(())
        }

        positive("recording.poll_interval_us", self.recording.poll_interval_us)?;
        positive("device.sample_rate", u64::from(self.device.sample_rate))?;
        positive("markers.poll_interval_ms", self.markers.poll_interval_ms)?;
        positive("markers.clear_after_ms", self.markers.clear_after_ms)?;
        positive("monitor.interval_ms", self.monitor.interval_ms)?;
        positive("monitor.window", self.monitor.window as u64)?;

        if self.device.kind == DeviceKind::CytonDaisy && self.device.serial_port.trim().is_empty() {
            return Err(EegSyncError::ConfigInvalidValue {
                key: "device.serial_port".to_string(),
                message: "required for the cyton-daisy device".to_string(),
            });
        }

        if self.playback.players.is_empty() {
            return Err(EegSyncError::ConfigInvalidValue {
                key: "playback.players".to_string(),
                message: "at least one player is required".to_string(),
            });
        }
        if let Some(player) = self.playback.players.iter().find(|p| p.program.trim().is_empty()) {
            return Err(EegSyncError::ConfigInvalidValue {
                key: "playback.players".to_string(),
                message: format!("player '{}' has no program", player.name),
            });
        }

        Ok(())
    }

    /// Pipeline settings derived from this configuration.
    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            countdown: Duration::from_secs(self.recording.countdown_secs),
            stream_poll_interval: Duration::from_micros(self.recording.poll_interval_us),
            marker_poll_interval: Duration::from_millis(self.markers.poll_interval_ms),
            marker_clear_after: Duration::from_millis(self.markers.clear_after_ms),
            monitor_interval: Duration::from_millis(self.monitor.interval_ms),
            monitor_window: self.monitor.window,
            video: self.playback.video.clone(),
            players: self.playback.players.clone(),
            player_terminate_timeout: Duration::from_secs(self.playback.terminate_timeout_secs),
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/eegsync/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("eegsync")
            .join("config.toml")
    }
}
