//! Error types for eegsync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EegSyncError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Marker file {path}: {message}")]
    MarkerFile { path: String, message: String },

    // Acquisition device errors
    #[error("Acquisition device error: {message}")]
    Device { message: String },

    // Playback errors
    #[error("Video file not found at {path}")]
    VideoNotFound { path: String },

    #[error("Failed to launch video player: {message}")]
    PlaybackLaunch { message: String },

    // Persistence errors
    #[error("Failed to write recording: {message}")]
    Persistence { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl EegSyncError {
    /// Shorthand for a device failure.
    pub fn device(message: impl Into<String>) -> Self {
        EegSyncError::Device {
            message: message.into(),
        }
    }

    /// Shorthand for a persistence failure.
    pub fn persistence(message: impl Into<String>) -> Self {
        EegSyncError::Persistence {
            message: message.into(),
        }
    }

    /// Whether this error must end the running session.
    ///
    /// Marker and playback problems degrade the session instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EegSyncError::MarkerFile { .. } | EegSyncError::PlaybackLaunch { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, EegSyncError>;
