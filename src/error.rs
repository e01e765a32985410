//! Error types for the rhythm game core.

use thiserror::Error;

/// Main error type for the game core
#[derive(Error, Debug)]
pub enum GameError {
    /// Non-positive or non-finite tempo handed to the timeline generator
    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    /// Negative or non-finite session duration
    #[error("Invalid duration: {0}s")]
    InvalidDuration(f64),

    /// Audio input or output device unavailable
    #[error("Audio device error: {0}")]
    Device(String),

    /// No ambient samples were collected while calibrating
    #[error("Calibration failed: no ambient samples collected")]
    CalibrationFailed,

    /// Tempo selection could not map a tempo back to a catalog track
    #[error("No track in catalog with tempo {0} BPM")]
    TrackNotFound(f64),

    /// Track could not be loaded for playback
    #[error("Playback error: {0}")]
    Playback(String),

    /// Command not valid in the current session phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration rejected during validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV decoding errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// JSON deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type using [`GameError`]
pub type Result<T> = std::result::Result<T, GameError>;
