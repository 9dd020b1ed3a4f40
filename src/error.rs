//! Error types for the LED controller

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio packet decoding errors
///
/// These never leave the receive loop; they are counted and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Packet too short: {actual} bytes, need {expected}")]
    TooShort { expected: usize, actual: usize },

    #[error("Packet too large: {0} bytes")]
    TooLarge(usize),

    #[error("Bad magic prefix")]
    BadMagic,

    #[error("Unrecognized packet format")]
    Unrecognized,
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Configuration load/validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Playlist must contain at least one effect")]
    EmptyPlaylist,

    #[error("Playlist effects not in supported_effects: {0:?}")]
    NotSupported(Vec<String>),

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("rotation_period must be >= 1.0 (got {0})")]
    RotationPeriod(f64),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("No valid configuration keys provided: {0}")]
    UnknownKeys(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Failed to persist config: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playback state machine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Effect not supported: {0}")]
    NotSupported(String),

    #[error("Effect not in playlist: {0}")]
    NotInPlaylist(String),

    #[error("Cannot remove last effect from playlist")]
    LastEffect,
}

/// Output sink errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Frame length {actual} does not match strip length {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Device write failed: {0}")]
    WriteFailed(String),

    #[error("Sink failed after {0} attempts")]
    RetriesExhausted(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
