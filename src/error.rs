//! Error taxonomy shared by the three tools.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be loaded. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Malformed configuration: {0}")]
    Malformed(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Malformed(Box::new(e))
    }
}

/// A requested target name matches no configured source.
#[derive(Debug, Clone, Error)]
#[error("Unknown target '{name}'. Available: all, {}", available.join(", "))]
pub struct UnknownTargetError {
    pub name: String,
    pub available: Vec<String>,
}

/// Errors that abort a whole backup run before any transfer starts.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error(
        "Insufficient space at {}: {available_bytes} bytes free, {required_bytes} required",
        path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        available_bytes: u64,
        required_bytes: u64,
    },

    #[error("Failed to check free space at {}: {source}", path.display())]
    SpaceCheck {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
}

/// Hardware address failed validation.
#[derive(Debug, Clone, Error)]
#[error("Invalid device identifier \"{input}\". Expected six hex octets, e.g. AA:BB:CC:DD:EE:FF")]
pub struct IdentifierError {
    pub input: String,
}

/// Errors local to a single device action.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    InvalidIdentifierFormat(#[from] IdentifierError),

    #[error("Failed to connect to {identifier}: {reason}")]
    ConnectFailed { identifier: String, reason: String },

    #[error("Device {identifier} is still connected after disconnect")]
    DisconnectFailed { identifier: String },

    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("No capture device found")]
    NoCaptureDevice,

    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    #[error("Device state file {}: {reason}", path.display())]
    State { path: PathBuf, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error when parsing a recording duration string
#[derive(Debug, Clone, Error)]
#[error("Invalid duration \"{input}\". Expected seconds or <number>s, <number>m, <number>h (e.g. 90, 30s, 5m, 2h)")]
pub struct DurationParseError {
    pub input: String,
}

/// Error when a file is not a readable WAV recording
#[derive(Debug, Error)]
pub enum WavError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a WAV file: {0}")]
    Format(String),
}
