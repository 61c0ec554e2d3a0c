//! Error types for sensorhub.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::channel::ControlOp;

/// Result type for sensorhub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sensorhub operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (firmware image, descriptor files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The sensor hub device node could not be opened.
    #[error("Unable to open sensor hub device {}: {source}", path.display())]
    DeviceOpen {
        /// Device node path.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// A control operation on the device channel failed.
    #[error("{op} failed: {source}")]
    Channel {
        /// Operation that failed.
        op: ControlOp,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Malformed or out-of-range user input, detected before any device access.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A firmware image or version descriptor is not available.
    #[error("Missing {}: {source}", path.display())]
    MissingResource {
        /// File that could not be opened.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Every firmware download attempt failed.
    #[error("Firmware download failed after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: usize,
        /// Error of the final attempt.
        last: Box<Error>,
    },

    /// Unknown mode word or unusable argument list.
    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a channel error from the last OS error.
    pub fn last_os(op: ControlOp) -> Self {
        Self::Channel {
            op,
            source: io::Error::last_os_error(),
        }
    }

    /// Whether the error was raised by input validation (no device access happened).
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidInvocation(_))
    }
}
