//! Error types for oscilloscope operations.

use femtolab_core::error::{DriverError, DriverErrorKind, LabError};
use thiserror::Error;

/// Result type alias for oscilloscope operations.
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Errors that can occur when working with the oscilloscope.
#[derive(Error, Debug)]
pub enum ScopeError {
    /// Serial port could not be opened
    #[error("Failed to open scope port '{port}': {message}")]
    TransportOpen { port: String, message: String },

    /// Write or read failed; read timeouts carry `ErrorKind::TimedOut`
    #[error("Scope I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Measurement reply was not a number
    #[error("Failed to parse number from reply {response:?} to '{query}': {source}")]
    Parse {
        query: String,
        response: String,
        source: std::num::ParseFloatError,
    },

    /// Channel outside 1..=4 or similar; nothing was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<ScopeError> for LabError {
    fn from(err: ScopeError) -> Self {
        let kind = match &err {
            ScopeError::Io(io) => return DriverError::from_io("scope", io).into(),
            ScopeError::TransportOpen { .. } => DriverErrorKind::Initialization,
            ScopeError::Parse { .. } => DriverErrorKind::Protocol,
            ScopeError::InvalidArgument(_) => DriverErrorKind::InvalidParameter,
        };
        LabError::Driver(DriverError::new("scope", kind, err.to_string()))
    }
}
