//! Error types for stepper operations.

use femtolab_core::error::{DriverError, DriverErrorKind, LabError};
use thiserror::Error;

/// Result type alias for stepper operations.
pub type Result<T> = std::result::Result<T, StepperError>;

/// Errors that can occur when working with the delay stage.
#[derive(Error, Debug)]
pub enum StepperError {
    /// Serial port could not be opened
    #[error("Failed to open stepper port '{port}': {message}")]
    TransportOpen { port: String, message: String },

    /// Write or read failed, including a reply that never reached its `#` line
    #[error("Stepper I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply did not start with an integer
    #[error("Failed to parse integer from stepper reply {response:?}: {source}")]
    Parse {
        response: String,
        source: std::num::ParseIntError,
    },

    /// Argument the controller would not accept; nothing was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<StepperError> for LabError {
    fn from(err: StepperError) -> Self {
        let kind = match &err {
            StepperError::Io(io) => return DriverError::from_io("stepper", io).into(),
            StepperError::TransportOpen { .. } => DriverErrorKind::Initialization,
            StepperError::Parse { .. } => DriverErrorKind::Protocol,
            StepperError::InvalidArgument(_) => DriverErrorKind::InvalidParameter,
        };
        LabError::Driver(DriverError::new("stepper", kind, err.to_string()))
    }
}
