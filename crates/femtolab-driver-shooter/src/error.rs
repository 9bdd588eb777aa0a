//! Error types for shooter operations.

use femtolab_core::error::{DriverError, DriverErrorKind, LabError};
use thiserror::Error;

/// Result type alias for shooter operations.
pub type Result<T> = std::result::Result<T, ShooterError>;

/// Errors that can occur when working with the shooter.
#[derive(Error, Debug)]
pub enum ShooterError {
    /// Serial port could not be opened
    #[error("Failed to open shooter port '{port}': {message}")]
    TransportOpen { port: String, message: String },

    /// Write or read on the link failed; read timeouts carry `ErrorKind::TimedOut`
    #[error("Shooter I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Handshake ran out of attempts without seeing a zeroed counter
    #[error("Shooter on '{port}' is not ready; last line read: {last_line:?}")]
    DeviceNotReady { port: String, last_line: String },

    /// Shot-count reply was not a decimal integer
    #[error("Failed to parse shot count from {response:?}: {source}")]
    Parse {
        response: String,
        source: std::num::ParseIntError,
    },

    /// Argument outside the accepted range; nothing was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// `shoot` called while shooting is disallowed
    #[error("Shooting is disabled")]
    ShootingDisabled,
}

impl ShooterError {
    /// Check if this is a read timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::TimedOut)
    }
}

impl From<ShooterError> for LabError {
    fn from(err: ShooterError) -> Self {
        let kind = match &err {
            ShooterError::Io(io) => return DriverError::from_io("shooter", io).into(),
            ShooterError::TransportOpen { .. } | ShooterError::DeviceNotReady { .. } => {
                DriverErrorKind::Initialization
            }
            ShooterError::Parse { .. } => DriverErrorKind::Protocol,
            ShooterError::InvalidArgument(_) => DriverErrorKind::InvalidParameter,
            ShooterError::ShootingDisabled => DriverErrorKind::Interlock,
        };
        LabError::Driver(DriverError::new("shooter", kind, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShooterError::DeviceNotReady {
            port: "/dev/ttyUSB0".to_string(),
            last_line: "7\r".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Shooter on '/dev/ttyUSB0' is not ready; last line read: \"7\\r\""
        );
    }

    #[test]
    fn test_lab_error_kinds() {
        let lab: LabError = ShooterError::ShootingDisabled.into();
        assert_eq!(lab.driver_kind(), Some(DriverErrorKind::Interlock));

        let lab: LabError = ShooterError::InvalidArgument("period 0".into()).into();
        assert_eq!(lab.driver_kind(), Some(DriverErrorKind::InvalidParameter));

        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply");
        let err = ShooterError::from(timeout);
        assert!(err.is_timeout());
        let lab: LabError = err.into();
        assert_eq!(lab.driver_kind(), Some(DriverErrorKind::Timeout));
    }
}
