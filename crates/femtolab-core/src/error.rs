//! Application-level error type.
//!
//! `LabError` is what the binary and any code juggling more than one
//! instrument sees. Each driver crate keeps its own precise `thiserror` enum
//! (so callers can match on e.g. a rejected period) and converts into
//! `LabError::Driver` with the matching [`DriverErrorKind`].
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: semantic errors in configuration values that parsed
//!   correctly but are logically invalid (period out of range, zero timeout).
//! - **`Io`**: wraps `std::io::Error` from file or serial I/O.
//! - **`Driver`**: structured driver errors carrying the driver type and kind.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device could not be opened or did not become ready.
    Initialization,
    /// Configuration rejected before touching the device.
    Configuration,
    /// Write or read on the transport failed.
    Communication,
    /// Device answered with something that could not be interpreted.
    Protocol,
    /// Operation refused by a local safety interlock.
    Interlock,
    /// A read did not complete in time.
    Timeout,
    /// Argument outside the range the device accepts.
    InvalidParameter,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Protocol => "protocol",
            DriverErrorKind::Interlock => "interlock",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Structured driver error with category.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Short driver identifier, e.g. `"shooter"`.
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Build a driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }

    /// Map an I/O error onto the driver error kinds.
    pub fn from_io(driver_type: impl Into<String>, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::TimedOut => DriverErrorKind::Timeout,
            _ => DriverErrorKind::Communication,
        };
        Self::new(driver_type, kind, err.to_string())
    }
}

/// Convenience alias for results using the application error type.
pub type LabResult<T> = std::result::Result<T, LabError>;

/// Primary error type for femtolab.
#[derive(Error, Debug)]
pub enum LabError {
    /// Configuration validation failed.
    ///
    /// **Recovery Strategy**: Abort startup, display validation error message.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structured driver error with category
    #[error("{0}")]
    Driver(DriverError),
}

impl From<DriverError> for LabError {
    fn from(err: DriverError) -> Self {
        LabError::Driver(err)
    }
}

impl LabError {
    /// Driver error kind, if this is a structured driver error.
    pub fn driver_kind(&self) -> Option<DriverErrorKind> {
        match self {
            LabError::Driver(err) => Some(err.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LabError::Configuration("period_us must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: period_us must be positive"
        );
        assert_eq!(err.driver_kind(), None);
    }

    #[test]
    fn test_driver_error_display() {
        let err = LabError::Driver(DriverError::new(
            "shooter",
            DriverErrorKind::Initialization,
            "device not ready",
        ));
        assert!(err
            .to_string()
            .contains("Driver 'shooter' initialization error"));
        assert_eq!(err.driver_kind(), Some(DriverErrorKind::Initialization));
    }

    #[test]
    fn test_timeout_io_maps_to_timeout_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply");
        assert_eq!(
            DriverError::from_io("stepper", &io).kind,
            DriverErrorKind::Timeout
        );

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(
            DriverError::from_io("stepper", &io).kind,
            DriverErrorKind::Communication
        );
    }
}
