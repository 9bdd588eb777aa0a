//! Core types shared by the femtolab instrument drivers.
//!
//! - [`serial`]: the duplex byte-stream transport every driver talks through
//! - [`error`]: the application-level error type drivers convert into
//! - [`mock_serial`]: a scripted serial port for exercising drivers in tests

pub mod error;
pub mod mock_serial;
pub mod serial;

pub use error::{DriverError, DriverErrorKind, LabError, LabResult};
