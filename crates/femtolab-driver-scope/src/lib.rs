//! SCPI oscilloscope driver for femtolab.
//!
//! The scope is reached over a serial link with SCPI commands terminated by
//! `\n`. Queries are answered with one `\n`-terminated line; waveform data
//! can also be read as raw bytes with [`ScopeDriver::read_bytes`].

mod error;
mod scope;

pub use error::{Result, ScopeError};
pub use scope::{ScopeConfig, ScopeDriver, CHANNELS};
