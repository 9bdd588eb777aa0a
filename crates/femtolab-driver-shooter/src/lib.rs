//! Pulsed-laser shooter controller for femtolab.
//!
//! The shooter is a small pulse generator driven over a serial link with
//! one- or two-letter ASCII commands (`S`, `MM`, `P1500`, `C?`). Only the
//! shot-count query produces a reply.
//!
//! [`ShooterDriver`] owns the link for its whole lifetime:
//!
//! 1. the port is opened and a readiness handshake waits for the device to
//!    report a zeroed counter ([`HandshakeState`]);
//! 2. a background task refreshes the cached shot counter every 200 ms;
//! 3. every command goes through one async mutex, so the poller and the
//!    caller never interleave bytes on the wire;
//! 4. [`ShooterDriver::close`] stops the poller, waits for it, then shuts the
//!    port down.
//!
//! # Usage
//!
//! ```rust,ignore
//! use femtolab_driver_shooter::{ShooterConfig, ShooterDriver};
//!
//! let shooter = ShooterDriver::from_config(&ShooterConfig::new("/dev/ttyUSB0")).await?;
//! shooter.set_mode_single().await?;
//! shooter.set_batch_count(5)?;
//! shooter.set_enabled(true).await?;
//! shooter.shoot().await?;
//! shooter.set_enabled(false).await?;
//! println!("shots: {}", shooter.get_shots_count().await?);
//! shooter.close().await?;
//! ```

mod error;
mod handshake;
mod poller;
pub mod protocol;
mod shooter;
mod state;

pub use error::{Result, ShooterError};
pub use handshake::{HandshakeSettings, HandshakeState};
pub use protocol::Command;
pub use shooter::{ShooterConfig, ShooterDriver};
pub use state::{
    ExternalSource, FiringMode, ShooterState, DEFAULT_BATCH_COUNT, DEFAULT_PERIOD_US,
    MAX_PERIOD_US, MIN_PERIOD_US,
};

/// `tracing` target used by every event this crate emits.
pub(crate) const LOG_TARGET: &str = "femtolab::shooter";
