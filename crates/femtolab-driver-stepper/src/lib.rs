//! Stepper-motor delay stage driver for femtolab.
//!
//! The stage controller speaks a terse ASCII protocol: a letter, optionally
//! followed by a decimal argument (`m1000`, `?p`). Every command is answered
//! with one or more lines, the last of which contains `#`.
//!
//! The driver has a single owner and no background activity, so methods take
//! `&mut self` and the port is not shared.
//!
//! ```rust,ignore
//! use femtolab_driver_stepper::StepperDriver;
//!
//! let mut stage = StepperDriver::open("COM27", 115200).await?;
//! stage.enable().await?;
//! stage.move_steps(1000).await?;
//! println!("position: {}", stage.position().await?);
//! stage.disable().await?;
//! stage.close().await?;
//! ```

mod error;
mod stepper;

pub use error::{Result, StepperError};
pub use stepper::{StepperConfig, StepperDriver, MAX_LIMIT_SWITCH_BITS};
