//! Local mirror of the shooter's device-side configuration.

use crate::error::{Result, ShooterError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest period the device accepts, in microseconds.
pub const MIN_PERIOD_US: u32 = 1;
/// Longest period the device accepts, in microseconds.
pub const MAX_PERIOD_US: u32 = 1_000_000;
/// Period assumed after power-up, in microseconds.
pub const DEFAULT_PERIOD_US: u32 = 1000;
/// Shots issued per `shoot` call unless configured otherwise.
pub const DEFAULT_BATCH_COUNT: u32 = 1;

/// Firing mode of the shooter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringMode {
    /// Free-running at the configured period.
    Frequency,
    /// Triggered by an external input.
    ExternalSync,
    /// One pulse per `S` command.
    #[default]
    SingleShot,
}

/// External trigger input, used in [`FiringMode::ExternalSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalSource {
    /// Input 1.
    #[default]
    In1,
    /// Input 2.
    In2,
}

impl std::fmt::Display for FiringMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frequency => write!(f, "frequency"),
            Self::ExternalSync => write!(f, "external sync"),
            Self::SingleShot => write!(f, "single shot"),
        }
    }
}

impl std::fmt::Display for ExternalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In1 => write!(f, "IN1"),
            Self::In2 => write!(f, "IN2"),
        }
    }
}

/// Point-in-time copy of everything the driver knows about the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShooterState {
    /// Last shot count read from the device.
    pub shots_count: i64,
    /// Whether shooting is allowed.
    pub enabled: bool,
    /// Shots issued per `shoot` call.
    pub batch_count: u32,
    /// Period between shots in microseconds.
    pub period_us: u32,
    /// Current firing mode.
    pub mode: FiringMode,
    /// External trigger input.
    pub external_source: ExternalSource,
    /// Whether verbose device output is on.
    pub verbose: bool,
}

impl Default for ShooterState {
    fn default() -> Self {
        Self {
            shots_count: 0,
            enabled: false,
            batch_count: DEFAULT_BATCH_COUNT,
            period_us: DEFAULT_PERIOD_US,
            mode: FiringMode::default(),
            external_source: ExternalSource::default(),
            verbose: false,
        }
    }
}

/// Fields only written while the port is locked.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub period_us: u32,
    pub batch_count: u32,
    pub mode: FiringMode,
    pub external_source: ExternalSource,
    pub verbose: bool,
}

impl Settings {
    pub fn new(period_us: u32, batch_count: u32) -> Self {
        Self {
            period_us,
            batch_count,
            mode: FiringMode::default(),
            external_source: ExternalSource::default(),
            verbose: false,
        }
    }
}

/// Reject periods outside `[MIN_PERIOD_US, MAX_PERIOD_US]`.
pub(crate) fn check_period(period_us: u32) -> Result<()> {
    if !(MIN_PERIOD_US..=MAX_PERIOD_US).contains(&period_us) {
        return Err(ShooterError::InvalidArgument(format!(
            "period {} us out of range ({}-{} us)",
            period_us, MIN_PERIOD_US, MAX_PERIOD_US
        )));
    }
    Ok(())
}

/// Reject an empty batch.
pub(crate) fn check_batch_count(batch_count: u32) -> Result<()> {
    if batch_count == 0 {
        return Err(ShooterError::InvalidArgument(
            "batch count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Pause between two shots of a batch: the period truncated to whole milliseconds.
pub(crate) fn shot_spacing(period_us: u32) -> Duration {
    Duration::from_millis(u64::from(period_us / 1000))
}
