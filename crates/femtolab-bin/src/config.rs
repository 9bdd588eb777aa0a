//! Lab configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. The TOML file given on the command line (default `femtolab.toml`)
//! 3. Environment variables prefixed with `FEMTOLAB_`, nested with `__`
//!    (e.g. `FEMTOLAB_SHOOTER__PORT=/dev/ttyUSB3`)
//!
//! Instrument sections are optional. A missing section only matters when a
//! subcommand needs that instrument.

use femtolab_core::{LabError, LabResult};
use femtolab_driver_scope::ScopeConfig;
use femtolab_driver_shooter::ShooterConfig;
use femtolab_driver_stepper::StepperConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "femtolab.toml";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabConfig {
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Laser shooter
    pub shooter: Option<ShooterConfig>,
    /// Delay stage
    pub stepper: Option<StepperConfig>,
    /// Oscilloscope
    pub scope: Option<ScopeConfig>,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Directory receiving `log_<timestamp>.log`
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Mirror log output to stdout
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_console() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: default_directory(),
            console: default_console(),
        }
    }
}

impl LabConfig {
    /// Load configuration from `path` and `FEMTOLAB_` environment variables.
    ///
    /// A missing file is not an error; defaults and the environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(LabConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FEMTOLAB_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> LabResult<()> {
        let level = self.logging.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(LabError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            )));
        }

        if let Some(shooter) = &self.shooter {
            shooter
                .validate()
                .map_err(|e| LabError::Configuration(format!("[shooter] {}", e)))?;
        }
        if let Some(stepper) = &self.stepper {
            stepper
                .validate()
                .map_err(|e| LabError::Configuration(format!("[stepper] {}", e)))?;
        }
        if let Some(scope) = &self.scope {
            scope
                .validate()
                .map_err(|e| LabError::Configuration(format!("[scope] {}", e)))?;
        }

        Ok(())
    }

    /// Shooter section, or an error naming the missing section.
    pub fn shooter(&self) -> LabResult<&ShooterConfig> {
        self.shooter.as_ref().ok_or_else(|| missing("shooter"))
    }

    /// Stepper section, or an error naming the missing section.
    pub fn stepper(&self) -> LabResult<&StepperConfig> {
        self.stepper.as_ref().ok_or_else(|| missing("stepper"))
    }

    /// Scope section, or an error naming the missing section.
    pub fn scope(&self) -> LabResult<&ScopeConfig> {
        self.scope.as_ref().ok_or_else(|| missing("scope"))
    }
}

fn missing(section: &str) -> LabError {
    LabError::Configuration(format!(
        "no [{section}] section in the configuration; add one with at least `port = ...`"
    ))
}
