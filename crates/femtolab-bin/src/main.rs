//! CLI entry point for femtolab
//!
//! Drives one instrument per invocation over its serial link:
//! - `shooter`: laser shooter status, batch firing, counter reset
//! - `stepper`: delay stage moves and position readout
//! - `scope`: oscilloscope identity and measurements
//!
//! # Usage
//!
//! ```bash
//! femtolab shooter fire --count 5 --period-us 2000
//! femtolab --config lab.toml stepper move -- -400
//! femtolab scope measure --channel 2
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{LabConfig, DEFAULT_CONFIG_FILE};
use femtolab_driver_scope::ScopeDriver;
use femtolab_driver_shooter::ShooterDriver;
use femtolab_driver_stepper::StepperDriver;
use logging::{parse_log_level, TracingConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "femtolab")]
#[command(about = "Serial control of the laser shooter, delay stage and oscilloscope", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log to the file only
    #[arg(long, global = true)]
    no_console: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Laser shooter
    #[command(subcommand)]
    Shooter(ShooterCommands),

    /// Stepper-motor delay stage
    #[command(subcommand)]
    Stepper(StepperCommands),

    /// Oscilloscope
    #[command(subcommand)]
    Scope(ScopeCommands),
}

#[derive(Subcommand)]
enum ShooterCommands {
    /// Print the cached state and a fresh shot count
    Status,

    /// Fire one batch in single-shot mode
    Fire {
        /// Shots in the batch
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Period between shots in microseconds
        #[arg(long)]
        period_us: Option<u32>,
    },

    /// Reset the device shot counter
    Reset,
}

#[derive(Subcommand)]
enum StepperCommands {
    /// Enable, configure motion, move 1000 steps, print position, disable
    Demo,

    /// Print the current position
    Position,

    /// Move by a relative number of steps
    Move {
        /// Steps, negative to move backwards
        #[arg(allow_hyphen_values = true)]
        steps: i64,
    },

    /// Go to an absolute position
    Goto {
        /// Target position in steps
        #[arg(allow_hyphen_values = true)]
        position: i64,
    },
}

#[derive(Subcommand)]
enum ScopeCommands {
    /// Print the instrument identity
    Idn,

    /// Print peak-to-peak voltage and frequency of a channel
    Measure {
        /// Channel number (1-4)
        #[arg(long, default_value_t = 1)]
        channel: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LabConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    config.validate()?;

    let mut tracing_config =
        TracingConfig::from_logging_config(&config.logging).map_err(anyhow::Error::msg)?;
    if let Some(level) = &cli.log_level {
        tracing_config = tracing_config.with_level(parse_log_level(level).map_err(anyhow::Error::msg)?);
    }
    if cli.no_console {
        tracing_config = tracing_config.with_console(false);
    }
    let _guard = logging::init(tracing_config)?;

    match cli.command {
        Commands::Shooter(cmd) => run_shooter(cmd, &config).await,
        Commands::Stepper(cmd) => run_stepper(cmd, &config).await,
        Commands::Scope(cmd) => run_scope(cmd, &config).await,
    }
}

async fn run_shooter(cmd: ShooterCommands, config: &LabConfig) -> Result<()> {
    let shooter = ShooterDriver::from_config(config.shooter()?).await?;

    let outcome = shooter_command(&shooter, cmd).await;
    let closed = shooter.close().await;
    outcome?;
    closed?;
    Ok(())
}

async fn shooter_command(shooter: &ShooterDriver, cmd: ShooterCommands) -> Result<()> {
    match cmd {
        ShooterCommands::Status => {
            let count = shooter.get_shots_count().await?;
            let state = shooter.snapshot();
            println!("port:            {}", shooter.port_name());
            println!("shots:           {}", count);
            println!("mode:            {}", state.mode);
            println!("external source: {}", state.external_source);
            println!("period:          {} us", state.period_us);
            println!("batch:           {}", state.batch_count);
            println!("enabled:         {}", state.enabled);
        }
        ShooterCommands::Fire { count, period_us } => {
            shooter.set_mode_single().await?;
            shooter.set_batch_count(count)?;
            if let Some(period_us) = period_us {
                shooter.set_period(period_us).await?;
            }

            shooter.set_enabled(true).await?;
            let fired = shooter.shoot().await;
            shooter.set_enabled(false).await?;
            fired?;

            println!("shots: {}", shooter.get_shots_count().await?);
        }
        ShooterCommands::Reset => {
            shooter.reset_shots_count().await?;
            println!("shot counter reset");
        }
    }
    Ok(())
}

async fn run_stepper(cmd: StepperCommands, config: &LabConfig) -> Result<()> {
    let mut stepper = StepperDriver::from_config(config.stepper()?).await?;

    let outcome = stepper_command(&mut stepper, cmd).await;
    let closed = stepper.close().await;
    outcome?;
    closed?;
    Ok(())
}

async fn stepper_command(stepper: &mut StepperDriver, cmd: StepperCommands) -> Result<()> {
    match cmd {
        StepperCommands::Demo => {
            stepper.enable().await?;
            stepper.set_acceleration(6400).await?;
            stepper.set_max_speed(3200).await?;
            stepper.move_steps(1000).await?;
            println!("position: {}", stepper.position().await?);
            stepper.disable().await?;
        }
        StepperCommands::Position => {
            println!("position: {}", stepper.position().await?);
        }
        StepperCommands::Move { steps } => {
            stepper.move_steps(steps).await?;
            println!("position: {}", stepper.position().await?);
        }
        StepperCommands::Goto { position } => {
            stepper.go_to(position).await?;
            println!("position: {}", stepper.position().await?);
        }
    }
    Ok(())
}

async fn run_scope(cmd: ScopeCommands, config: &LabConfig) -> Result<()> {
    let mut scope = ScopeDriver::from_config(config.scope()?).await?;

    let outcome = scope_command(&mut scope, cmd).await;
    let closed = scope.close().await;
    outcome?;
    closed?;
    Ok(())
}

async fn scope_command(scope: &mut ScopeDriver, cmd: ScopeCommands) -> Result<()> {
    match cmd {
        ScopeCommands::Idn => {
            println!("{}", scope.identify().await?);
        }
        ScopeCommands::Measure { channel } => {
            let vpp = scope.measure_vpp(channel).await?;
            let frequency = scope.measure_frequency(channel).await?;
            println!("CH{} Vpp:       {} V", channel, vpp);
            println!("CH{} frequency: {} Hz", channel, frequency);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fire_with_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "femtolab",
            "shooter",
            "fire",
            "--count",
            "3",
            "--period-us",
            "2000",
            "--no-console",
        ])
        .unwrap();

        assert!(cli.no_console);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        match cli.command {
            Commands::Shooter(ShooterCommands::Fire { count, period_us }) => {
                assert_eq!(count, 3);
                assert_eq!(period_us, Some(2000));
            }
            _ => panic!("expected shooter fire"),
        }
    }

    #[test]
    fn test_parse_negative_move() {
        let cli = Cli::try_parse_from(["femtolab", "stepper", "move", "-400"]).unwrap();
        match cli.command {
            Commands::Stepper(StepperCommands::Move { steps }) => assert_eq!(steps, -400),
            _ => panic!("expected stepper move"),
        }
    }

    #[test]
    fn test_scope_channel_defaults_to_one() {
        let cli = Cli::try_parse_from(["femtolab", "--log-level", "debug", "scope", "measure"])
            .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Scope(ScopeCommands::Measure { channel }) => assert_eq!(channel, 1),
            _ => panic!("expected scope measure"),
        }
    }
}
