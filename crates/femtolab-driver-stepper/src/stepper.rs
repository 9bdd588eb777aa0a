//! Stepper-motor delay stage driver
//!
//! Protocol Overview:
//! - Format: ASCII, commands written without terminator
//! - Baud: 115200, 8N1, no flow control
//! - Commands: `{letter}{value}`, queries start with `?`
//! - Replies: one or more `\n`-terminated lines, the last containing `#`
//!
//! | Operation | Bytes |
//! |---|---|
//! | firmware info | `?f` |
//! | power on / off | `e` / `d` |
//! | relative move | `m<steps>` |
//! | restore position counter | `r<position>` |
//! | absolute move | `p<position>` |
//! | query position | `?p` |
//! | max speed set / query | `s<speed>` / `?s` |
//! | acceleration set / query | `a<accel>` / `?a` |
//! | limit switch enable bits | `t<0..=3>` |
//! | limit switch active level | `i0` / `i1` |
//! | limit switch pin swap | `w0` / `w1` |
//! | limit switch calibration position | `?l` |

use crate::error::{Result, StepperError};
use femtolab_core::serial::{open_serial_async, read_line_timeout, DynSerial};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::instrument;

const LOG_TARGET: &str = "femtolab::stepper";

/// Highest value accepted by `t<bits>`: one bit per limit switch.
pub const MAX_LIMIT_SWITCH_BITS: u8 = 3;

/// Marker closing every reply.
const END_OF_REPLY: char = '#';

/// Configuration for the stepper driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepperConfig {
    /// Serial port path (e.g., "COM27", "/dev/ttyACM0")
    pub port: String,
    /// Link speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Deadline for each reply line
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_read_timeout_ms() -> u64 {
    500
}

impl StepperConfig {
    /// Defaults for everything but the port.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }

    /// Reject an empty port, zero baud rate or zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(StepperError::InvalidArgument(
                "stepper port must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 || self.read_timeout_ms == 0 {
            return Err(StepperError::InvalidArgument(
                "baud_rate and read_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Driver for the stepper-motor delay stage.
pub struct StepperDriver {
    port: BufReader<DynSerial>,
    port_name: String,
    read_timeout: Duration,
}

impl StepperDriver {
    /// Open the stage on `port_path` and log its firmware info.
    pub async fn open(port_path: &str, baud_rate: u32) -> Result<Self> {
        let config = StepperConfig {
            baud_rate,
            ..StepperConfig::new(port_path)
        };
        Self::from_config(&config).await
    }

    /// Open the configured port and log the firmware info.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the port cannot be
    /// opened, or the firmware query gets no complete reply.
    pub async fn from_config(config: &StepperConfig) -> Result<Self> {
        config.validate()?;

        let stream = open_serial_async(&config.port, config.baud_rate, "stepper")
            .await
            .map_err(|e| StepperError::TransportOpen {
                port: config.port.clone(),
                message: format!("{:#}", e),
            })?;

        Self::from_port(Box::new(stream), config).await
    }

    /// Take over an already open link and query the firmware info.
    pub async fn from_port(port: DynSerial, config: &StepperConfig) -> Result<Self> {
        config.validate()?;

        let mut driver = Self {
            port: BufReader::new(port),
            port_name: config.port.clone(),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        };

        let firmware = driver.firmware_info().await?;
        tracing::info!(
            target: LOG_TARGET,
            port = %driver.port_name,
            "stepper firmware: {}",
            firmware.trim()
        );
        Ok(driver)
    }

    #[cfg(test)]
    pub(crate) fn with_test_port(port: DynSerial) -> Self {
        Self {
            port: BufReader::new(port),
            port_name: "test".to_string(),
            read_timeout: Duration::from_millis(default_read_timeout_ms()),
        }
    }

    /// Port the driver was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Write `command` and collect reply lines up to the one containing `#`.
    ///
    /// Lines are returned with their `\n` restored.
    ///
    /// # Errors
    /// A write failure, or a read failure or timeout before the `#` line.
    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        tracing::debug!(target: LOG_TARGET, command, "write");
        let writer = self.port.get_mut();
        writer.write_all(command.as_bytes()).await?;
        writer.flush().await?;

        let mut reply = String::new();
        loop {
            let line = read_line_timeout(&mut self.port, self.read_timeout).await?;
            reply.push_str(&line);
            reply.push('\n');
            if line.contains(END_OF_REPLY) {
                break;
            }
        }
        tracing::debug!(target: LOG_TARGET, reply = %reply.trim_end(), "reply");
        Ok(reply)
    }

    async fn send_value(&mut self, letter: char, value: impl std::fmt::Display) -> Result<()> {
        self.send_command(&format!("{}{}", letter, value)).await?;
        Ok(())
    }

    /// Firmware info (`?f`).
    pub async fn firmware_info(&mut self) -> Result<String> {
        self.send_command("?f").await
    }

    /// Power the motor (`e`).
    #[instrument(skip(self), err)]
    pub async fn enable(&mut self) -> Result<()> {
        self.send_command("e").await?;
        Ok(())
    }

    /// Cut motor power (`d`).
    #[instrument(skip(self), err)]
    pub async fn disable(&mut self) -> Result<()> {
        self.send_command("d").await?;
        Ok(())
    }

    /// Set acceleration in steps/s² (`a<accel>`).
    #[instrument(skip(self), err)]
    pub async fn set_acceleration(&mut self, acceleration: u32) -> Result<()> {
        self.send_value('a', acceleration).await
    }

    /// Raw acceleration reply (`?a`).
    pub async fn acceleration(&mut self) -> Result<String> {
        self.send_command("?a").await
    }

    /// Set the maximum speed in steps/s (`s<speed>`).
    #[instrument(skip(self), err)]
    pub async fn set_max_speed(&mut self, speed: u32) -> Result<()> {
        self.send_value('s', speed).await
    }

    /// Raw max-speed reply (`?s`).
    pub async fn max_speed(&mut self) -> Result<String> {
        self.send_command("?s").await
    }

    /// Enable limit switches, one bit each (`t<bits>`).
    ///
    /// # Errors
    /// Values above [`MAX_LIMIT_SWITCH_BITS`] are rejected before writing.
    #[instrument(skip(self), err)]
    pub async fn set_limit_switch_enable_bits(&mut self, bits: u8) -> Result<()> {
        if bits > MAX_LIMIT_SWITCH_BITS {
            return Err(StepperError::InvalidArgument(format!(
                "limit switch enable bits must be 0-{}, got {}",
                MAX_LIMIT_SWITCH_BITS, bits
            )));
        }
        self.send_value('t', bits).await
    }

    /// Limit switches active high (`i1`) or low (`i0`).
    #[instrument(skip(self), err)]
    pub async fn set_limit_switch_active_state(&mut self, active_high: bool) -> Result<()> {
        self.send_value('i', u8::from(active_high)).await
    }

    /// Swap the two limit switch pins (`w1`) or not (`w0`).
    #[instrument(skip(self), err)]
    pub async fn set_limit_switch_pins_swapped(&mut self, swapped: bool) -> Result<()> {
        self.send_value('w', u8::from(swapped)).await
    }

    /// Move to an absolute position in steps (`p<position>`).
    #[instrument(skip(self), err)]
    pub async fn go_to(&mut self, position: i64) -> Result<()> {
        self.send_value('p', position).await
    }

    /// Current position in steps (`?p`).
    #[instrument(skip(self), err)]
    pub async fn position(&mut self) -> Result<i64> {
        let reply = self.send_command("?p").await?;
        parse_leading_int(&reply)
    }

    /// Move by `steps`, negative for backwards (`m<steps>`).
    #[instrument(skip(self), err)]
    pub async fn move_steps(&mut self, steps: i64) -> Result<()> {
        self.send_value('m', steps).await
    }

    /// Raw limit switch calibration reply (`?l`).
    pub async fn limit_switch_calibration_position(&mut self) -> Result<String> {
        self.send_command("?l").await
    }

    /// Overwrite the controller's position counter without moving (`r<position>`).
    #[instrument(skip(self), err)]
    pub async fn restore_position(&mut self, position: i64) -> Result<()> {
        self.send_value('r', position).await
    }

    /// Shut the port down.
    pub async fn close(mut self) -> Result<()> {
        self.port.get_mut().shutdown().await?;
        tracing::info!(target: LOG_TARGET, port = %self.port_name, "stepper closed");
        Ok(())
    }
}

/// Leading signed integer of a reply, after optional whitespace.
fn parse_leading_int(reply: &str) -> Result<i64> {
    let text = reply.trim_start();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(text.len(), |(i, _)| i);

    text[..end]
        .parse::<i64>()
        .map_err(|source| StepperError::Parse {
            response: reply.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use femtolab_core::mock_serial;

    #[test]
    fn test_config_defaults() {
        let cfg: StepperConfig = toml::from_str(r#"port = "COM27""#).unwrap();
        assert_eq!(cfg, StepperConfig::new("COM27"));
        assert_eq!(cfg.baud_rate, 115200);
        assert!(cfg.validate().is_ok());
        assert!(StepperConfig::new("").validate().is_err());
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("1000\r\n#\r\n").unwrap(), 1000);
        assert_eq!(parse_leading_int("  -250 steps #\n").unwrap(), -250);
        assert_eq!(parse_leading_int("+7#").unwrap(), 7);
        assert!(parse_leading_int("pos: 5 #").is_err());
        assert!(parse_leading_int("#").is_err());
    }

    #[tokio::test]
    async fn test_open_queries_firmware() {
        let (port, mut harness) = mock_serial::new();
        let config = StepperConfig::new("COM27");

        let (driver, ()) = tokio::join!(
            StepperDriver::from_port(Box::new(port), &config),
            async {
                harness
                    .expect_and_respond(b"?f", b"delay stage fw 2.1\r\n#\r\n")
                    .await;
            }
        );

        let driver = driver.unwrap();
        assert_eq!(driver.port_name(), "COM27");
    }

    #[tokio::test]
    async fn test_send_command_collects_until_marker() {
        let (port, mut harness) = mock_serial::new();
        let mut driver = StepperDriver::with_test_port(Box::new(port));

        let (reply, ()) = tokio::join!(driver.send_command("?s"), async {
            harness.expect_write(b"?s").await;
            harness.send_response(b"max speed\r\n").unwrap();
            harness.send_response(b"3200\r\n#\r\n").unwrap();
        });

        assert_eq!(reply.unwrap(), "max speed\r\n3200\r\n#\r\n");
    }

    #[tokio::test]
    async fn test_commands_encode_arguments() {
        let (port, mut harness) = mock_serial::new();
        let mut driver = StepperDriver::with_test_port(Box::new(port));

        let (result, ()) = tokio::join!(
            async {
                driver.enable().await?;
                driver.set_acceleration(6400).await?;
                driver.set_max_speed(3200).await?;
                driver.move_steps(-1000).await?;
                driver.go_to(42).await?;
                driver.restore_position(0).await?;
                driver.set_limit_switch_active_state(true).await?;
                driver.set_limit_switch_pins_swapped(false).await?;
                driver.set_limit_switch_enable_bits(3).await?;
                driver.disable().await
            },
            async {
                for cmd in [
                    "e", "a6400", "s3200", "m-1000", "p42", "r0", "i1", "w0", "t3", "d",
                ] {
                    harness.expect_and_respond(cmd.as_bytes(), b"#\r\n").await;
                }
            }
        );

        result.unwrap();
    }

    #[tokio::test]
    async fn test_position_parses_reply() {
        let (port, mut harness) = mock_serial::new();
        let mut driver = StepperDriver::with_test_port(Box::new(port));

        let (position, ()) = tokio::join!(driver.position(), async {
            harness.expect_and_respond(b"?p", b"-1250\r\n#\r\n").await;
        });

        assert_eq!(position.unwrap(), -1250);
    }

    #[tokio::test]
    async fn test_limit_bits_out_of_range_writes_nothing() {
        let (port, mut harness) = mock_serial::new();
        let mut driver = StepperDriver::with_test_port(Box::new(port));

        let err = driver.set_limit_switch_enable_bits(4).await.unwrap_err();
        assert!(matches!(err, StepperError::InvalidArgument(_)));
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_marker_times_out() {
        let (port, mut harness) = mock_serial::new();
        let mut driver = StepperDriver::with_test_port(Box::new(port));

        let (reply, ()) = tokio::join!(driver.max_speed(), async {
            harness.expect_and_respond(b"?s", b"3200\r\n").await;
        });

        match reply.unwrap_err() {
            StepperError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::TimedOut),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_shuts_port_down() {
        let (port, mut harness) = mock_serial::new();
        let driver = StepperDriver::with_test_port(Box::new(port));

        driver.close().await.unwrap();
        assert_eq!(harness.shutdown_count(), 1);
    }
}
