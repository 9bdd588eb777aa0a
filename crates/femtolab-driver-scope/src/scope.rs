//! SCPI oscilloscope over serial
//!
//! Protocol Overview:
//! - Format: SCPI, commands terminated with `\n`
//! - Baud: 9600, 8N1, no flow control
//! - Queries end in `?` and are answered with one `\n`-terminated line
//! - `CURVE?` after `DATA:ENC RIBINARY` returns binary samples

use crate::error::{Result, ScopeError};
use femtolab_core::serial::{open_serial_async, read_line_timeout, DynSerial};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::instrument;

const LOG_TARGET: &str = "femtolab::scope";

/// Valid channel numbers.
pub const CHANNELS: RangeInclusive<u8> = 1..=4;

/// Configuration for the oscilloscope driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Serial port path (e.g., "/dev/ttyUSB1")
    pub port: String,
    /// Link speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Deadline for a reply line or a binary block
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Pause after each command so the scope can process it
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    300
}

impl ScopeConfig {
    /// Defaults for everything but the port.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            settle_ms: default_settle_ms(),
        }
    }

    /// Reject an empty port, zero baud rate or zero read timeout.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(ScopeError::InvalidArgument(
                "scope port must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 || self.read_timeout_ms == 0 {
            return Err(ScopeError::InvalidArgument(
                "baud_rate and read_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Driver for a SCPI oscilloscope on a serial link.
pub struct ScopeDriver {
    port: BufReader<DynSerial>,
    port_name: String,
    timeout: Duration,
    settle: Duration,
}

impl ScopeDriver {
    /// Open the scope on `port_path` and log its identity.
    pub async fn open(port_path: &str, baud_rate: u32) -> Result<Self> {
        let config = ScopeConfig {
            baud_rate,
            ..ScopeConfig::new(port_path)
        };
        Self::from_config(&config).await
    }

    /// Open the configured port and log the `*IDN?` reply.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the port cannot be
    /// opened, or the scope does not answer `*IDN?`.
    pub async fn from_config(config: &ScopeConfig) -> Result<Self> {
        config.validate()?;

        let stream = open_serial_async(&config.port, config.baud_rate, "scope")
            .await
            .map_err(|e| ScopeError::TransportOpen {
                port: config.port.clone(),
                message: format!("{:#}", e),
            })?;

        Self::from_port(Box::new(stream), config).await
    }

    /// Take over an already open link and query the identity.
    pub async fn from_port(port: DynSerial, config: &ScopeConfig) -> Result<Self> {
        config.validate()?;

        let mut driver = Self {
            port: BufReader::new(port),
            port_name: config.port.clone(),
            timeout: Duration::from_millis(config.read_timeout_ms),
            settle: Duration::from_millis(config.settle_ms),
        };

        let identity = driver.identify().await?;
        tracing::info!(target: LOG_TARGET, port = %driver.port_name, "scope identity: {}", identity);
        Ok(driver)
    }

    #[cfg(test)]
    pub(crate) fn with_test_port(port: DynSerial) -> Self {
        Self {
            port: BufReader::new(port),
            port_name: "test".to_string(),
            timeout: Duration::from_millis(default_read_timeout_ms()),
            settle: Duration::from_millis(default_settle_ms()),
        }
    }

    /// Port the driver was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    async fn send_line(&mut self, command: &str) -> Result<()> {
        let cmd = format!("{}\n", command);
        let writer = self.port.get_mut();
        writer.write_all(cmd.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send a command without expecting a response.
    pub async fn write(&mut self, command: &str) -> Result<()> {
        tracing::debug!(target: LOG_TARGET, "SCPI write: {:?}", command);
        self.send_line(command).await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Send a query and read the response line, trimmed.
    ///
    /// Bytes already buffered from an earlier exchange are dropped first.
    pub async fn query(&mut self, query: &str) -> Result<String> {
        let stale = self.port.buffer().len();
        if stale > 0 {
            tracing::debug!(target: LOG_TARGET, "Flushing {} bytes from buffer", stale);
            self.port.consume(stale);
        }

        tracing::debug!(target: LOG_TARGET, "SCPI query: {:?}", query);
        self.send_line(query).await?;

        let response = read_line_timeout(&mut self.port, self.timeout).await?;
        let trimmed = response.trim().to_string();
        tracing::debug!(target: LOG_TARGET, "SCPI response: {:?}", trimmed);
        Ok(trimmed)
    }

    async fn query_f64(&mut self, query: &str) -> Result<f64> {
        let response = self.query(query).await?;
        response.parse::<f64>().map_err(|source| ScopeError::Parse {
            query: query.to_string(),
            response,
            source,
        })
    }

    /// Restore factory settings (`*RST`).
    #[instrument(skip(self), err)]
    pub async fn reset(&mut self) -> Result<()> {
        self.write("*RST").await
    }

    /// Instrument identity (`*IDN?`).
    pub async fn identify(&mut self) -> Result<String> {
        self.query("*IDN?").await
    }

    /// Turn a channel's display on.
    #[instrument(skip(self), err)]
    pub async fn enable_channel(&mut self, channel: u8) -> Result<()> {
        check_channel(channel)?;
        self.write(&format!("SELECT:CH{} ON", channel)).await
    }

    /// Set a channel's vertical scale in volts per division.
    #[instrument(skip(self), err)]
    pub async fn set_vertical_scale(&mut self, channel: u8, volts_per_div: f64) -> Result<()> {
        check_channel(channel)?;
        if !(volts_per_div.is_finite() && volts_per_div > 0.0) {
            return Err(ScopeError::InvalidArgument(format!(
                "vertical scale must be a positive number of volts, got {}",
                volts_per_div
            )));
        }
        self.write(&format!("CH{}:VOLTS/DIV {:.6}", channel, volts_per_div))
            .await
    }

    /// Peak-to-peak voltage of a channel.
    #[instrument(skip(self), err)]
    pub async fn measure_vpp(&mut self, channel: u8) -> Result<f64> {
        check_channel(channel)?;
        self.query_f64(&format!("MEASURE:VPP? CH{}", channel)).await
    }

    /// Signal frequency of a channel in Hz.
    #[instrument(skip(self), err)]
    pub async fn measure_frequency(&mut self, channel: u8) -> Result<f64> {
        check_channel(channel)?;
        self.query_f64(&format!("MEASURE:FREQUENCY? CH{}", channel))
            .await
    }

    /// Arm a single acquisition.
    #[instrument(skip(self), err)]
    pub async fn single_capture(&mut self) -> Result<()> {
        self.write("ACQUIRE:STOPAFTER SEQUENCE").await?;
        self.write("ACQUIRE:STATE RUN").await
    }

    /// Select `channel` as waveform source, 16-bit signed binary encoding.
    #[instrument(skip(self), err)]
    pub async fn configure_waveform(&mut self, channel: u8) -> Result<()> {
        check_channel(channel)?;
        for cmd in [
            format!("DATA:SOURCE CH{}", channel),
            "DATA:WIDTH 2".to_string(),
            "DATA:ENC RIBINARY".to_string(),
        ] {
            self.write(&cmd).await?;
        }
        Ok(())
    }

    /// Waveform as returned by `CURVE?`.
    pub async fn waveform(&mut self) -> Result<String> {
        self.query("CURVE?").await
    }

    /// Read exactly `len` raw bytes.
    ///
    /// # Errors
    /// `ErrorKind::TimedOut` if they do not all arrive within the read timeout.
    pub async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(self.timeout, self.port.read_exact(&mut buf))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{} bytes not received within {:?}", len, self.timeout),
                )
            })??;
        Ok(buf)
    }

    /// Shut the port down.
    pub async fn close(mut self) -> Result<()> {
        self.port.get_mut().shutdown().await?;
        tracing::info!(target: LOG_TARGET, port = %self.port_name, "scope closed");
        Ok(())
    }
}

fn check_channel(channel: u8) -> Result<()> {
    if !CHANNELS.contains(&channel) {
        return Err(ScopeError::InvalidArgument(format!(
            "channel must be {}-{}, got {}",
            CHANNELS.start(),
            CHANNELS.end(),
            channel
        )));
    }
    Ok(())
}
