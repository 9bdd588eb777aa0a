//! Readiness handshake.
//!
//! The shooter has no "are you ready" query. A freshly reset device answers
//! `C?` with `0`, so the handshake drains stale input, then probes with `C?`
//! and resets the counter until the device reports zero or the attempt
//! budget runs out.

use crate::error::{Result, ShooterError};
use crate::protocol::{write_command, Command};
use crate::LOG_TARGET;
use femtolab_core::serial::{discard_lines, read_line_timeout, DynSerial};
use std::time::Duration;
use tokio::io::BufReader;

/// Reply of a device with a zeroed counter, as read with the `\n` removed.
pub(crate) const READY_LINE: &str = "0\r";

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Discarding whatever a previous session left in the port.
    Draining,
    /// Waiting for a zero counter.
    Probing {
        /// Probes still allowed.
        attempts_left: u32,
    },
    /// Device reported a zero counter.
    Ready,
    /// Attempt budget exhausted.
    Failed,
}

/// Handshake budget and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeSettings {
    /// Number of probes before giving up.
    pub attempts: u32,
    /// Pause before each probe.
    pub spacing: Duration,
    /// Deadline for a probe reply.
    pub read_timeout: Duration,
    /// Per-line deadline while draining.
    pub discard_timeout: Duration,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            spacing: Duration::from_secs(1),
            read_timeout: Duration::from_millis(500),
            discard_timeout: Duration::from_millis(10),
        }
    }
}

/// Run the handshake on an exclusively held port.
///
/// # Errors
///
/// Returns [`ShooterError::DeviceNotReady`] with the last line read (empty if
/// every probe failed) once the budget is exhausted. Probe I/O errors only
/// consume an attempt.
pub(crate) async fn run(
    port: &mut BufReader<DynSerial>,
    port_name: &str,
    settings: &HandshakeSettings,
) -> Result<()> {
    let mut state = HandshakeState::Draining;
    let mut last_line = String::new();

    loop {
        let next = match state {
            HandshakeState::Draining => {
                let discarded = discard_lines(port, settings.discard_timeout).await;
                tracing::debug!(target: LOG_TARGET, discarded, "drained stale input");
                HandshakeState::Probing {
                    attempts_left: settings.attempts,
                }
            }
            HandshakeState::Probing { attempts_left: 0 } => HandshakeState::Failed,
            HandshakeState::Probing { attempts_left } => {
                tokio::time::sleep(settings.spacing).await;
                match probe(port, settings).await {
                    Ok(line) if line == READY_LINE => HandshakeState::Ready,
                    Ok(line) => {
                        tracing::warn!(
                            target: LOG_TARGET,
                            port = port_name,
                            line = ?line,
                            attempts_left = attempts_left - 1,
                            "shooter counter not zero, resetting"
                        );
                        if let Err(e) = write_command(port, Command::ResetCount).await {
                            tracing::debug!(target: LOG_TARGET, "ignored reset failure: {}", e);
                        }
                        last_line = line;
                        HandshakeState::Probing {
                            attempts_left: attempts_left - 1,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: LOG_TARGET,
                            port = port_name,
                            attempts_left = attempts_left - 1,
                            "shooter probe failed: {}",
                            e
                        );
                        HandshakeState::Probing {
                            attempts_left: attempts_left - 1,
                        }
                    }
                }
            }
            HandshakeState::Ready => {
                tracing::info!(target: LOG_TARGET, port = port_name, "shooter ready");
                return Ok(());
            }
            HandshakeState::Failed => {
                return Err(ShooterError::DeviceNotReady {
                    port: port_name.to_string(),
                    last_line,
                });
            }
        };
        tracing::debug!(target: LOG_TARGET, from = ?state, to = ?next, "handshake transition");
        state = next;
    }
}

/// One probe: drain, send `C?`, read the reply line.
async fn probe(port: &mut BufReader<DynSerial>, settings: &HandshakeSettings) -> Result<String> {
    discard_lines(port, settings.discard_timeout).await;
    write_command(port, Command::QueryCount).await?;
    Ok(read_line_timeout(port, settings.read_timeout).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use femtolab_core::mock_serial;

    fn fast_settings(attempts: u32) -> HandshakeSettings {
        HandshakeSettings {
            attempts,
            ..HandshakeSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_probe() {
        let (port, mut harness) = mock_serial::new();
        let mut port = BufReader::new(Box::new(port) as DynSerial);

        let device = async {
            harness.expect_and_respond(b"C?", b"0\r\n").await;
        };
        let settings = fast_settings(3);
        let (result, ()) = tokio::join!(run(&mut port, "mock", &settings), device);

        result.unwrap();
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_without_carriage_return_is_not_ready() {
        let (port, mut harness) = mock_serial::new();
        let mut port = BufReader::new(Box::new(port) as DynSerial);

        let device = async {
            harness.expect_and_respond(b"C?", b"0\n").await;
            harness.expect_write(b"CR").await;
        };
        let settings = fast_settings(1);
        let (result, ()) = tokio::join!(run(&mut port, "mock", &settings), device);

        match result.unwrap_err() {
            ShooterError::DeviceNotReady { last_line, .. } => assert_eq!(last_line, "0"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_fails_with_empty_last_line() {
        let (port, mut harness) = mock_serial::new();
        let mut port = BufReader::new(Box::new(port) as DynSerial);

        let device = async {
            // Never answer; no reset follows a failed read
            harness.expect_write(b"C?").await;
            harness.expect_write(b"C?").await;
        };
        let settings = fast_settings(2);
        let (result, ()) = tokio::join!(run(&mut port, "mock", &settings), device);

        match result.unwrap_err() {
            ShooterError::DeviceNotReady { port, last_line } => {
                assert_eq!(port, "mock");
                assert_eq!(last_line, "");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_input_is_drained_before_probing() {
        let (port, mut harness) = mock_serial::new();
        let mut port = BufReader::new(Box::new(port) as DynSerial);

        harness.send_response(b"17\r\n18\r\n").unwrap();

        let device = async {
            harness.expect_and_respond(b"C?", b"0\r\n").await;
        };
        let settings = fast_settings(1);
        let (result, ()) = tokio::join!(run(&mut port, "mock", &settings), device);

        result.unwrap();
    }
}
