//! Shooter wire protocol.
//!
//! Protocol Overview:
//! - Format: ASCII, no framing, no checksum
//! - Commands: one or two letters, written without terminator
//! - Numeric arguments: plain base-10 digits, no separator (`P1500`)
//! - Only `C?` is answered, with one `\n`-terminated line (`42\r\n`)
//!
//! | Command | Bytes |
//! |---|---|
//! | single shot | `S` |
//! | single-shot / external-sync / frequency mode | `MM` / `ME` / `MF` |
//! | set period (followed by digits) | `P` |
//! | external input 1 / 2 | `I1` / `I2` |
//! | query / reset shot count | `C?` / `CR` |
//! | disallow / allow shooting | `D` / `A` |
//! | verbose on / off | `VF` / `VN` |
//!
//! The exchange helpers at the bottom take the already-locked port, so the
//! caller decides how long the wire stays reserved.

use crate::error::{Result, ShooterError};
use crate::state::{ExternalSource, FiringMode};
use crate::LOG_TARGET;
use femtolab_core::serial::{discard_lines, read_line_timeout, DynSerial};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};

/// A shooter command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Fire one pulse.
    Shoot,
    /// Switch to single-shot mode.
    ModeSingle,
    /// Switch to external-sync mode.
    ModeExternal,
    /// Switch to frequency mode.
    ModeFrequency,
    /// Set the period; the decimal value follows as a separate write.
    SetPeriod,
    /// Trigger from external input 1.
    ExternalIn1,
    /// Trigger from external input 2.
    ExternalIn2,
    /// Ask for the shot count.
    QueryCount,
    /// Zero the shot count.
    ResetCount,
    /// Disallow shooting.
    Disallow,
    /// Allow shooting.
    Allow,
    /// Verbose device output on.
    VerboseFull,
    /// Verbose device output off.
    VerboseNone,
}

impl Command {
    /// Bytes sent on the wire for this command.
    pub const fn token(self) -> &'static [u8] {
        match self {
            Command::Shoot => b"S",
            Command::ModeSingle => b"MM",
            Command::ModeExternal => b"ME",
            Command::ModeFrequency => b"MF",
            Command::SetPeriod => b"P",
            Command::ExternalIn1 => b"I1",
            Command::ExternalIn2 => b"I2",
            Command::QueryCount => b"C?",
            Command::ResetCount => b"CR",
            Command::Disallow => b"D",
            Command::Allow => b"A",
            Command::VerboseFull => b"VF",
            Command::VerboseNone => b"VN",
        }
    }

    /// Whether the device answers this command with a line.
    pub const fn expects_response(self) -> bool {
        matches!(self, Command::QueryCount)
    }

    /// Mode-switch command for `mode`.
    pub const fn for_mode(mode: FiringMode) -> Self {
        match mode {
            FiringMode::SingleShot => Command::ModeSingle,
            FiringMode::ExternalSync => Command::ModeExternal,
            FiringMode::Frequency => Command::ModeFrequency,
        }
    }

    /// Input-select command for `source`.
    pub const fn for_source(source: ExternalSource) -> Self {
        match source {
            ExternalSource::In1 => Command::ExternalIn1,
            ExternalSource::In2 => Command::ExternalIn2,
        }
    }

    /// `A` when `enable` is true, `D` otherwise.
    pub const fn for_enable(enable: bool) -> Self {
        if enable {
            Command::Allow
        } else {
            Command::Disallow
        }
    }

    /// `VF` when `full` is true, `VN` otherwise.
    pub const fn for_verbose(full: bool) -> Self {
        if full {
            Command::VerboseFull
        } else {
            Command::VerboseNone
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.token()))
    }
}

/// Decimal argument of the `P` command.
pub fn encode_period(period_us: u32) -> Vec<u8> {
    period_us.to_string().into_bytes()
}

// =============================================================================
// Exchanges on a locked port
// =============================================================================

/// Read deadlines used by the shot-count query.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueryTiming {
    /// Deadline for the reply line.
    pub read_timeout: Duration,
    /// Per-line deadline while draining stale input.
    pub discard_timeout: Duration,
}

/// Write raw bytes and flush.
pub(crate) async fn write_raw(port: &mut BufReader<DynSerial>, bytes: &[u8]) -> std::io::Result<()> {
    let writer = port.get_mut();
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Write one command token and flush.
pub(crate) async fn write_command(
    port: &mut BufReader<DynSerial>,
    command: Command,
) -> std::io::Result<()> {
    tracing::debug!(target: LOG_TARGET, %command, "write");
    write_raw(port, command.token()).await
}

/// Drain stale lines, send `C?`, read and parse the reply.
pub(crate) async fn query_shots_count(
    port: &mut BufReader<DynSerial>,
    timing: QueryTiming,
) -> Result<i64> {
    discard_lines(port, timing.discard_timeout).await;
    write_command(port, Command::QueryCount).await?;
    let line = read_line_timeout(port, timing.read_timeout).await?;
    parse_shots_count(&line)
}

/// Parse a `C?` reply such as `"42\r"`.
pub(crate) fn parse_shots_count(line: &str) -> Result<i64> {
    line.trim()
        .parse::<i64>()
        .map_err(|source| ShooterError::Parse {
            response: line.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_table() {
        let table: &[(Command, &[u8])] = &[
            (Command::Shoot, b"S"),
            (Command::ModeSingle, b"MM"),
            (Command::ModeExternal, b"ME"),
            (Command::ModeFrequency, b"MF"),
            (Command::SetPeriod, b"P"),
            (Command::ExternalIn1, b"I1"),
            (Command::ExternalIn2, b"I2"),
            (Command::QueryCount, b"C?"),
            (Command::ResetCount, b"CR"),
            (Command::Disallow, b"D"),
            (Command::Allow, b"A"),
            (Command::VerboseFull, b"VF"),
            (Command::VerboseNone, b"VN"),
        ];

        for (command, bytes) in table {
            assert_eq!(command.token(), *bytes, "token for {:?}", command);
            assert_eq!(command.expects_response(), *command == Command::QueryCount);
        }
    }

    #[test]
    fn test_selector_commands() {
        assert_eq!(Command::for_mode(FiringMode::SingleShot).token(), b"MM");
        assert_eq!(Command::for_mode(FiringMode::ExternalSync).token(), b"ME");
        assert_eq!(Command::for_mode(FiringMode::Frequency).token(), b"MF");
        assert_eq!(Command::for_source(ExternalSource::In2).token(), b"I2");
        assert_eq!(Command::for_enable(true).token(), b"A");
        assert_eq!(Command::for_enable(false).token(), b"D");
        assert_eq!(Command::for_verbose(false).token(), b"VN");
    }

    #[test]
    fn test_encode_period() {
        assert_eq!(encode_period(1), b"1");
        assert_eq!(encode_period(1500), b"1500");
        assert_eq!(encode_period(1_000_000), b"1000000");
    }

    #[test]
    fn test_parse_shots_count() {
        assert_eq!(parse_shots_count("42\r").unwrap(), 42);
        assert_eq!(parse_shots_count(" 0 \r").unwrap(), 0);

        let err = parse_shots_count("abc\r").unwrap_err();
        match err {
            ShooterError::Parse { response, .. } => assert_eq!(response, "abc\r"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_uses_wire_text() {
        assert_eq!(Command::QueryCount.to_string(), "C?");
    }
}
