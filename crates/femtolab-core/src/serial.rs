//! Serial Port Abstractions for Driver Crates
//!
//! Shared types and utilities for async serial communication so the driver
//! crates do not each re-declare them.
//!
//! # Types
//!
//! - [`SerialPortIO`]: Trait alias combining AsyncRead + AsyncWrite for serial ports
//! - [`DynSerial`]: Type-erased boxed serial port
//! - [`SharedPort`]: Thread-safe shared serial port with buffered reading
//!
//! # Utilities
//!
//! - [`open_serial_async`]: Open a serial port with spawn_blocking
//! - [`read_line_timeout`]: Read one `\n`-terminated line with a deadline
//! - [`discard_lines`]: Drain stale lines left in the port
//!
//! # Example
//!
//! ```rust,ignore
//! use femtolab_core::serial::{discard_lines, open_serial_async, read_line_timeout, wrap_shared};
//! use tokio::io::AsyncWriteExt;
//!
//! let port = open_serial_async("/dev/ttyUSB0", 9600, "shooter").await?;
//! let shared = wrap_shared(Box::new(port));
//!
//! let mut guard = shared.lock().await;
//! discard_lines(&mut *guard, Duration::from_millis(10)).await;
//! guard.get_mut().write_all(b"C?").await?;
//! let line = read_line_timeout(&mut *guard, Duration::from_millis(500)).await?;
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Mutex;

// =============================================================================
// Serial Port Trait
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port. This includes:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing)
/// - [`crate::mock_serial::MockSerialPort`] (scripted device tests)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

// =============================================================================
// Type Aliases
// =============================================================================

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Thread-safe shared serial port with buffered reading.
///
/// The mutex is the exclusive section for a device: whoever holds the guard
/// owns the wire until the guard drops, so a command and its response can
/// never interleave with another exchange. The `BufReader` wrapper enables
/// line-oriented reads.
pub type SharedPort = Arc<Mutex<BufReader<DynSerial>>>;

/// Create a SharedPort from a type-erased serial port.
pub fn wrap_shared(port: DynSerial) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

// =============================================================================
// Serial Port Utilities
// =============================================================================

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control. Bytes the OS already
/// buffered from a previous session are cleared right after opening.
///
/// # Parameters
///
/// - `port_path`: Path to the serial port (e.g., "/dev/ttyUSB0", "COM27")
/// - `baud_rate`: Baud rate (e.g., 9600, 115200)
/// - `device_name`: Human-readable device name for error messages
///
/// # Errors
///
/// Returns an error if the port cannot be opened or spawn_blocking fails.
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::{SerialPort, SerialPortBuilderExt};

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        let port = tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))?;

        if let Err(e) = port.clear(tokio_serial::ClearBuffer::Input) {
            tracing::debug!(
                "{} port {}: input buffer clear not supported: {}",
                device_name_owned,
                port_path_owned,
                e
            );
        }

        Ok(port)
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Read one `\n`-terminated line, giving up after `timeout`.
///
/// The trailing `\n` is removed; anything before it (including a `\r`) is
/// kept, so a device answering `0\r\n` yields `"0\r"`. Invalid UTF-8 is
/// replaced rather than rejected.
///
/// # Errors
///
/// - `ErrorKind::TimedOut` if no complete line arrived in time
/// - `ErrorKind::UnexpectedEof` if the stream closed before any byte arrived
/// - any error raised by the underlying reader
pub async fn read_line_timeout<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> io::Result<String> {
    let mut raw = Vec::new();
    let n = tokio::time::timeout(timeout, reader.read_until(b'\n', &mut raw))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no line received within {:?}", timeout),
            )
        })??;

    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "serial stream closed",
        ));
    }

    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Discard every line that arrives before a read times out or fails.
///
/// Used before a query so a stale leftover line is not mistaken for the
/// answer. Errors end the drain and are otherwise ignored.
///
/// # Returns
///
/// Number of lines discarded.
pub async fn discard_lines<R: AsyncBufRead + Unpin>(reader: &mut R, per_read: Duration) -> usize {
    let mut discarded = 0usize;
    loop {
        match read_line_timeout(reader, per_read).await {
            Ok(line) => {
                tracing::trace!("discarded stale line {:?}", line);
                discarded += 1;
            }
            Err(_) => break,
        }
    }
    discarded
}
