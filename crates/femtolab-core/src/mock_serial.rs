//! Mock serial port implementation for testing async serial communication
//!
//! This module provides `MockSerialPort` which implements `AsyncRead` and `AsyncWrite`,
//! and a corresponding `MockDeviceHarness` to control the mock from within tests.
//! This allows for simulating device interactions, including command/response sequences,
//! silent devices, and port closure.
//!
//! # Architecture
//!
//! The mock uses unbounded channels to simulate bidirectional communication:
//! - `MockSerialPort` (given to the driver): implements AsyncRead/AsyncWrite
//! - `MockDeviceHarness` (kept in test): scripts device behavior
//!
//! A third channel reports `poll_shutdown` calls so tests can assert that a
//! driver closed its port exactly once.
//!
//! # Example
//!
//! ```rust,ignore
//! use femtolab_core::mock_serial;
//! use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
//!
//! #[tokio::test]
//! async fn test_counter_query() {
//!     let (port, mut harness) = mock_serial::new();
//!     let mut reader = BufReader::new(port);
//!
//!     let app_task = tokio::spawn(async move {
//!         reader.write_all(b"C?").await.unwrap();
//!         let mut response = String::new();
//!         reader.read_line(&mut response).await.unwrap();
//!         response
//!     });
//!
//!     harness.expect_write(b"C?").await;
//!     harness.send_response(b"42\r\n").unwrap();
//!
//!     assert_eq!(app_task.await.unwrap(), "42\r\n");
//! }
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// The driver-facing side of the mock serial port
///
/// This struct implements `AsyncRead` and `AsyncWrite` and is intended to be
/// passed to the driver under test in place of a `tokio_serial::SerialStream`.
#[derive(Debug)]
pub struct MockSerialPort {
    /// Channel to send written data to the harness
    writes_tx: UnboundedSender<Vec<u8>>,
    /// Channel to receive data from the harness to be read
    reads_rx: UnboundedReceiver<Vec<u8>>,
    /// Reports every `poll_shutdown` call
    shutdown_tx: UnboundedSender<()>,
    /// Buffer for data received from the harness but not yet read by the client
    read_buffer: VecDeque<u8>,
}

/// The test-facing side for controlling the mock serial port
///
/// This harness allows a test to assert on data written by the driver
/// and to send data back as if it were a real device.
#[derive(Debug)]
pub struct MockDeviceHarness {
    /// Channel to receive data written by the client
    writes_rx: UnboundedReceiver<Vec<u8>>,
    /// Channel to send data to the client for it to read
    reads_tx: UnboundedSender<Vec<u8>>,
    /// Receives one message per shutdown of the client port
    shutdown_rx: UnboundedReceiver<()>,
    /// Buffer for data received from the client but not yet asserted by the test
    write_buffer: Vec<u8>,
    /// Shutdowns observed so far
    shutdowns: usize,
}

/// Creates a new connected pair of `MockSerialPort` and `MockDeviceHarness`
pub fn new() -> (MockSerialPort, MockDeviceHarness) {
    let (client_to_harness_tx, client_to_harness_rx) = mpsc::unbounded_channel();
    let (harness_to_client_tx, harness_to_client_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

    let port = MockSerialPort {
        writes_tx: client_to_harness_tx,
        reads_rx: harness_to_client_rx,
        shutdown_tx,
        read_buffer: VecDeque::new(),
    };

    let harness = MockDeviceHarness {
        writes_rx: client_to_harness_rx,
        reads_tx: harness_to_client_tx,
        shutdown_rx,
        write_buffer: Vec::new(),
        shutdowns: 0,
    };

    (port, harness)
}

// =============================================================================
// MockSerialPort Implementations
// =============================================================================

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.read_buffer.is_empty() {
            match self.reads_rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.read_buffer.extend(chunk),
                // Channel closed, which means end-of-file
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }

        let to_read = std::cmp::min(buf.remaining(), self.read_buffer.len());
        let chunk: Vec<u8> = self.read_buffer.drain(..to_read).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.writes_tx.send(buf.to_vec()) {
            Ok(_) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device harness disconnected",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // The harness may already be gone; a closed report channel is fine
        let _ = self.shutdown_tx.send(());
        Poll::Ready(Ok(()))
    }
}

// =============================================================================
// MockDeviceHarness Implementations
// =============================================================================

impl MockDeviceHarness {
    /// Sends a response to the client
    ///
    /// This simulates the device sending data over the serial port.
    ///
    /// # Errors
    /// Returns error if the client port has been disconnected
    pub fn send_response(&self, data: &[u8]) -> Result<(), &'static str> {
        self.reads_tx
            .send(data.to_vec())
            .map_err(|_| "Failed to send response: client port disconnected")
    }

    /// Waits for the client to write specific data and asserts its correctness
    ///
    /// This will buffer incoming writes until the expected sequence is received,
    /// so a command split over several writes (`P` then `1500`) still matches
    /// `expect_write(b"P1500")`.
    ///
    /// # Panics
    /// Panics if the expected data is not received within 5 seconds or if
    /// the received data does not match the expected data.
    pub async fn expect_write(&mut self, expected: &[u8]) {
        use tokio::time::{timeout, Duration};

        let timeout_duration = Duration::from_secs(5);

        while self.write_buffer.len() < expected.len() {
            match timeout(timeout_duration, self.writes_rx.recv()).await {
                Ok(Some(chunk)) => self.write_buffer.extend_from_slice(&chunk),
                Ok(None) => panic!(
                    "Client-side port closed while expecting `{:?}` (have `{:?}`).",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&self.write_buffer)
                ),
                Err(_) => {
                    panic!(
                        "Timeout waiting for write. Expected `{:?}` ({} bytes), but only received `{:?}` ({} bytes).",
                        String::from_utf8_lossy(expected),
                        expected.len(),
                        String::from_utf8_lossy(&self.write_buffer),
                        self.write_buffer.len()
                    );
                }
            }
        }

        let actual = &self.write_buffer[..expected.len()];
        assert_eq!(
            actual,
            expected,
            "Mismatch in expected write. Expected `{:?}`, got `{:?}`.",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(actual)
        );

        // Keep any excess for the next expectation
        self.write_buffer.drain(..expected.len());
    }

    /// Expects a write and sends a response in one operation
    pub async fn expect_and_respond(&mut self, expected: &[u8], response: &[u8]) {
        self.expect_write(expected).await;
        self.send_response(response)
            .expect("Failed to send response");
    }

    /// Returns every byte written so far without waiting.
    ///
    /// Includes bytes buffered by earlier expectations but not yet asserted.
    pub fn take_pending_writes(&mut self) -> Vec<u8> {
        while let Ok(chunk) = self.writes_rx.try_recv() {
            self.write_buffer.extend_from_slice(&chunk);
        }
        std::mem::take(&mut self.write_buffer)
    }

    /// Number of times the client shut its port down so far.
    pub fn shutdown_count(&mut self) -> usize {
        while self.shutdown_rx.try_recv().is_ok() {
            self.shutdowns += 1;
        }
        self.shutdowns
    }

    /// True once the client port has been dropped.
    pub fn is_client_dropped(&self) -> bool {
        self.reads_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_command_response() {
        let (port, mut harness) = new();
        let mut port = BufReader::new(port);

        let app_task = tokio::spawn(async move {
            port.write_all(b"C?").await.unwrap();
            let mut response = String::new();
            port.read_line(&mut response).await.unwrap();
            response
        });

        harness.expect_write(b"C?").await;
        harness.send_response(b"42\r\n").unwrap();

        assert_eq!(app_task.await.unwrap(), "42\r\n");
    }

    #[tokio::test]
    async fn test_split_writes_match_one_expectation() {
        let (mut port, mut harness) = new();

        port.write_all(b"P").await.unwrap();
        port.write_all(b"1500").await.unwrap();

        harness.expect_write(b"P1500").await;
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (port, mut harness) = new();
        let mut port = BufReader::new(port);

        let app_task = tokio::spawn(async move {
            port.write_all(b"C?").await.unwrap();
            let mut response = String::new();
            timeout(Duration::from_millis(100), port.read_line(&mut response)).await
        });

        // Expect the write but never send a response
        harness.expect_write(b"C?").await;

        let result = app_task.await.unwrap();
        assert!(result.is_err(), "Expected timeout error");
    }

    #[tokio::test]
    async fn test_shutdown_is_reported() {
        let (mut port, mut harness) = new();

        assert_eq!(harness.shutdown_count(), 0);
        port.shutdown().await.unwrap();
        assert_eq!(harness.shutdown_count(), 1);

        drop(port);
        assert!(harness.is_client_dropped());
    }

    #[tokio::test]
    async fn test_write_fails_after_harness_dropped() {
        let (mut port, harness) = new();
        drop(harness);

        let err = port.write_all(b"S").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
