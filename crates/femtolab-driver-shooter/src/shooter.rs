//! Laser shooter driver.
//!
//! Protocol details live in [`crate::protocol`]. This module holds the
//! command gateway: every exchange locks the shared port, writes, optionally
//! reads one reply line, updates the local state mirror and unlocks.
//!
//! # Concurrency
//!
//! The only task besides the caller is the shot-count poller. The port mutex
//! serializes both. The cached shot count and the enable flag are atomics read
//! without the lock; in particular the enable check in
//! [`ShooterDriver::shoot`] is best-effort, a concurrent
//! `set_enabled(false)` may land between the check and the first `S`.

use crate::error::{Result, ShooterError};
use crate::handshake::{self, HandshakeSettings};
use crate::poller::Poller;
use crate::protocol::{
    encode_period, query_shots_count, write_command, write_raw, Command, QueryTiming,
};
use crate::state::{
    check_batch_count, check_period, shot_spacing, ExternalSource, FiringMode, Settings,
    ShooterState, DEFAULT_BATCH_COUNT, DEFAULT_PERIOD_US,
};
use crate::LOG_TARGET;
use femtolab_core::serial::{open_serial_async, wrap_shared, DynSerial, SharedPort};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the shooter driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShooterConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Link speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Period sent after the handshake when it differs from the power-up default
    #[serde(default = "default_period_us")]
    pub period_us: u32,
    /// Shots per `shoot` call
    #[serde(default = "default_batch_count")]
    pub batch_count: u32,
    /// Deadline for a reply line
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Per-line deadline while draining stale input
    #[serde(default = "default_discard_timeout_ms")]
    pub discard_timeout_ms: u64,
    /// Shot-count refresh interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Handshake probes before giving up
    #[serde(default = "default_handshake_attempts")]
    pub handshake_attempts: u32,
    /// Pause before each handshake probe
    #[serde(default = "default_handshake_spacing_ms")]
    pub handshake_spacing_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_period_us() -> u32 {
    DEFAULT_PERIOD_US
}

fn default_batch_count() -> u32 {
    DEFAULT_BATCH_COUNT
}

fn default_read_timeout_ms() -> u64 {
    500
}

fn default_discard_timeout_ms() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_handshake_attempts() -> u32 {
    10
}

fn default_handshake_spacing_ms() -> u64 {
    1000
}

impl ShooterConfig {
    /// Defaults for everything but the port.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            period_us: default_period_us(),
            batch_count: default_batch_count(),
            read_timeout_ms: default_read_timeout_ms(),
            discard_timeout_ms: default_discard_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            handshake_attempts: default_handshake_attempts(),
            handshake_spacing_ms: default_handshake_spacing_ms(),
        }
    }

    /// Check values against the device limits.
    ///
    /// # Errors
    /// Returns [`ShooterError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(ShooterError::InvalidArgument(
                "shooter port must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ShooterError::InvalidArgument(
                "baud_rate must be positive".to_string(),
            ));
        }
        check_period(self.period_us)?;
        check_batch_count(self.batch_count)?;
        if self.handshake_attempts == 0 {
            return Err(ShooterError::InvalidArgument(
                "handshake_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("read_timeout_ms", self.read_timeout_ms),
            ("discard_timeout_ms", self.discard_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ShooterError::InvalidArgument(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Handshake budget and deadlines.
    pub fn handshake(&self) -> HandshakeSettings {
        HandshakeSettings {
            attempts: self.handshake_attempts,
            spacing: Duration::from_millis(self.handshake_spacing_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            discard_timeout: Duration::from_millis(self.discard_timeout_ms),
        }
    }

    fn query_timing(&self) -> QueryTiming {
        QueryTiming {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            discard_timeout: Duration::from_millis(self.discard_timeout_ms),
        }
    }
}

// =============================================================================
// ShooterDriver
// =============================================================================

/// Driver for the pulsed-laser shooter.
pub struct ShooterDriver {
    /// Serial port protected by Mutex for exclusive access
    port: SharedPort,
    port_name: String,
    /// Last count read from the device; written by the poller too
    shots_count: Arc<AtomicI64>,
    enable_shooting: AtomicBool,
    /// Device-side fields change only while `port` is locked
    settings: parking_lot::Mutex<Settings>,
    timing: QueryTiming,
    poller: Option<Poller>,
}

impl ShooterDriver {
    /// Open the shooter on `port_path` with default settings.
    ///
    /// # Errors
    /// See [`ShooterDriver::from_config`].
    pub async fn new_async(port_path: &str, baud_rate: u32) -> Result<Self> {
        let config = ShooterConfig {
            baud_rate,
            ..ShooterConfig::new(port_path)
        };
        Self::from_config(&config).await
    }

    /// Open the configured port, run the handshake and start the poller.
    ///
    /// Blocks for up to `handshake_attempts * (handshake_spacing + read_timeout)`
    /// when the device is not ready.
    ///
    /// # Errors
    /// Returns error if:
    /// - the configuration is invalid
    /// - the serial port cannot be opened
    /// - the device never reports a zeroed counter
    pub async fn from_config(config: &ShooterConfig) -> Result<Self> {
        config.validate()?;

        let stream = open_serial_async(&config.port, config.baud_rate, "shooter")
            .await
            .map_err(|e| ShooterError::TransportOpen {
                port: config.port.clone(),
                message: format!("{:#}", e),
            })?;

        Self::from_port(Box::new(stream), config).await
    }

    /// Bring up a shooter on an already open link.
    ///
    /// Runs the handshake, turns verbose output off, toggles shooting
    /// allowed then disallowed to put the device in a known state, applies
    /// the configured period, and starts the poller.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the handshake fails, or
    /// one of the initialization writes fails.
    pub async fn from_port(port: DynSerial, config: &ShooterConfig) -> Result<Self> {
        config.validate()?;

        let mut driver = Self::build(wrap_shared(port), config);
        {
            let mut guard = driver.port.lock().await;
            handshake::run(&mut guard, &driver.port_name, &config.handshake()).await?;
        }

        driver.set_verbose_full(false).await?;
        driver.set_enabled(true).await?;
        driver.set_enabled(false).await?;
        if config.period_us != DEFAULT_PERIOD_US {
            driver.set_period(config.period_us).await?;
        }

        driver.poller = Some(Poller::spawn(
            driver.port.clone(),
            driver.shots_count.clone(),
            driver.timing,
            Duration::from_millis(config.poll_interval_ms),
        ));

        tracing::info!(target: LOG_TARGET, port = %driver.port_name, "shooter initialized");
        Ok(driver)
    }

    fn build(port: SharedPort, config: &ShooterConfig) -> Self {
        Self {
            port,
            port_name: config.port.clone(),
            shots_count: Arc::new(AtomicI64::new(0)),
            enable_shooting: AtomicBool::new(false),
            settings: parking_lot::Mutex::new(Settings::new(config.period_us, config.batch_count)),
            timing: config.query_timing(),
            poller: None,
        }
    }

    /// Driver on a test port, without handshake or poller.
    #[cfg(test)]
    pub(crate) fn with_test_port(port: DynSerial) -> Self {
        Self::build(wrap_shared(port), &ShooterConfig::new("test"))
    }

    /// Write one command under the gateway and apply `update` on success.
    async fn send(&self, command: Command, update: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut guard = self.port.lock().await;
        write_command(&mut guard, command).await?;
        update(&mut *self.settings.lock());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Shot counter
    // -------------------------------------------------------------------------

    /// Query the device's shot counter and refresh the cache.
    ///
    /// # Errors
    /// I/O errors (including a read timeout) and unparsable replies are
    /// returned; the cache is left unchanged.
    #[instrument(skip(self), err)]
    pub async fn get_shots_count(&self) -> Result<i64> {
        let mut guard = self.port.lock().await;
        let count = query_shots_count(&mut guard, self.timing).await?;
        self.shots_count.store(count, Ordering::Release);
        Ok(count)
    }

    /// Zero the device's shot counter. The device sends no reply.
    #[instrument(skip(self), err)]
    pub async fn reset_shots_count(&self) -> Result<()> {
        let mut guard = self.port.lock().await;
        write_command(&mut guard, Command::ResetCount).await?;
        self.shots_count.store(0, Ordering::Release);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Setters
    // -------------------------------------------------------------------------

    /// Switch the firing mode.
    #[instrument(skip(self), err)]
    pub async fn set_mode(&self, mode: FiringMode) -> Result<()> {
        self.send(Command::for_mode(mode), |s| s.mode = mode).await
    }

    /// Switch to single-shot mode (`MM`).
    pub async fn set_mode_single(&self) -> Result<()> {
        self.set_mode(FiringMode::SingleShot).await
    }

    /// Switch to external-sync mode (`ME`).
    pub async fn set_mode_external(&self) -> Result<()> {
        self.set_mode(FiringMode::ExternalSync).await
    }

    /// Switch to frequency mode (`MF`).
    pub async fn set_mode_freq(&self) -> Result<()> {
        self.set_mode(FiringMode::Frequency).await
    }

    /// Select the external trigger input.
    #[instrument(skip(self), err)]
    pub async fn set_external_source(&self, source: ExternalSource) -> Result<()> {
        self.send(Command::for_source(source), |s| s.external_source = source)
            .await
    }

    /// Trigger from input 1 (`I1`).
    pub async fn set_external_in1(&self) -> Result<()> {
        self.set_external_source(ExternalSource::In1).await
    }

    /// Trigger from input 2 (`I2`).
    pub async fn set_external_in2(&self) -> Result<()> {
        self.set_external_source(ExternalSource::In2).await
    }

    /// Verbose device output on (`VF`) or off (`VN`).
    #[instrument(skip(self), err)]
    pub async fn set_verbose_full(&self, full: bool) -> Result<()> {
        self.send(Command::for_verbose(full), |s| s.verbose = full)
            .await
    }

    /// Allow (`A`) or disallow (`D`) shooting.
    #[instrument(skip(self), err)]
    pub async fn set_enabled(&self, enable: bool) -> Result<()> {
        let mut guard = self.port.lock().await;
        write_command(&mut guard, Command::for_enable(enable)).await?;
        self.enable_shooting.store(enable, Ordering::Release);
        Ok(())
    }

    /// Set the period between shots, in microseconds.
    ///
    /// Sent as `P` followed by the decimal value in a second write.
    ///
    /// # Errors
    /// Out-of-range periods are rejected with
    /// [`ShooterError::InvalidArgument`] before anything is written.
    #[instrument(skip(self), err)]
    pub async fn set_period(&self, period_us: u32) -> Result<()> {
        check_period(period_us)?;

        let mut guard = self.port.lock().await;
        write_command(&mut guard, Command::SetPeriod).await?;
        write_raw(&mut guard, &encode_period(period_us)).await?;
        self.settings.lock().period_us = period_us;
        Ok(())
    }

    /// Set how many shots one [`ShooterDriver::shoot`] issues. Local only.
    ///
    /// # Errors
    /// Zero is rejected with [`ShooterError::InvalidArgument`].
    pub fn set_batch_count(&self, batch_count: u32) -> Result<()> {
        check_batch_count(batch_count)?;
        self.settings.lock().batch_count = batch_count;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Firing
    // -------------------------------------------------------------------------

    /// Fire one batch.
    ///
    /// Outside single-shot mode this is a no-op. Otherwise `S` is written
    /// `batch_count` times, with `period_us / 1000` whole milliseconds between
    /// shots and no delay before the first. The port is released between
    /// shots so the poller can run.
    ///
    /// # Errors
    /// - [`ShooterError::ShootingDisabled`] if shooting is not allowed
    /// - the first write error, which aborts the rest of the batch
    #[instrument(skip(self), err)]
    pub async fn shoot(&self) -> Result<()> {
        if !self.enable_shooting.load(Ordering::Acquire) {
            return Err(ShooterError::ShootingDisabled);
        }

        let Settings {
            mode,
            batch_count,
            period_us,
            ..
        } = *self.settings.lock();
        if mode != FiringMode::SingleShot {
            tracing::debug!(target: LOG_TARGET, %mode, "shoot ignored outside single-shot mode");
            return Ok(());
        }

        let spacing = shot_spacing(period_us);
        for shot in 0..batch_count {
            if shot > 0 {
                tokio::time::sleep(spacing).await;
            }
            let mut guard = self.port.lock().await;
            write_command(&mut guard, Command::Shoot).await?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Cached shot count, as last read by a query or the poller.
    pub fn shots_count(&self) -> i64 {
        self.shots_count.load(Ordering::Acquire)
    }

    /// Stored period in microseconds.
    pub fn period_us(&self) -> u32 {
        self.settings.lock().period_us
    }

    /// Shots per batch.
    pub fn batch_count(&self) -> u32 {
        self.settings.lock().batch_count
    }

    /// Current firing mode.
    pub fn mode(&self) -> FiringMode {
        self.settings.lock().mode
    }

    /// Selected external input.
    pub fn external_source(&self) -> ExternalSource {
        self.settings.lock().external_source
    }

    /// Whether shooting is allowed.
    pub fn is_enabled(&self) -> bool {
        self.enable_shooting.load(Ordering::Acquire)
    }

    /// Whether verbose device output is on.
    pub fn is_verbose(&self) -> bool {
        self.settings.lock().verbose
    }

    /// Port the driver was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Copy of the whole local state.
    pub fn snapshot(&self) -> ShooterState {
        let settings = *self.settings.lock();
        ShooterState {
            shots_count: self.shots_count(),
            enabled: self.is_enabled(),
            batch_count: settings.batch_count,
            period_us: settings.period_us,
            mode: settings.mode,
            external_source: settings.external_source,
            verbose: settings.verbose,
        }
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Stop the poller, wait for its last tick, then shut the port down.
    ///
    /// # Errors
    /// Returns the port's shutdown error, if any.
    #[instrument(skip(self), err)]
    pub async fn close(mut self) -> Result<()> {
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }

        let mut guard = self.port.lock().await;
        guard.get_mut().shutdown().await?;
        tracing::info!(target: LOG_TARGET, port = %self.port_name, "shooter closed");
        Ok(())
    }
}

impl std::fmt::Debug for ShooterDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShooterDriver")
            .field("port_name", &self.port_name)
            .field("state", &self.snapshot())
            .field("polling", &self.poller.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MAX_PERIOD_US, MIN_PERIOD_US};
    use femtolab_core::mock_serial;
    use tokio::time::Instant;

    fn driver() -> (ShooterDriver, mock_serial::MockDeviceHarness) {
        let (port, harness) = mock_serial::new();
        (ShooterDriver::with_test_port(Box::new(port)), harness)
    }

    #[test]
    fn test_config_defaults_from_toml() {
        let cfg: ShooterConfig = toml::from_str(r#"port = "/dev/ttyUSB0""#).unwrap();
        assert_eq!(cfg, ShooterConfig::new("/dev/ttyUSB0"));
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.poll_interval_ms, 200);
        assert_eq!(cfg.handshake(), HandshakeSettings::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut cfg = ShooterConfig::new("/dev/ttyUSB0");
        cfg.period_us = MAX_PERIOD_US + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = ShooterConfig::new("/dev/ttyUSB0");
        cfg.batch_count = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ShooterConfig::new("/dev/ttyUSB0");
        cfg.discard_timeout_ms = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("discard_timeout_ms"));

        assert!(ShooterConfig::new("  ").validate().is_err());
    }

    #[tokio::test]
    async fn test_set_period_in_bounds() {
        let (driver, mut harness) = driver();

        for period in [MIN_PERIOD_US, 1500, MAX_PERIOD_US] {
            driver.set_period(period).await.unwrap();
            let expected = format!("P{}", period);
            harness.expect_write(expected.as_bytes()).await;
            assert_eq!(driver.period_us(), period);
        }
    }

    #[tokio::test]
    async fn test_set_period_out_of_bounds_writes_nothing() {
        let (driver, mut harness) = driver();

        for period in [0, MAX_PERIOD_US + 1, u32::MAX] {
            let err = driver.set_period(period).await.unwrap_err();
            assert!(matches!(err, ShooterError::InvalidArgument(_)));
        }
        assert_eq!(driver.period_us(), DEFAULT_PERIOD_US);
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test]
    async fn test_shoot_disabled_writes_nothing() {
        let (driver, mut harness) = driver();

        let err = driver.shoot().await.unwrap_err();
        assert!(matches!(err, ShooterError::ShootingDisabled));
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test]
    async fn test_shoot_outside_single_shot_is_noop() {
        let (driver, mut harness) = driver();

        driver.set_enabled(true).await.unwrap();
        driver.set_mode_freq().await.unwrap();
        harness.expect_write(b"AMF").await;

        driver.shoot().await.unwrap();
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shoot_batch_spacing() {
        let (driver, mut harness) = driver();

        driver.set_enabled(true).await.unwrap();
        driver.set_period(2000).await.unwrap();
        driver.set_batch_count(3).unwrap();
        harness.expect_write(b"AP2000").await;

        let start = Instant::now();
        driver.shoot().await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(5), "elapsed {:?}", elapsed);
        assert_eq!(harness.take_pending_writes(), b"SSS");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_shot_is_immediate() {
        let (driver, mut harness) = driver();

        driver.set_enabled(true).await.unwrap();
        driver.set_period(MAX_PERIOD_US).await.unwrap();
        harness.expect_write(b"AP1000000").await;

        let start = Instant::now();
        driver.shoot().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(harness.take_pending_writes(), b"S");
    }

    #[tokio::test]
    async fn test_shoot_write_failure_aborts_batch() {
        let (port, harness) = mock_serial::new();
        let driver = ShooterDriver::with_test_port(Box::new(port));
        driver.enable_shooting.store(true, Ordering::Release);
        driver.set_batch_count(5).unwrap();
        drop(harness);

        let err = driver.shoot().await.unwrap_err();
        match err {
            ShooterError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_batch_count_rejects_zero() {
        let (driver, mut harness) = driver();

        assert!(driver.set_batch_count(0).is_err());
        assert_eq!(driver.batch_count(), 1);
        driver.set_batch_count(4).unwrap();
        assert_eq!(driver.batch_count(), 4);
        assert!(harness.take_pending_writes().is_empty());
    }

    #[tokio::test]
    async fn test_reset_zeroes_cache_without_reply() {
        let (driver, mut harness) = driver();
        driver.shots_count.store(17, Ordering::Release);

        driver.reset_shots_count().await.unwrap();

        assert_eq!(driver.shots_count(), 0);
        harness.expect_write(b"CR").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_shots_count_updates_cache() {
        let (driver, mut harness) = driver();

        let (count, ()) = tokio::join!(driver.get_shots_count(), async {
            harness.expect_and_respond(b"C?", b"42\r\n").await;
        });

        assert_eq!(count.unwrap(), 42);
        assert_eq!(driver.shots_count(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_shots_count_parse_failure_keeps_cache() {
        let (driver, mut harness) = driver();
        driver.shots_count.store(5, Ordering::Release);

        let (count, ()) = tokio::join!(driver.get_shots_count(), async {
            harness.expect_and_respond(b"C?", b"abc\r\n").await;
        });

        match count.unwrap_err() {
            ShooterError::Parse { response, .. } => assert_eq!(response, "abc\r"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(driver.shots_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_shots_count_skips_stale_line() {
        let (driver, mut harness) = driver();
        harness.send_response(b"99\r\n").unwrap();

        let (count, ()) = tokio::join!(driver.get_shots_count(), async {
            harness.expect_and_respond(b"C?", b"3\r\n").await;
        });

        assert_eq!(count.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_shots_count_timeout() {
        let (driver, mut harness) = driver();

        let (count, ()) = tokio::join!(driver.get_shots_count(), async {
            harness.expect_write(b"C?").await;
        });

        assert!(count.unwrap_err().is_timeout());
        assert_eq!(driver.shots_count(), 0);
    }

    #[tokio::test]
    async fn test_setters_update_state() {
        let (driver, mut harness) = driver();

        driver.set_mode_external().await.unwrap();
        driver.set_external_in2().await.unwrap();
        driver.set_verbose_full(true).await.unwrap();
        driver.set_enabled(true).await.unwrap();
        harness.expect_write(b"MEI2VFA").await;

        let state = driver.snapshot();
        assert_eq!(state.mode, FiringMode::ExternalSync);
        assert_eq!(state.external_source, ExternalSource::In2);
        assert!(state.verbose);
        assert!(state.enabled);

        driver.set_mode_single().await.unwrap();
        driver.set_external_in1().await.unwrap();
        driver.set_verbose_full(false).await.unwrap();
        driver.set_enabled(false).await.unwrap();
        harness.expect_write(b"MMI1VND").await;
        assert_eq!(driver.snapshot(), ShooterState::default());
    }

    #[tokio::test]
    async fn test_close_shuts_port_down_once() {
        let (driver, mut harness) = driver();
        driver.close().await.unwrap();
        assert_eq!(harness.shutdown_count(), 1);
    }
}
