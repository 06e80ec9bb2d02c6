//! Sensor session: the acquisition loop
//!
//! One [`SensorSession`] owns the single BME280 device record. It walks
//! through these states:
//!
//! | State         | Entered by                                   |
//! |---------------|----------------------------------------------|
//! | Uninitialized | [`SensorSession::new`]                       |
//! | Configured    | successful [`SensorSession::initialize`], or a stopped run |
//! | Running       | [`SensorSession::run`]                       |
//! | Halted        | retry budget exhausted or serial failure     |
//!
//! Each cycle triggers a forced measurement, waits the acquisition interval,
//! reads the compensated sample back, and transmits it as one text line.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embedded_io_async::{Error as _, ErrorKind, Write};
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::bme280::{Bme280, Bme280Error, SensorMode, SettingsSelect};
use crate::bus::RegisterBus;
use crate::config::SessionConfig;
use crate::format::{format_sample, transmit};
use crate::sample::MeasurementSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Configured,
    Running,
    Halted,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("Sensor startup failed: {0}")]
    Startup(Bme280Error),
    #[error("Session is {0:?}, expected Configured")]
    InvalidState(SessionState),
    #[error("Committing sensor settings failed: {0}")]
    Settings(Bme280Error),
    #[error("Acquisition failed after {attempts} attempts: {error}")]
    AcquisitionFailed { attempts: u8, error: Bme280Error },
    #[error("Serial write failed: {0:?}")]
    Serial(ErrorKind),
}

pub struct SensorSession<B> {
    device: Bme280<B>,
    config: SessionConfig,
    interval_ms: u32,
    state: SessionState,
}

impl<B: RegisterBus> SensorSession<B> {
    pub fn new(bus: B, config: SessionConfig) -> Self {
        Self {
            device: Bme280::new(bus, config.dev_id),
            interval_ms: config.effective_interval_ms(),
            config,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wait applied between trigger and read-back.
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn device(&self) -> &Bme280<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Bme280<B> {
        &mut self.device
    }

    /// Detect the sensor and load its calibration.
    ///
    /// Also valid from `Halted`, so a caller can try to bring the sensor
    /// back after a transport outage.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Running {
            return Err(SessionError::InvalidState(self.state));
        }

        self.device.init().await.map_err(|e| {
            error!("BME280 initialization failed: {}", e);
            SessionError::Startup(e)
        })?;

        info!(
            "Session configured: {} output, {} ms interval",
            self.config.output_mode.label(),
            self.interval_ms
        );
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Stream samples to `out` until `stop` is signalled.
    ///
    /// Settings are committed once before the first cycle, under the same
    /// attempt budget as acquisition. The stop signal is checked at the top of
    /// every cycle; a stopped loop returns the number of lines produced and
    /// leaves the session `Configured`.
    pub async fn run<W: Write, M: RawMutex>(
        &mut self,
        out: &mut W,
        stop: &Signal<M, ()>,
    ) -> Result<u32, SessionError> {
        if self.state != SessionState::Configured {
            return Err(SessionError::InvalidState(self.state));
        }

        if let Err(e) = self.commit_settings_with_retry().await {
            self.state = SessionState::Halted;
            return Err(e);
        }

        self.state = SessionState::Running;
        let mut cycles = 0u32;

        loop {
            if stop.try_take().is_some() {
                info!("Stop requested after {} cycles", cycles);
                self.state = SessionState::Configured;
                return Ok(cycles);
            }

            let sample = match self.acquire_with_retry().await {
                Ok(sample) => sample,
                Err(e) => {
                    self.state = SessionState::Halted;
                    return Err(e);
                }
            };

            match format_sample(&sample) {
                Ok(line) => {
                    if let Err(e) = transmit(out, &line).await {
                        error!("Serial write failed: {:?}", e);
                        self.state = SessionState::Halted;
                        return Err(SessionError::Serial(e.kind()));
                    }
                }
                Err(e) => warn!("Skipping sample {:?}: {}", sample, e),
            }

            cycles = cycles.wrapping_add(1);
        }
    }

    /// One forced-mode cycle: trigger, wait, read back. No retry.
    pub async fn acquire(&mut self) -> Result<MeasurementSample, Bme280Error> {
        self.device.set_sensor_mode(SensorMode::Forced).await?;
        self.device.delay_ms(self.interval_ms).await;
        self.device.get_sensor_data(self.config.output_mode).await
    }

    async fn commit_settings_with_retry(&mut self) -> Result<(), SessionError> {
        let select = SettingsSelect::OSR_PRESS
            | SettingsSelect::OSR_TEMP
            | SettingsSelect::OSR_HUM
            | SettingsSelect::FILTER;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            *self.device.settings_mut() = self.config.settings;
            match self.device.set_sensor_settings(select).await {
                Ok(()) => return Ok(()),
                Err(error) if attempt >= max_attempts => {
                    error!("Failed to commit sensor settings: {}", error);
                    return Err(SessionError::Settings(error));
                }
                Err(error) => {
                    warn!(
                        "Settings commit attempt {}/{} failed: {}",
                        attempt, max_attempts, error
                    );
                    attempt += 1;
                }
            }
        }
    }

    async fn acquire_with_retry(&mut self) -> Result<MeasurementSample, SessionError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.acquire().await {
                Ok(sample) => return Ok(sample),
                Err(error) if attempt >= max_attempts => {
                    error!("Acquisition failed {} times, halting: {}", attempt, error);
                    return Err(SessionError::AcquisitionFailed {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) => {
                    warn!(
                        "Acquisition attempt {}/{} failed: {}",
                        attempt, max_attempts, error
                    );
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bme280::registers::{
        CTRL_MEAS_ADDR, DATA_ADDR, SENSOR_MODE_MSK, SPI_READ_BIT, SPI_WRITE_MASK,
    };
    use crate::bus::BusError;
    use crate::sample::OutputMode;
    use crate::sim::SimulatedBme280;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_hal::spi::ErrorKind as SpiErrorKind;

    /// Simulated sensor whose forced-mode trigger write fails `failures` times.
    struct FlakyTrigger {
        sim: SimulatedBme280,
        failures: usize,
    }

    impl RegisterBus for FlakyTrigger {
        async fn delay_ms(&mut self, ms: u32) {
            self.sim.delay_ms(ms).await
        }

        async fn read(&mut self, dev_id: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
            self.sim.read(dev_id, reg, buf).await
        }

        async fn write(&mut self, dev_id: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
            let trigger = reg == (CTRL_MEAS_ADDR & SPI_WRITE_MASK)
                && data.first().is_some_and(|v| v & SENSOR_MODE_MSK == 0b01);
            if trigger && self.failures > 0 {
                self.failures -= 1;
                return Err(BusError::Spi(SpiErrorKind::ModeFault));
            }
            self.sim.write(dev_id, reg, data).await
        }
    }

    /// Simulated sensor whose measurement burst read fails `failures` times.
    struct FlakyDataRead {
        sim: SimulatedBme280,
        failures: usize,
    }

    impl RegisterBus for FlakyDataRead {
        async fn delay_ms(&mut self, ms: u32) {
            self.sim.delay_ms(ms).await
        }

        async fn read(&mut self, dev_id: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
            if reg == (DATA_ADDR | SPI_READ_BIT) && self.failures > 0 {
                self.failures -= 1;
                return Err(BusError::Spi(SpiErrorKind::Overrun));
            }
            self.sim.read(dev_id, reg, buf).await
        }

        async fn write(&mut self, dev_id: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
            self.sim.write(dev_id, reg, data).await
        }
    }

    /// Collects flushed lines and raises `stop` once `limit` lines arrived.
    struct StopAfter<'a> {
        lines: Vec<String>,
        pending: Vec<u8>,
        limit: usize,
        stop: &'a Signal<NoopRawMutex, ()>,
    }

    impl<'a> StopAfter<'a> {
        fn new(limit: usize, stop: &'a Signal<NoopRawMutex, ()>) -> Self {
            Self {
                lines: Vec::new(),
                pending: Vec::new(),
                limit,
                stop,
            }
        }
    }

    impl embedded_io_async::ErrorType for StopAfter<'_> {
        type Error = core::convert::Infallible;
    }

    impl Write for StopAfter<'_> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            let line = String::from_utf8(core::mem::take(&mut self.pending)).unwrap();
            self.lines.push(line);
            if self.lines.len() == self.limit {
                self.stop.signal(());
            }
            Ok(())
        }
    }

    struct UnpluggedPort;

    impl embedded_io_async::ErrorType for UnpluggedPort {
        type Error = ErrorKind;
    }

    impl Write for UnpluggedPort {
        async fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
            Err(ErrorKind::BrokenPipe)
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn configured(config: SessionConfig) -> SensorSession<SimulatedBme280> {
        let mut session = SensorSession::new(SimulatedBme280::new(), config);
        block_on(session.initialize()).unwrap();
        session
    }

    #[test]
    fn test_initialize_fails_on_dead_transport_before_any_acquisition() {
        let mut sim = SimulatedBme280::new();
        sim.fail_all_reads(true);
        let mut session = SensorSession::new(sim, SessionConfig::default());

        let err = block_on(session.initialize()).unwrap_err();

        assert_eq!(
            err,
            SessionError::Startup(Bme280Error::DeviceNotFound { chip_id: None })
        );
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.device().bus().forced_triggers(), 0);
        assert_eq!(session.device().bus().write_count(), 0);
    }

    #[test]
    fn test_run_requires_initialize() {
        let mut session = SensorSession::new(SimulatedBme280::new(), SessionConfig::default());
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(1, &stop);

        assert_eq!(
            block_on(session.run(&mut out, &stop)),
            Err(SessionError::InvalidState(SessionState::Uninitialized))
        );
        assert!(out.lines.is_empty());
    }

    #[test]
    fn test_run_stops_after_signalled_cycle_count() {
        let mut session = configured(SessionConfig::default());
        let delay_before = session.device().bus().total_delay_ms();
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(3, &stop);

        let cycles = block_on(session.run(&mut out, &stop)).unwrap();

        assert_eq!(cycles, 3);
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.device().bus().forced_triggers(), 3);
        assert_eq!(session.device().bus().total_delay_ms() - delay_before, 3 * 1000);
        assert_eq!(out.lines.len(), 3);
        for line in &out.lines {
            assert!(line.starts_with("25.08 *C, "), "{line}");
            assert!(line.ends_with(" %rH, 1006 mBar"), "{line}");
        }
    }

    #[test]
    fn test_run_commits_reference_settings() {
        let mut session = configured(SessionConfig::default());
        let stop = Signal::<NoopRawMutex, ()>::new();
        stop.signal(());
        let mut out = StopAfter::new(1, &stop);

        assert_eq!(block_on(session.run(&mut out, &stop)), Ok(0));

        let settings = block_on(session.device_mut().get_sensor_settings()).unwrap();
        assert_eq!(settings, SessionConfig::default().settings);
        assert!(out.lines.is_empty());
    }

    #[test]
    fn test_float_mode_lines() {
        let config = SessionConfig {
            output_mode: OutputMode::Float,
            ..SessionConfig::default()
        };
        let mut session = configured(config);
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(1, &stop);

        block_on(session.run(&mut out, &stop)).unwrap();

        assert!(out.lines[0].starts_with("25.08, 100653.2"), "{}", out.lines[0]);
    }

    #[test]
    fn test_acquire_single_shot() {
        let mut session = configured(SessionConfig::default());
        let stop = Signal::<NoopRawMutex, ()>::new();
        stop.signal(());
        let mut out = StopAfter::new(1, &stop);
        block_on(session.run(&mut out, &stop)).unwrap();

        match block_on(session.acquire()).unwrap() {
            MeasurementSample::Fixed(sample) => assert_eq!(sample.temperature, 2508),
            other => panic!("expected fixed sample, got {:?}", other),
        }
    }

    #[test]
    fn test_transient_trigger_failures_are_retried() {
        let bus = FlakyTrigger {
            sim: SimulatedBme280::new(),
            failures: 2,
        };
        let mut session = SensorSession::new(bus, SessionConfig::default());
        block_on(session.initialize()).unwrap();
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(2, &stop);

        assert_eq!(block_on(session.run(&mut out, &stop)), Ok(2));
        assert_eq!(session.device().bus().sim.forced_triggers(), 2);
    }

    #[test]
    fn test_transient_data_read_failures_are_retried() {
        let bus = FlakyDataRead {
            sim: SimulatedBme280::new(),
            failures: 2,
        };
        let mut session = SensorSession::new(bus, SessionConfig::default());
        block_on(session.initialize()).unwrap();
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(2, &stop);

        assert_eq!(block_on(session.run(&mut out, &stop)), Ok(2));
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.device().bus().failures, 0);
        // Every attempt triggers a fresh conversion
        assert_eq!(session.device().bus().sim.forced_triggers(), 4);
        assert_eq!(out.lines.len(), 2);
    }

    #[test]
    fn test_transient_settings_commit_failure_is_retried() {
        let mut session = configured(SessionConfig::default());
        session.device_mut().bus_mut().fail_next_reads(1);
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(1, &stop);

        assert_eq!(block_on(session.run(&mut out, &stop)), Ok(1));
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn test_settings_commit_failure_halts_until_reinitialized() {
        let mut session = configured(SessionConfig::default());
        session.device_mut().bus_mut().fail_all_reads(true);
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(1, &stop);

        assert_eq!(
            block_on(session.run(&mut out, &stop)),
            Err(SessionError::Settings(Bme280Error::Bus(BusError::Spi(
                SpiErrorKind::Other
            ))))
        );
        assert_eq!(session.state(), SessionState::Halted);
        assert_eq!(session.device().bus().forced_triggers(), 0);
        assert!(out.lines.is_empty());

        session.device_mut().bus_mut().fail_all_reads(false);
        block_on(session.initialize()).unwrap();
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(block_on(session.run(&mut out, &stop)), Ok(1));
    }

    #[test]
    fn test_persistent_failure_halts_session() {
        let bus = FlakyTrigger {
            sim: SimulatedBme280::new(),
            failures: usize::MAX,
        };
        let mut session = SensorSession::new(bus, SessionConfig::default());
        block_on(session.initialize()).unwrap();
        let stop = Signal::<NoopRawMutex, ()>::new();
        let mut out = StopAfter::new(1, &stop);

        let err = block_on(session.run(&mut out, &stop)).unwrap_err();

        assert_eq!(
            err,
            SessionError::AcquisitionFailed {
                attempts: 3,
                error: Bme280Error::Bus(BusError::Spi(SpiErrorKind::ModeFault)),
            }
        );
        assert_eq!(session.state(), SessionState::Halted);
        assert!(out.lines.is_empty());

        // A halted session refuses to run until re-initialized
        assert_eq!(
            block_on(session.run(&mut out, &stop)),
            Err(SessionError::InvalidState(SessionState::Halted))
        );
    }

    #[test]
    fn test_serial_failure_halts_session() {
        let mut session = configured(SessionConfig::default());
        let stop = Signal::<NoopRawMutex, ()>::new();

        assert_eq!(
            block_on(session.run(&mut UnpluggedPort, &stop)),
            Err(SessionError::Serial(ErrorKind::BrokenPipe))
        );
        assert_eq!(session.state(), SessionState::Halted);
    }
}
