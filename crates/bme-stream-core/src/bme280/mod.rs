//! BME280 driver over a [`RegisterBus`]
//!
//! The driver keeps the device record (instance id, interface kind, current
//! settings) together with the bus it talks through and the calibration
//! read at [`Bme280::init`]. Every register access goes through the bus, so
//! the driver has no knowledge of SPI peripherals, chip-select lines or timers.

pub mod calibration;
pub mod registers;
pub mod settings;

use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::bus::{BusError, RegisterBus};
use crate::sample::{FixedSample, FloatSample, MeasurementSample, OutputMode};

pub use calibration::{CalibrationData, UncompensatedData};
pub use settings::{
    Filter, Oversampling, SensorMode, Settings, SettingsSelect, StandbyTime, measurement_time_ms,
    measurement_time_us,
};

use registers::*;

/// Attempts at reading a matching chip ID before giving up.
const CHIP_ID_ATTEMPTS: usize = 5;
/// Polls of the `im_update` bit after a soft reset.
const NVM_COPY_ATTEMPTS: usize = 5;
const STARTUP_DELAY_MS: u32 = 2;
/// Largest number of registers written in one burst.
const MAX_BURST: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bme280Error {
    #[error("Bus error: {0}")]
    Bus(BusError),
    #[error("BME280 not found (last chip id read: {chip_id:?})")]
    DeviceNotFound { chip_id: Option<u8> },
    #[error("NVM copy did not complete after soft reset")]
    NvmCopyFailed,
    #[error("Calibration data not loaded, call init first")]
    NotInitialized,
}

impl From<BusError> for Bme280Error {
    fn from(value: BusError) -> Self {
        Self::Bus(value)
    }
}

/// Physical interface the device is wired through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Spi,
}

/// Operating state of one sensor as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Identity of the physical device instance on the bus
    pub dev_id: u8,
    pub interface: Interface,
    /// Settings committed by the next [`Bme280::set_sensor_settings`]
    pub settings: Settings,
}

/// A BME280 reached through `B`.
pub struct Bme280<B> {
    config: DeviceConfig,
    bus: B,
    calibration: Option<CalibrationData>,
}

impl<B: RegisterBus> Bme280<B> {
    /// Create a driver for an SPI-attached device. No bus traffic happens
    /// until [`Bme280::init`].
    pub fn new(bus: B, dev_id: u8) -> Self {
        Self {
            config: DeviceConfig {
                dev_id,
                interface: Interface::Spi,
                settings: Settings::reset(),
            },
            bus,
            calibration: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Settings to be written by the next commit.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.config.settings
    }

    pub fn calibration(&self) -> Option<&CalibrationData> {
        self.calibration.as_ref()
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Wait through the bus' delay primitive.
    pub async fn delay_ms(&mut self, ms: u32) {
        self.bus.delay_ms(ms).await;
    }

    /// Identify the sensor, soft-reset it and load its calibration.
    ///
    /// The chip ID is read up to five times, 1 ms apart. Transport errors
    /// during identification count as failed attempts, so a dead bus is
    /// reported as [`Bme280Error::DeviceNotFound`].
    pub async fn init(&mut self) -> Result<(), Bme280Error> {
        let mut last_id = None;

        for attempt in 1..=CHIP_ID_ATTEMPTS {
            let mut id = [0u8; 1];
            match self.get_regs(CHIP_ID_ADDR, &mut id).await {
                Ok(()) if id[0] == CHIP_ID => {
                    info!("BME280 detected on device {}", self.config.dev_id);
                    self.soft_reset().await?;
                    self.read_calibration().await?;
                    return Ok(());
                }
                Ok(()) => {
                    warn!("Unexpected chip id {:#04x} (attempt {})", id[0], attempt);
                    last_id = Some(id[0]);
                }
                Err(e) => {
                    warn!("Chip id read failed (attempt {}): {}", attempt, e);
                    last_id = None;
                }
            }
            self.bus.delay_ms(1).await;
        }

        Err(Bme280Error::DeviceNotFound { chip_id: last_id })
    }

    /// Full power-on reset, then wait for the NVM calibration copy to finish.
    pub async fn soft_reset(&mut self) -> Result<(), Bme280Error> {
        self.set_regs(&[(RESET_ADDR, SOFT_RESET_CMD)]).await?;

        for _ in 0..NVM_COPY_ATTEMPTS {
            self.bus.delay_ms(STARTUP_DELAY_MS).await;
            let mut status = [0u8; 1];
            self.get_regs(STATUS_ADDR, &mut status).await?;
            if status[0] & STATUS_IM_UPDATE == 0 {
                return Ok(());
            }
        }

        Err(Bme280Error::NvmCopyFailed)
    }

    async fn read_calibration(&mut self) -> Result<(), Bme280Error> {
        let mut tp = [0u8; TEMP_PRESS_CALIB_LEN];
        let mut h = [0u8; HUMIDITY_CALIB_LEN];
        self.get_regs(TEMP_PRESS_CALIB_ADDR, &mut tp).await?;
        self.get_regs(HUMIDITY_CALIB_ADDR, &mut h).await?;

        let calibration = CalibrationData::parse(&tp, &h);
        debug!("Calibration: {:?}", calibration);
        self.calibration = Some(calibration);
        Ok(())
    }

    /// Write the groups in `select` from the device record's settings.
    ///
    /// Settings can only be changed in sleep mode, so a running device is put
    /// to sleep first.
    pub async fn set_sensor_settings(&mut self, select: SettingsSelect) -> Result<(), Bme280Error> {
        let settings = self.config.settings;

        if self.get_sensor_mode().await? != SensorMode::Sleep {
            self.put_device_to_sleep().await?;
        }

        self.write_settings(&settings, select).await
    }

    /// Read the control registers back and refresh the device record.
    pub async fn get_sensor_settings(&mut self) -> Result<Settings, Bme280Error> {
        let settings = self.read_settings().await?;
        self.config.settings = settings;
        Ok(settings)
    }

    async fn read_settings(&mut self) -> Result<Settings, Bme280Error> {
        let mut regs = [0u8; SETTINGS_LEN];
        self.get_regs(CTRL_HUM_ADDR, &mut regs).await?;

        // regs[1] is the status register
        let [ctrl_hum, _, ctrl_meas, config] = regs;
        let settings = Settings {
            osr_h: Oversampling::from_bits(ctrl_hum & CTRL_HUM_MSK),
            osr_p: Oversampling::from_bits(get_bits(ctrl_meas, CTRL_PRESS_MSK, CTRL_PRESS_POS)),
            osr_t: Oversampling::from_bits(get_bits(ctrl_meas, CTRL_TEMP_MSK, CTRL_TEMP_POS)),
            filter: Filter::from_bits(get_bits(config, FILTER_MSK, FILTER_POS)),
            standby_time: StandbyTime::from_bits(get_bits(config, STANDBY_MSK, STANDBY_POS)),
        };
        Ok(settings)
    }

    /// Switch power mode. `Forced` starts exactly one measurement cycle.
    pub async fn set_sensor_mode(&mut self, mode: SensorMode) -> Result<(), Bme280Error> {
        if self.get_sensor_mode().await? != SensorMode::Sleep {
            self.put_device_to_sleep().await?;
        }

        let mut ctrl_meas = [0u8; 1];
        self.get_regs(CTRL_MEAS_ADDR, &mut ctrl_meas).await?;
        let ctrl_meas = set_bits(ctrl_meas[0], SENSOR_MODE_MSK, 0, mode.bits());
        self.set_regs(&[(CTRL_MEAS_ADDR, ctrl_meas)]).await
    }

    pub async fn get_sensor_mode(&mut self) -> Result<SensorMode, Bme280Error> {
        let mut ctrl_meas = [0u8; 1];
        self.get_regs(CTRL_MEAS_ADDR, &mut ctrl_meas).await?;
        Ok(SensorMode::from_bits(ctrl_meas[0] & SENSOR_MODE_MSK))
    }

    /// Read and compensate one sample in the representation `mode` asks for.
    pub async fn get_sensor_data(
        &mut self,
        mode: OutputMode,
    ) -> Result<MeasurementSample, Bme280Error> {
        Ok(match mode {
            OutputMode::Fixed => self.get_sensor_data_fixed().await?.into(),
            OutputMode::Float => self.get_sensor_data_float().await?.into(),
        })
    }

    pub async fn get_sensor_data_fixed(&mut self) -> Result<FixedSample, Bme280Error> {
        let (calibration, raw) = self.read_uncompensated().await?;
        Ok(calibration.compensate_fixed(&raw))
    }

    pub async fn get_sensor_data_float(&mut self) -> Result<FloatSample, Bme280Error> {
        let (calibration, raw) = self.read_uncompensated().await?;
        Ok(calibration.compensate_float(&raw))
    }

    async fn read_uncompensated(
        &mut self,
    ) -> Result<(CalibrationData, UncompensatedData), Bme280Error> {
        let calibration = self.calibration.ok_or(Bme280Error::NotInitialized)?;

        let mut data = [0u8; DATA_LEN];
        self.get_regs(DATA_ADDR, &mut data).await?;
        Ok((calibration, UncompensatedData::parse(&data)))
    }

    /// Soft reset loses the control registers, so they are read first and
    /// written back afterwards.
    async fn put_device_to_sleep(&mut self) -> Result<(), Bme280Error> {
        let settings = self.read_settings().await?;
        self.soft_reset().await?;
        self.write_settings(&settings, SettingsSelect::ALL).await
    }

    async fn write_settings(
        &mut self,
        settings: &Settings,
        select: SettingsSelect,
    ) -> Result<(), Bme280Error> {
        let hum = select.contains(SettingsSelect::OSR_HUM);
        let press_temp = select.intersects(SettingsSelect::OSR_PRESS | SettingsSelect::OSR_TEMP);

        if hum || press_temp {
            let mut ctrl_meas = [0u8; 1];
            self.get_regs(CTRL_MEAS_ADDR, &mut ctrl_meas).await?;
            let mut ctrl_meas = ctrl_meas[0];

            if select.contains(SettingsSelect::OSR_PRESS) {
                let osr_p = settings.osr_p.bits();
                ctrl_meas = set_bits(ctrl_meas, CTRL_PRESS_MSK, CTRL_PRESS_POS, osr_p);
            }
            if select.contains(SettingsSelect::OSR_TEMP) {
                let osr_t = settings.osr_t.bits();
                ctrl_meas = set_bits(ctrl_meas, CTRL_TEMP_MSK, CTRL_TEMP_POS, osr_t);
            }

            if hum {
                // ctrl_hum only takes effect after a write to ctrl_meas
                let ctrl_hum = settings.osr_h.bits() & CTRL_HUM_MSK;
                self.set_regs(&[(CTRL_HUM_ADDR, ctrl_hum), (CTRL_MEAS_ADDR, ctrl_meas)])
                    .await?;
            } else {
                self.set_regs(&[(CTRL_MEAS_ADDR, ctrl_meas)]).await?;
            }
        }

        if select.intersects(SettingsSelect::FILTER | SettingsSelect::STANDBY) {
            let mut config = [0u8; 1];
            self.get_regs(CONFIG_ADDR, &mut config).await?;
            let mut config = config[0];

            if select.contains(SettingsSelect::FILTER) {
                config = set_bits(config, FILTER_MSK, FILTER_POS, settings.filter.bits());
            }
            if select.contains(SettingsSelect::STANDBY) {
                let t_sb = settings.standby_time.bits();
                config = set_bits(config, STANDBY_MSK, STANDBY_POS, t_sb);
            }
            self.set_regs(&[(CONFIG_ADDR, config)]).await?;
        }

        Ok(())
    }

    async fn get_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Bme280Error> {
        self.bus
            .read(self.config.dev_id, reg | SPI_READ_BIT, buf)
            .await?;
        Ok(())
    }

    /// Write `(register, value)` pairs in one transaction.
    ///
    /// SPI bursts are not auto-incrementing, so every value after the first is
    /// preceded by its own register address: `v0, a1, v1, a2, v2, ...`.
    async fn set_regs(&mut self, pairs: &[(u8, u8)]) -> Result<(), Bme280Error> {
        let Some(&(first_reg, first_value)) = pairs.first() else {
            return Ok(());
        };
        debug_assert!(pairs.len() <= MAX_BURST);

        let mut buf = [0u8; 2 * MAX_BURST - 1];
        buf[0] = first_value;
        let mut len = 1;
        for &(reg, value) in pairs.iter().skip(1).take(MAX_BURST - 1) {
            buf[len] = reg & SPI_WRITE_MASK;
            buf[len + 1] = value;
            len += 2;
        }

        self.bus
            .write(self.config.dev_id, first_reg & SPI_WRITE_MASK, &buf[..len])
            .await?;
        Ok(())
    }
}
