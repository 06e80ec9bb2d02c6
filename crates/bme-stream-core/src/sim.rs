//! Simulated BME280 for tests and the desktop simulator
//!
//! [`SimulatedBme280`] answers the SPI register protocol from a 256-byte
//! register file loaded with the datasheet calibration example. Forced-mode
//! triggers latch a configurable raw reading into the data registers and fall
//! back to sleep, like the real part. Failures can be injected on reads.

use embedded_hal::spi::ErrorKind;

use crate::bme280::UncompensatedData;
use crate::bme280::registers::{
    CHIP_ID, CHIP_ID_ADDR, CONFIG_ADDR, CTRL_HUM_ADDR, CTRL_HUM_MSK, CTRL_MEAS_ADDR,
    CTRL_PRESS_MSK, CTRL_TEMP_MSK, DATA_ADDR, DATA_LEN, HUMIDITY_CALIB_ADDR, HUMIDITY_CALIB_LEN,
    RESET_ADDR, SENSOR_MODE_MSK, SOFT_RESET_CMD, STATUS_ADDR, STATUS_IM_UPDATE,
    TEMP_PRESS_CALIB_ADDR, TEMP_PRESS_CALIB_LEN,
};
use crate::bus::{BusError, RegisterBus};

/// Raw reading from the datasheet compensation example (25.08 °C,
/// 100653.27 Pa) plus a humidity count worth about 55 %rH.
pub const DATASHEET_RAW: UncompensatedData = UncompensatedData {
    pressure: 415_148,
    temperature: 519_888,
    humidity: 30_000,
};

/// Value of a skipped 20-bit channel.
const SKIPPED_20BIT: u32 = 0x8_0000;
/// Value of a skipped humidity channel.
const SKIPPED_16BIT: u32 = 0x8000;

const MAX_RECORDED_WRITE: usize = 8;

/// Calibration block at 0x88..=0xA1 for the datasheet example part.
pub fn temp_press_calibration_block() -> [u8; TEMP_PRESS_CALIB_LEN] {
    let words: [i32; 12] = [
        27504, 26435, -1000, 36477, -10685, 3024, 2855, 140, -7, 15500, -14600, 6000,
    ];

    let mut block = [0u8; TEMP_PRESS_CALIB_LEN];
    for (i, word) in words.iter().enumerate() {
        let bytes = (*word as u16).to_le_bytes();
        block[i * 2] = bytes[0];
        block[i * 2 + 1] = bytes[1];
    }
    // dig_H1, 0xA0 stays unused
    block[25] = 75;
    block
}

/// Calibration block at 0xE1..=0xE7: H2 = 362, H3 = 0, H4 = 313, H5 = 50, H6 = 30.
pub fn humidity_calibration_block() -> [u8; HUMIDITY_CALIB_LEN] {
    [0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E]
}

/// Register-level BME280 model implementing [`RegisterBus`].
pub struct SimulatedBme280 {
    regs: [u8; 256],
    raw: UncompensatedData,
    drift_step: Option<u32>,
    fail_all_reads: bool,
    fail_next_reads: usize,
    nvm_copy_stuck: bool,
    read_count: usize,
    write_count: usize,
    reset_count: usize,
    forced_triggers: usize,
    total_delay_ms: u64,
    last_write: [u8; MAX_RECORDED_WRITE],
    last_write_len: usize,
}

impl Default for SimulatedBme280 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBme280 {
    pub fn new() -> Self {
        let mut sim = Self {
            regs: [0; 256],
            raw: DATASHEET_RAW,
            drift_step: None,
            fail_all_reads: false,
            fail_next_reads: 0,
            nvm_copy_stuck: false,
            read_count: 0,
            write_count: 0,
            reset_count: 0,
            forced_triggers: 0,
            total_delay_ms: 0,
            last_write: [0; MAX_RECORDED_WRITE],
            last_write_len: 0,
        };

        sim.regs[CHIP_ID_ADDR as usize] = CHIP_ID;
        let tp = TEMP_PRESS_CALIB_ADDR as usize;
        sim.regs[tp..tp + TEMP_PRESS_CALIB_LEN].copy_from_slice(&temp_press_calibration_block());
        let h = HUMIDITY_CALIB_ADDR as usize;
        sim.regs[h..h + HUMIDITY_CALIB_LEN].copy_from_slice(&humidity_calibration_block());
        // Data registers power up holding the "skipped" pattern
        sim.latch(SKIPPED_20BIT, SKIPPED_20BIT, SKIPPED_16BIT);
        sim
    }

    /// Vary the raw reading slightly on every forced measurement.
    pub fn with_drift(mut self) -> Self {
        self.drift_step = Some(0);
        self
    }

    /// Raw ADC values latched by the next measurement.
    pub fn set_raw(&mut self, raw: UncompensatedData) {
        self.raw = raw;
    }

    pub fn set_chip_id(&mut self, id: u8) {
        self.regs[CHIP_ID_ADDR as usize] = id;
    }

    pub fn fail_all_reads(&mut self, fail: bool) {
        self.fail_all_reads = fail;
    }

    /// Fail the next `count` reads, then recover.
    pub fn fail_next_reads(&mut self, count: usize) {
        self.fail_next_reads = count;
    }

    /// Keep the `im_update` status bit set forever.
    pub fn set_nvm_copy_stuck(&mut self, stuck: bool) {
        self.nvm_copy_stuck = stuck;
    }

    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// Bus transactions that carried data; empty writes are not counted.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    pub fn forced_triggers(&self) -> usize {
        self.forced_triggers
    }

    pub fn total_delay_ms(&self) -> u64 {
        self.total_delay_ms
    }

    /// Data phase of the most recent write transaction.
    pub fn last_write(&self) -> &[u8] {
        &self.last_write[..self.last_write_len]
    }

    pub fn register(&self, addr: u8) -> u8 {
        self.regs[addr as usize]
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        match addr {
            RESET_ADDR if value == SOFT_RESET_CMD => {
                self.regs[CTRL_HUM_ADDR as usize] = 0;
                self.regs[CTRL_MEAS_ADDR as usize] = 0;
                self.regs[CONFIG_ADDR as usize] = 0;
                self.reset_count += 1;
            }
            CTRL_HUM_ADDR => self.regs[addr as usize] = value & CTRL_HUM_MSK,
            CTRL_MEAS_ADDR => {
                self.regs[addr as usize] = value;
                if matches!(value & SENSOR_MODE_MSK, 0b01 | 0b10) {
                    self.measure();
                    self.regs[addr as usize] = value & !SENSOR_MODE_MSK;
                }
            }
            CONFIG_ADDR => self.regs[addr as usize] = value,
            // Read-only
            _ => {}
        }
    }

    fn measure(&mut self) {
        self.forced_triggers += 1;

        let mut raw = self.raw;
        if let Some(step) = self.drift_step.as_mut() {
            let phase = (*step % 40) as i32;
            let tri = if phase < 20 { phase } else { 40 - phase } - 10;
            raw.temperature = raw.temperature.saturating_add_signed(tri * 150);
            raw.pressure = raw.pressure.saturating_add_signed(tri * 40);
            raw.humidity = raw.humidity.saturating_add_signed(tri * 120);
            *step += 1;
        }

        let ctrl_meas = self.regs[CTRL_MEAS_ADDR as usize];
        let pressure = if ctrl_meas & CTRL_PRESS_MSK == 0 {
            SKIPPED_20BIT
        } else {
            raw.pressure
        };
        let temperature = if ctrl_meas & CTRL_TEMP_MSK == 0 {
            SKIPPED_20BIT
        } else {
            raw.temperature
        };
        let humidity = if self.regs[CTRL_HUM_ADDR as usize] == 0 {
            SKIPPED_16BIT
        } else {
            raw.humidity
        };
        self.latch(pressure, temperature, humidity);
    }

    fn latch(&mut self, pressure: u32, temperature: u32, humidity: u32) {
        let data: [u8; DATA_LEN] = [
            (pressure >> 12) as u8,
            (pressure >> 4) as u8,
            ((pressure & 0xF) << 4) as u8,
            (temperature >> 12) as u8,
            (temperature >> 4) as u8,
            ((temperature & 0xF) << 4) as u8,
            (humidity >> 8) as u8,
            humidity as u8,
        ];
        let start = DATA_ADDR as usize;
        self.regs[start..start + DATA_LEN].copy_from_slice(&data);
    }
}

/// In SPI mode bit 7 carries read/write; every register lives at 0x80 and up.
fn memory_address(reg: u8) -> u8 {
    reg | 0x80
}

impl RegisterBus for SimulatedBme280 {
    async fn delay_ms(&mut self, ms: u32) {
        self.total_delay_ms += ms as u64;
    }

    async fn read(&mut self, _dev_id: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        if self.fail_all_reads || self.fail_next_reads > 0 {
            self.fail_next_reads = self.fail_next_reads.saturating_sub(1);
            return Err(BusError::Spi(ErrorKind::Other));
        }
        self.read_count += 1;

        let start = memory_address(reg) as usize;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = match start + i {
                addr if addr == STATUS_ADDR as usize && self.nvm_copy_stuck => STATUS_IM_UPDATE,
                addr if addr < self.regs.len() => self.regs[addr],
                _ => 0,
            };
        }
        Ok(())
    }

    async fn write(&mut self, _dev_id: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let Some((&first, rest)) = data.split_first() else {
            return Ok(());
        };
        self.write_count += 1;
        self.last_write_len = data.len().min(MAX_RECORDED_WRITE);
        self.last_write[..self.last_write_len].copy_from_slice(&data[..self.last_write_len]);

        self.write_register(memory_address(reg), first);
        for pair in rest.chunks_exact(2) {
            self.write_register(memory_address(pair[0]), pair[1]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_burst_write_is_deinterleaved() {
        let mut sim = SimulatedBme280::new();

        // ctrl_hum = x1, then ctrl_meas = T x2 / P x16 / sleep
        block_on(sim.write(0, 0x72, &[0x01, 0x74, 0x54])).unwrap();

        assert_eq!(sim.register(CTRL_HUM_ADDR), 0x01);
        assert_eq!(sim.register(CTRL_MEAS_ADDR), 0x54);
        assert_eq!(sim.forced_triggers(), 0);
    }

    #[test]
    fn test_forced_trigger_latches_raw_and_returns_to_sleep() {
        let mut sim = SimulatedBme280::new();
        block_on(sim.write(0, 0x72, &[0x01, 0x74, 0x55])).unwrap();

        assert_eq!(sim.forced_triggers(), 1);
        assert_eq!(sim.register(CTRL_MEAS_ADDR) & SENSOR_MODE_MSK, 0);

        let mut data = [0u8; DATA_LEN];
        block_on(sim.read(0, DATA_ADDR, &mut data)).unwrap();
        assert_eq!(data, [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30]);
    }

    #[test]
    fn test_skipped_channels_read_reset_pattern() {
        let mut sim = SimulatedBme280::new();
        // Temperature only, forced
        block_on(sim.write(0, 0x74, &[0x21])).unwrap();

        let mut data = [0u8; DATA_LEN];
        block_on(sim.read(0, DATA_ADDR, &mut data)).unwrap();
        assert_eq!(&data[0..3], &[0x80, 0x00, 0x00]);
        assert_eq!(&data[6..8], &[0x80, 0x00]);
    }

    #[test]
    fn test_transient_read_failures_recover() {
        let mut sim = SimulatedBme280::new();
        sim.fail_next_reads(1);

        let mut id = [0u8; 1];
        assert!(block_on(sim.read(0, 0xD0, &mut id)).is_err());
        block_on(sim.read(0, 0xD0, &mut id)).unwrap();
        assert_eq!(id, [CHIP_ID]);
    }

    #[test]
    fn test_drift_changes_successive_readings() {
        let mut sim = SimulatedBme280::new().with_drift();
        let mut first = [0u8; DATA_LEN];
        let mut second = [0u8; DATA_LEN];

        block_on(sim.write(0, 0x72, &[0x01, 0x74, 0x55])).unwrap();
        block_on(sim.read(0, DATA_ADDR, &mut first)).unwrap();
        block_on(sim.write(0, 0x74, &[0x55])).unwrap();
        block_on(sim.read(0, DATA_ADDR, &mut second)).unwrap();

        assert_ne!(first, second);
    }
}
