//! BME280 register map (Bosch Sensortec BME280 datasheet, section 5.3).
//!
//! Key groups:
//! - **Calibration** - 0x88–0xA1 (26 bytes) and 0xE1–0xE7 (7 bytes), factory trimmed
//! - **Identity & reset** - 0xD0 (chip ID), 0xE0 (soft reset)
//! - **Control** - 0xF2 (ctrl_hum), 0xF4 (ctrl_meas), 0xF5 (config)
//! - **Status** - 0xF3 (measuring / im_update bits)
//! - **Measurement results** - 0xF7–0xFE (8 bytes): pressure, temperature, humidity

pub const CHIP_ID: u8 = 0x60;
pub const SOFT_RESET_CMD: u8 = 0xB6;

pub const CHIP_ID_ADDR: u8 = 0xD0;
pub const RESET_ADDR: u8 = 0xE0;
pub const TEMP_PRESS_CALIB_ADDR: u8 = 0x88;
pub const HUMIDITY_CALIB_ADDR: u8 = 0xE1;
pub const CTRL_HUM_ADDR: u8 = 0xF2;
pub const STATUS_ADDR: u8 = 0xF3;
pub const CTRL_MEAS_ADDR: u8 = 0xF4;
pub const CONFIG_ADDR: u8 = 0xF5;
pub const DATA_ADDR: u8 = 0xF7;

pub const TEMP_PRESS_CALIB_LEN: usize = 26;
pub const HUMIDITY_CALIB_LEN: usize = 7;
pub const DATA_LEN: usize = 8;
/// ctrl_hum, status, ctrl_meas, config
pub const SETTINGS_LEN: usize = 4;

/// SPI addressing: bit 7 set selects a read, cleared selects a write.
pub const SPI_READ_BIT: u8 = 0x80;
pub const SPI_WRITE_MASK: u8 = 0x7F;

pub const STATUS_IM_UPDATE: u8 = 0x01;

pub const SENSOR_MODE_MSK: u8 = 0x03;
pub const CTRL_HUM_MSK: u8 = 0x07;
pub const CTRL_PRESS_MSK: u8 = 0x1C;
pub const CTRL_PRESS_POS: u8 = 2;
pub const CTRL_TEMP_MSK: u8 = 0xE0;
pub const CTRL_TEMP_POS: u8 = 5;
pub const FILTER_MSK: u8 = 0x1C;
pub const FILTER_POS: u8 = 2;
pub const STANDBY_MSK: u8 = 0xE0;
pub const STANDBY_POS: u8 = 5;

/// Replace the bits selected by `mask` in `reg` with `value << pos`.
#[inline]
pub const fn set_bits(reg: u8, mask: u8, pos: u8, value: u8) -> u8 {
    (reg & !mask) | ((value << pos) & mask)
}

#[inline]
pub const fn get_bits(reg: u8, mask: u8, pos: u8) -> u8 {
    (reg & mask) >> pos
}
