//! BME280 calibration coefficients and compensation functions.
//!
//! Handles decoding the factory-trimmed coefficients (registers 0x88–0xA1 and
//! 0xE1–0xE7) and applying them to raw ADC readings, following the Bosch
//! reference compensation code in both its integer and double precision forms.

use super::registers::{DATA_LEN, HUMIDITY_CALIB_LEN, TEMP_PRESS_CALIB_LEN};
use crate::sample::{FixedSample, FloatSample};

const TEMPERATURE_MIN: i32 = -4000;
const TEMPERATURE_MAX: i32 = 8500;
const PRESSURE_MIN: u32 = 3_000_000;
const PRESSURE_MAX: u32 = 11_000_000;
const HUMIDITY_MAX: u32 = 102_400;

const TEMPERATURE_MIN_F: f64 = -40.0;
const TEMPERATURE_MAX_F: f64 = 85.0;
const PRESSURE_MIN_F: f64 = 30_000.0;
const PRESSURE_MAX_F: f64 = 110_000.0;
const HUMIDITY_MAX_F: f64 = 100.0;

/// Raw ADC values from one burst read of the data registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncompensatedData {
    pub pressure: u32,
    pub temperature: u32,
    pub humidity: u32,
}

impl UncompensatedData {
    /// Unpack 20-bit pressure and temperature and 16-bit humidity.
    pub fn parse(data: &[u8; DATA_LEN]) -> Self {
        let pressure = (data[0] as u32) << 12 | (data[1] as u32) << 4 | (data[2] as u32) >> 4;
        let temperature = (data[3] as u32) << 12 | (data[4] as u32) << 4 | (data[5] as u32) >> 4;
        let humidity = (data[6] as u32) << 8 | data[7] as u32;

        Self {
            pressure,
            temperature,
            humidity,
        }
    }
}

/// Factory-trimmed compensation coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationData {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    pub dig_h4: i16,
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl CalibrationData {
    /// Decode the two calibration blocks.
    ///
    /// `tp` starts at 0x88; byte 24 (0xA0) is unused and byte 25 (0xA1) is
    /// `dig_H1`. `h` starts at 0xE1; `dig_H4` and `dig_H5` share the nibbles
    /// of 0xE5.
    pub fn parse(tp: &[u8; TEMP_PRESS_CALIB_LEN], h: &[u8; HUMIDITY_CALIB_LEN]) -> Self {
        let le_u16 = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let le_i16 = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        Self {
            dig_t1: le_u16(0),
            dig_t2: le_i16(2),
            dig_t3: le_i16(4),
            dig_p1: le_u16(6),
            dig_p2: le_i16(8),
            dig_p3: le_i16(10),
            dig_p4: le_i16(12),
            dig_p5: le_i16(14),
            dig_p6: le_i16(16),
            dig_p7: le_i16(18),
            dig_p8: le_i16(20),
            dig_p9: le_i16(22),
            dig_h1: tp[25],
            dig_h2: i16::from_le_bytes([h[0], h[1]]),
            dig_h3: h[2],
            dig_h4: (h[3] as i8 as i16) * 16 | (h[4] & 0x0F) as i16,
            dig_h5: (h[5] as i8 as i16) * 16 | (h[4] >> 4) as i16,
            dig_h6: h[6] as i8,
        }
    }

    /// Integer compensation. Returns 0.01 °C, 0.01 Pa and 1/1024 %rH.
    pub fn compensate_fixed(&self, raw: &UncompensatedData) -> FixedSample {
        let t_fine = self.t_fine_fixed(raw.temperature);
        let temperature = ((t_fine * 5 + 128) / 256).clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);

        FixedSample {
            temperature,
            pressure: self.pressure_fixed(raw.pressure, t_fine),
            humidity: self.humidity_fixed(raw.humidity, t_fine),
        }
    }

    /// Double precision compensation. Returns °C, Pa and %rH.
    pub fn compensate_float(&self, raw: &UncompensatedData) -> FloatSample {
        let adc_t = raw.temperature as f64;
        let var1 = (adc_t / 16384.0 - self.dig_t1 as f64 / 1024.0) * self.dig_t2 as f64;
        let var2 = adc_t / 131072.0 - self.dig_t1 as f64 / 8192.0;
        let var2 = var2 * var2 * self.dig_t3 as f64;
        let t_fine = (var1 + var2) as i32;
        let temperature = ((var1 + var2) / 5120.0).clamp(TEMPERATURE_MIN_F, TEMPERATURE_MAX_F);

        FloatSample {
            temperature,
            pressure: self.pressure_float(raw.pressure, t_fine),
            humidity: self.humidity_float(raw.humidity, t_fine),
        }
    }

    fn t_fine_fixed(&self, adc_t: u32) -> i32 {
        let adc_t = adc_t as i64;
        let t1 = self.dig_t1 as i64;

        let var1 = ((adc_t / 8 - t1 * 2) * self.dig_t2 as i64) / 2048;
        let var2 = adc_t / 16 - t1;
        let var2 = (((var2 * var2) / 4096) * self.dig_t3 as i64) / 16384;
        (var1 + var2) as i32
    }

    // i128 keeps corrupted calibration words from overflowing; the tail
    // saturates because var4 is unbounded when var1 is tiny.
    fn pressure_fixed(&self, adc_p: u32, t_fine: i32) -> u32 {
        let mut var1 = t_fine as i128 - 128_000;
        let mut var2 = var1 * var1 * self.dig_p6 as i128;
        var2 += (var1 * self.dig_p5 as i128) * 131_072;
        var2 += (self.dig_p4 as i128) * 34_359_738_368;
        var1 = (var1 * var1 * self.dig_p3 as i128) / 256 + var1 * self.dig_p2 as i128 * 4096;
        var1 = ((1_i128 << 47) + var1) * self.dig_p1 as i128 / 8_589_934_592;

        // Avoid division by zero on an unprogrammed part
        if var1 == 0 {
            return PRESSURE_MIN;
        }

        let mut var4 = 1_048_576 - adc_p as i128;
        var4 = ((var4 * 2_147_483_648 - var2) * 3125) / var1;
        let var1 = (self.dig_p9 as i128 * (var4 / 8192)).saturating_mul(var4 / 8192) / 33_554_432;
        let var2 = (self.dig_p8 as i128 * var4) / 524_288;
        var4 = var4.saturating_add(var1).saturating_add(var2) / 256 + self.dig_p7 as i128 * 16;

        let pressure = ((var4 / 2) * 100) / 128;
        pressure.clamp(PRESSURE_MIN as i128, PRESSURE_MAX as i128) as u32
    }

    fn humidity_fixed(&self, adc_h: u32, t_fine: i32) -> u32 {
        let var1 = t_fine as i128 - 76_800;
        let var2 = adc_h as i128 * 16_384;
        let var3 = self.dig_h4 as i128 * 1_048_576;
        let var4 = self.dig_h5 as i128 * var1;
        let var5 = ((var2 - var3) - var4 + 16_384) / 32_768;
        let var2 = (var1 * self.dig_h6 as i128) / 1024;
        let var3 = (var1 * self.dig_h3 as i128) / 2048;
        let var4 = (var2 * (var3 + 32_768)) / 1024 + 2_097_152;
        let var2 = (var4 * self.dig_h2 as i128 + 8192) / 16_384;
        let var3 = var5 * var2;
        let var4 = ((var3 / 32_768) * (var3 / 32_768)) / 128;
        let var5 = (var3 - (var4 * self.dig_h1 as i128) / 16).clamp(0, 419_430_400);

        ((var5 / 4096) as u32).min(HUMIDITY_MAX)
    }

    fn pressure_float(&self, adc_p: u32, t_fine: i32) -> f64 {
        let var1 = t_fine as f64 / 2.0 - 64000.0;
        let var2 = var1 * var1 * self.dig_p6 as f64 / 32768.0;
        let var2 = var2 + var1 * self.dig_p5 as f64 * 2.0;
        let var2 = var2 / 4.0 + self.dig_p4 as f64 * 65536.0;
        let var3 = self.dig_p3 as f64 * var1 * var1 / 524288.0;
        let var1 = (var3 + self.dig_p2 as f64 * var1) / 524288.0;
        let var1 = (1.0 + var1 / 32768.0) * self.dig_p1 as f64;

        if var1 <= 0.0 {
            return PRESSURE_MIN_F;
        }

        let pressure = 1048576.0 - adc_p as f64;
        let pressure = (pressure - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.dig_p9 as f64 * pressure * pressure / 2147483648.0;
        let var2 = pressure * self.dig_p8 as f64 / 32768.0;
        let pressure = pressure + (var1 + var2 + self.dig_p7 as f64) / 16.0;

        pressure.clamp(PRESSURE_MIN_F, PRESSURE_MAX_F)
    }

    fn humidity_float(&self, adc_h: u32, t_fine: i32) -> f64 {
        let var1 = t_fine as f64 - 76800.0;
        let var2 = self.dig_h4 as f64 * 64.0 + (self.dig_h5 as f64 / 16384.0) * var1;
        let var3 = adc_h as f64 - var2;
        let var4 = self.dig_h2 as f64 / 65536.0;
        let var5 = 1.0 + (self.dig_h3 as f64 / 67108864.0) * var1;
        let var6 = 1.0 + (self.dig_h6 as f64 / 67108864.0) * var1 * var5;
        let var6 = var3 * var4 * (var5 * var6);
        let humidity = var6 * (1.0 - self.dig_h1 as f64 * var6 / 524288.0);

        humidity.clamp(0.0, HUMIDITY_MAX_F)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{DATASHEET_RAW, humidity_calibration_block, temp_press_calibration_block};

    fn datasheet_calibration() -> CalibrationData {
        CalibrationData::parse(&temp_press_calibration_block(), &humidity_calibration_block())
    }

    #[test]
    fn test_calibration_parse() {
        let calib = datasheet_calibration();

        assert_eq!(calib.dig_t1, 27504);
        assert_eq!(calib.dig_t3, -1000);
        assert_eq!(calib.dig_p1, 36477);
        assert_eq!(calib.dig_p9, 6000);
        assert_eq!(calib.dig_h1, 75);
        assert_eq!(calib.dig_h2, 362);
        assert_eq!(calib.dig_h4, 313);
        assert_eq!(calib.dig_h5, 50);
        assert_eq!(calib.dig_h6, 30);
    }

    #[test]
    fn test_negative_h4_h5_sign_extend() {
        let tp = [0u8; TEMP_PRESS_CALIB_LEN];
        // H4 = 0xFF8 | 0x1 = -15, H5 = 0xF0 << 4 | 0xF = -241
        let h = [0, 0, 0, 0xFF, 0xF1, 0xF0, 0];
        let calib = CalibrationData::parse(&tp, &h);

        assert_eq!(calib.dig_h4, -15);
        assert_eq!(calib.dig_h5, -241);
    }

    #[test]
    fn test_uncompensated_parse() {
        let data = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30];
        let raw = UncompensatedData::parse(&data);

        assert_eq!(raw.pressure, 415_148);
        assert_eq!(raw.temperature, 519_888);
        assert_eq!(raw.humidity, 30_000);
    }

    #[test]
    fn test_fixed_compensation_matches_datasheet_example() {
        let sample = datasheet_calibration().compensate_fixed(&DATASHEET_RAW);

        // Datasheet: 25.08 degC, 100653.27 Pa
        assert_eq!(sample.temperature, 2508);
        assert!((10_065_000..=10_065_600).contains(&sample.pressure));
        // ~55 %rH
        assert!((56_000..=56_600).contains(&sample.humidity));
    }

    #[test]
    fn test_float_compensation_matches_datasheet_example() {
        let sample = datasheet_calibration().compensate_float(&DATASHEET_RAW);

        assert!((sample.temperature - 25.08).abs() < 0.01);
        assert!((sample.pressure - 100_653.27).abs() < 1.0);
        assert!((sample.humidity - 55.0).abs() < 0.1);
    }

    #[test]
    fn test_compensation_clamps_out_of_range_readings() {
        let calib = datasheet_calibration();
        let raw = UncompensatedData {
            pressure: 0,
            temperature: 0xF_FFFF,
            humidity: 0xFFFF,
        };

        let fixed = calib.compensate_fixed(&raw);
        assert_eq!(fixed.temperature, TEMPERATURE_MAX);
        assert!(fixed.pressure <= PRESSURE_MAX);
        assert!(fixed.humidity <= HUMIDITY_MAX);

        let float = calib.compensate_float(&raw);
        assert_eq!(float.temperature, TEMPERATURE_MAX_F);
        assert!(float.pressure <= PRESSURE_MAX_F);
        assert!(float.humidity <= HUMIDITY_MAX_F);
    }

    #[test]
    fn test_zero_calibration_does_not_divide_by_zero() {
        let calib = CalibrationData::default();
        let sample = calib.compensate_fixed(&DATASHEET_RAW);

        assert_eq!(sample.pressure, PRESSURE_MIN);
    }

    #[test]
    fn test_extreme_calibration_stays_in_range() {
        let extremes = [
            CalibrationData {
                dig_t1: u16::MAX,
                dig_t2: i16::MAX,
                dig_t3: i16::MAX,
                dig_p1: u16::MAX,
                dig_p2: i16::MAX,
                dig_p3: i16::MAX,
                dig_p4: i16::MAX,
                dig_p5: i16::MAX,
                dig_p6: i16::MAX,
                dig_p7: i16::MAX,
                dig_p8: i16::MAX,
                dig_p9: i16::MAX,
                dig_h1: u8::MAX,
                dig_h2: i16::MAX,
                dig_h3: u8::MAX,
                dig_h4: i16::MAX,
                dig_h5: i16::MAX,
                dig_h6: i8::MAX,
            },
            CalibrationData {
                dig_t1: 0,
                dig_t2: i16::MIN,
                dig_t3: i16::MIN,
                dig_p1: u16::MAX,
                dig_p2: i16::MIN,
                dig_p3: i16::MIN,
                dig_p4: i16::MIN,
                dig_p5: i16::MIN,
                dig_p6: i16::MIN,
                dig_p7: i16::MIN,
                dig_p8: i16::MIN,
                dig_p9: i16::MIN,
                dig_h1: u8::MAX,
                dig_h2: i16::MIN,
                dig_h3: u8::MAX,
                dig_h4: i16::MIN,
                dig_h5: i16::MIN,
                dig_h6: i8::MIN,
            },
        ];

        let corners = [(0, 0), (0xF_FFFF, 0xF_FFFF), (0, 0xF_FFFF), (0xF_FFFF, 0)];

        for calib in extremes {
            for (pressure, temperature) in corners {
                for humidity in [0, 0xFFFF] {
                    let raw = UncompensatedData {
                        pressure,
                        temperature,
                        humidity,
                    };
                    let sample = calib.compensate_fixed(&raw);

                    assert!((TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&sample.temperature));
                    assert!((PRESSURE_MIN..=PRESSURE_MAX).contains(&sample.pressure));
                    assert!(sample.humidity <= HUMIDITY_MAX);
                }
            }
        }
    }
}
