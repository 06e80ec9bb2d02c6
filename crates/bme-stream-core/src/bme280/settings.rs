//! Oversampling, filter, standby and power-mode settings

use core::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Oversampling applied to one measurement channel.
///
/// | Variant | Bits | Samples averaged |
/// |---------|------|------------------|
/// | Skipped | 000  | channel disabled |
/// | X1      | 001  | 1                |
/// | X2      | 010  | 2                |
/// | X4      | 011  | 4                |
/// | X8      | 100  | 8                |
/// | X16     | 101  | 16               |
///
/// Bit patterns 110 and 111 also mean ×16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Oversampling {
    Skipped,
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    pub const ALL: [Oversampling; 6] = [
        Self::Skipped,
        Self::X1,
        Self::X2,
        Self::X4,
        Self::X8,
        Self::X16,
    ];

    pub const fn bits(self) -> u8 {
        match self {
            Self::Skipped => 0b000,
            Self::X1 => 0b001,
            Self::X2 => 0b010,
            Self::X4 => 0b011,
            Self::X8 => 0b100,
            Self::X16 => 0b101,
        }
    }

    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Self::Skipped,
            0b001 => Self::X1,
            0b010 => Self::X2,
            0b011 => Self::X4,
            0b100 => Self::X8,
            _ => Self::X16,
        }
    }

    /// Number of internal samples averaged per reported value.
    pub const fn factor(self) -> u32 {
        match self {
            Self::Skipped => 0,
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::X16 => 16,
        }
    }
}

/// IIR filter coefficient (config register, bits 4:2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Off,
    X2,
    X4,
    X8,
    X16,
}

impl Filter {
    pub const ALL: [Filter; 5] = [Self::Off, Self::X2, Self::X4, Self::X8, Self::X16];

    pub const fn bits(self) -> u8 {
        match self {
            Self::Off => 0b000,
            Self::X2 => 0b001,
            Self::X4 => 0b010,
            Self::X8 => 0b011,
            Self::X16 => 0b100,
        }
    }

    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Self::Off,
            0b001 => Self::X2,
            0b010 => Self::X4,
            0b011 => Self::X8,
            _ => Self::X16,
        }
    }
}

/// Inactive time between measurements in normal mode (config register, bits 7:5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandbyTime {
    Micros500,
    Micros62500,
    Millis125,
    Millis250,
    Millis500,
    Millis1000,
    Millis10,
    Millis20,
}

impl StandbyTime {
    pub const fn bits(self) -> u8 {
        match self {
            Self::Micros500 => 0b000,
            Self::Micros62500 => 0b001,
            Self::Millis125 => 0b010,
            Self::Millis250 => 0b011,
            Self::Millis500 => 0b100,
            Self::Millis1000 => 0b101,
            Self::Millis10 => 0b110,
            Self::Millis20 => 0b111,
        }
    }

    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Self::Micros500,
            0b001 => Self::Micros62500,
            0b010 => Self::Millis125,
            0b011 => Self::Millis250,
            0b100 => Self::Millis500,
            0b101 => Self::Millis1000,
            0b110 => Self::Millis10,
            _ => Self::Millis20,
        }
    }
}

/// Power mode (ctrl_meas register, bits 1:0).
///
/// | Variant | Bits  | Behaviour                                              |
/// |---------|-------|--------------------------------------------------------|
/// | Sleep   | 00    | No measurements, registers readable                    |
/// | Forced  | 01/10 | One measurement cycle, then back to sleep              |
/// | Normal  | 11    | Measure, stand by for `t_sb`, repeat                   |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    Sleep,
    Forced,
    Normal,
}

impl SensorMode {
    pub const fn bits(self) -> u8 {
        match self {
            Self::Sleep => 0b00,
            Self::Forced => 0b01,
            Self::Normal => 0b11,
        }
    }

    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Sleep,
            0b11 => Self::Normal,
            _ => Self::Forced,
        }
    }
}

/// Measurement configuration held by the device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub osr_h: Oversampling,
    pub osr_p: Oversampling,
    pub osr_t: Oversampling,
    pub filter: Filter,
    pub standby_time: StandbyTime,
}

impl Settings {
    /// Datasheet power-on values: every channel skipped, filter off.
    pub const fn reset() -> Self {
        Self {
            osr_h: Oversampling::Skipped,
            osr_p: Oversampling::Skipped,
            osr_t: Oversampling::Skipped,
            filter: Filter::Off,
            standby_time: StandbyTime::Micros500,
        }
    }

    /// Recommended mode of operation for indoor navigation (datasheet 3.5.3).
    pub const fn indoor_navigation() -> Self {
        Self {
            osr_h: Oversampling::X1,
            osr_p: Oversampling::X16,
            osr_t: Oversampling::X2,
            filter: Filter::X16,
            standby_time: StandbyTime::Micros500,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::indoor_navigation()
    }
}

/// Selects which groups of [`Settings`] a commit writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsSelect(u8);

impl SettingsSelect {
    pub const OSR_PRESS: Self = Self(1 << 0);
    pub const OSR_TEMP: Self = Self(1 << 1);
    pub const OSR_HUM: Self = Self(1 << 2);
    pub const FILTER: Self = Self(1 << 3);
    pub const STANDBY: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SettingsSelect {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

const MEAS_OFFSET_US: u32 = 1250;
const MEAS_DUR_US: u32 = 2300;
const PRES_HUM_MEAS_OFFSET_US: u32 = 575;

/// Worst-case duration of one measurement cycle (datasheet appendix 9.1).
pub const fn measurement_time_us(settings: &Settings) -> u32 {
    let mut total = MEAS_OFFSET_US + MEAS_DUR_US * settings.osr_t.factor();

    if settings.osr_p.factor() > 0 {
        total += MEAS_DUR_US * settings.osr_p.factor() + PRES_HUM_MEAS_OFFSET_US;
    }
    if settings.osr_h.factor() > 0 {
        total += MEAS_DUR_US * settings.osr_h.factor() + PRES_HUM_MEAS_OFFSET_US;
    }

    total
}

/// [`measurement_time_us`] rounded up to whole milliseconds.
pub const fn measurement_time_ms(settings: &Settings) -> u32 {
    measurement_time_us(settings).div_ceil(1000)
}
