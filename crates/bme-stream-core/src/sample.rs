//! Compensated measurement samples

use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Integer compensated reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSample {
    /// Temperature in 0.01 °C (2508 = 25.08 °C)
    pub temperature: i32,
    /// Pressure in 0.01 Pa (10065327 = 1006.5327 mbar)
    pub pressure: u32,
    /// Relative humidity in 1/1024 % (51200 = 50 %rH)
    pub humidity: u32,
}

/// Floating-point compensated reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatSample {
    /// Temperature in °C
    pub temperature: f64,
    /// Pressure in Pa
    pub pressure: f64,
    /// Relative humidity in %
    pub humidity: f64,
}

/// One compensated reading, in the representation chosen by [`OutputMode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementSample {
    Fixed(FixedSample),
    Float(FloatSample),
}

impl From<FixedSample> for MeasurementSample {
    fn from(value: FixedSample) -> Self {
        Self::Fixed(value)
    }
}

impl From<FloatSample> for MeasurementSample {
    fn from(value: FloatSample) -> Self {
        Self::Float(value)
    }
}

/// Which compensation the session requests and therefore how lines look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// `25.00 *C, 50.00 %rH, 1006 mBar`
    #[default]
    Fixed,
    /// `25.00, 100653.27, 50.00`
    Float,
}

impl OutputMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Float => "float",
        }
    }
}

impl FromStr for OutputMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("fixed") {
            Ok(Self::Fixed)
        } else if s.eq_ignore_ascii_case("float") {
            Ok(Self::Float)
        } else {
            Err(())
        }
    }
}
