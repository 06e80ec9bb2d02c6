//! Text rendering of measurement samples
//!
//! | Mode  | Example line                     |
//! |-------|----------------------------------|
//! | Fixed | `25.00 *C, 50.00 %rH, 101 mBar`  |
//! | Float | `25.00, 101325.00, 50.00`        |
//!
//! Lines carry no terminator; the serial consumer sees the bytes exactly as
//! formatted.

use core::fmt::Write as _;

use embedded_io_async::Write;
use thiserror_no_std::Error;

use crate::sample::{FixedSample, FloatSample, MeasurementSample};

/// Size of the line buffer. Fixed-mode lines stay under it for every `i32`
/// / `u32` input, float-mode lines for every value the driver can return.
pub const LINE_CAPACITY: usize = 60;

pub type Line = heapless::String<LINE_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("Sample does not fit in the line buffer")]
    Overflow,
}

impl From<core::fmt::Error> for FormatError {
    fn from(_: core::fmt::Error) -> Self {
        Self::Overflow
    }
}

pub fn format_sample(sample: &MeasurementSample) -> Result<Line, FormatError> {
    let mut line = Line::new();
    match sample {
        MeasurementSample::Fixed(s) => write_fixed(&mut line, s)?,
        MeasurementSample::Float(s) => write_float(&mut line, s)?,
    }
    Ok(line)
}

fn write_float(line: &mut Line, s: &FloatSample) -> Result<(), FormatError> {
    write!(
        line,
        "{:.2}, {:.2}, {:.2}",
        s.temperature, s.pressure, s.humidity
    )?;
    Ok(())
}

/// Integer-only rendering; no float formatting code is pulled in.
fn write_fixed(line: &mut Line, s: &FixedSample) -> Result<(), FormatError> {
    let sign = if s.temperature < 0 { "-" } else { "" };
    let centi_c = s.temperature.unsigned_abs();

    // 1/1024 % to 0.01 %, rounded half-up
    let centi_rh = (s.humidity as u64 * 100 + 512) / 1024;

    // 0.01 Pa to whole mbar
    let mbar = s.pressure / 10_000;

    write!(
        line,
        "{}{}.{:02} *C, {}.{:02} %rH, {} mBar",
        sign,
        centi_c / 100,
        centi_c % 100,
        centi_rh / 100,
        centi_rh % 100,
        mbar
    )?;
    Ok(())
}

/// Send one formatted line and flush the writer.
pub async fn transmit<W: Write>(out: &mut W, line: &str) -> Result<(), W::Error> {
    out.write_all(line.as_bytes()).await?;
    out.flush().await
}
