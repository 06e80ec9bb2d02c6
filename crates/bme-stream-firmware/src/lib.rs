//! ESP32-S3 firmware-specific modules for bme-stream
//!
//! This crate contains the code that cannot compile on desktop targets:
//! esp-hal peripheral construction and the build-time acquisition settings.

#![no_std]

pub mod hardware;

use bme_stream_core::{OutputMode, SessionConfig};
use thiserror_no_std::Error;

/// Output representation baked in by `build.rs`.
pub const OUTPUT_MODE: &str = env!("BME_STREAM_OUTPUT_MODE");
/// Acquisition interval baked in by `build.rs`.
pub const INTERVAL_MS: &str = env!("BME_STREAM_INTERVAL_MS");

#[derive(Error, Debug)]
pub enum BootError {
    #[error("Unknown output mode '{0}', expected 'fixed' or 'float'")]
    InvalidOutputMode(&'static str),
    #[error("Invalid sample interval '{0}'")]
    InvalidInterval(&'static str),
    #[error("SPI configuration rejected: {0:?}")]
    Spi(esp_hal::spi::master::ConfigError),
    #[error("UART configuration rejected: {0:?}")]
    Uart(esp_hal::uart::ConfigError),
}

/// Session configuration from the build-time settings.
pub fn session_config() -> Result<SessionConfig, BootError> {
    let output_mode: OutputMode = OUTPUT_MODE
        .parse()
        .map_err(|_| BootError::InvalidOutputMode(OUTPUT_MODE))?;
    let sample_interval_ms = INTERVAL_MS
        .parse()
        .map_err(|_| BootError::InvalidInterval(INTERVAL_MS))?;

    Ok(SessionConfig {
        output_mode,
        sample_interval_ms,
        ..SessionConfig::default()
    })
}
