//! Hardware-independent core library for bme-stream
//!
//! This crate contains all platform-agnostic logic for streaming BME280
//! readings: the register-bus shim the sensor driver talks through, the
//! driver itself, the acquisition session, line formatting, and the status
//! LED blink patterns.
//!
//! It is `#![no_std]` so it compiles on both embedded targets (ESP32-S3) and
//! desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod bme280;
pub mod bus;
pub mod config;
pub mod format;
pub mod sample;
pub mod session;
pub mod sim;
pub mod status;

pub use bme280::{Bme280, Bme280Error};
pub use bus::{BusError, RegisterBus, SpiShim};
pub use config::SessionConfig;
pub use format::{FormatError, LINE_CAPACITY, Line, format_sample, transmit};
pub use sample::{FixedSample, FloatSample, MeasurementSample, OutputMode};
pub use session::{SensorSession, SessionError, SessionState};
pub use status::{BlinkCode, StatusLed};
