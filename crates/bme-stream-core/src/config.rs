//! Session configuration
//!
//! [`SessionConfig`] fixes the device id, sensor settings, acquisition
//! interval, retry budget and output mode for one [`crate::SensorSession`].

use log::warn;
use serde::{Deserialize, Serialize};

use crate::bme280::{Settings, measurement_time_ms};
use crate::sample::OutputMode;

/// Runtime configuration of a [`crate::SensorSession`].
///
/// The defaults reproduce the stock acquisition loop: device 0, indoor
/// navigation settings, one line per second, fixed-point output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub dev_id: u8,
    pub settings: Settings,
    /// Wait between triggering a forced measurement and reading it back
    pub sample_interval_ms: u32,
    /// Consecutive attempts per cycle before the session halts
    pub max_attempts: u8,
    pub output_mode: OutputMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dev_id: 0,
            settings: Settings::indoor_navigation(),
            sample_interval_ms: 1000,
            max_attempts: 3,
            output_mode: OutputMode::Fixed,
        }
    }
}

impl SessionConfig {
    /// Interval actually waited per cycle: never shorter than the worst-case
    /// conversion time of the configured oversampling.
    pub fn effective_interval_ms(&self) -> u32 {
        let conversion_ms = measurement_time_ms(&self.settings);
        if self.sample_interval_ms < conversion_ms {
            warn!(
                "Sample interval {} ms is shorter than the {} ms conversion time, using {} ms",
                self.sample_interval_ms, conversion_ms, conversion_ms
            );
            conversion_ms
        } else {
            self.sample_interval_ms
        }
    }
}
