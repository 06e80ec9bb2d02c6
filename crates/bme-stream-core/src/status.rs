//! Status LED blink patterns
//!
//! A blink burst drives the line high then low `times` times and then holds
//! it low for [`TRAILING_PAUSE_MS`], so consecutive bursts stay visually
//! separate. Bursts mark lifecycle phases:
//!
//! | Phase / condition   | Pattern               |
//! |---------------------|-----------------------|
//! | Power-up            | 10 blinks at 10 Hz    |
//! | Stopped             | 1 blink at 3 Hz       |
//! | Sensor not found    | 2 blinks at 3 Hz      |
//! | Transport failure   | 3 blinks at 3 Hz      |

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::warn;

/// Hold after each burst.
pub const TRAILING_PAUSE_MS: u32 = 2000;
const CODE_FREQUENCY_HZ: u32 = 3;

/// Repeating blink codes for conditions the firmware cannot recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkCode {
    Stopped,
    SensorNotFound,
    TransportFailure,
}

impl BlinkCode {
    pub const fn count(self) -> u32 {
        match self {
            Self::Stopped => 1,
            Self::SensorNotFound => 2,
            Self::TransportFailure => 3,
        }
    }
}

pub struct StatusLed<P, D> {
    pin: P,
    delay: D,
}

impl<P: OutputPin, D: DelayNs> StatusLed<P, D> {
    pub fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }

    pub fn off(&mut self) {
        if let Err(e) = self.pin.set_low() {
            warn!("Status LED write failed: {:?}", e);
        }
    }

    fn on(&mut self) {
        if let Err(e) = self.pin.set_high() {
            warn!("Status LED write failed: {:?}", e);
        }
    }

    /// Blink `times` times at `freq_hz`, then pause.
    ///
    /// Each half of a cycle lasts `(1000 / freq_hz) / 2` ms.
    pub async fn blink(&mut self, times: u32, freq_hz: u32) {
        let half_period_ms = (1000 / freq_hz.max(1)) / 2;

        for _ in 0..times {
            self.on();
            self.delay.delay_ms(half_period_ms).await;
            self.off();
            self.delay.delay_ms(half_period_ms).await;
        }

        self.delay.delay_ms(TRAILING_PAUSE_MS).await;
    }

    pub async fn blink_code(&mut self, code: BlinkCode) {
        self.blink(code.count(), CODE_FREQUENCY_HZ).await;
    }
}
