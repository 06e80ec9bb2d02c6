//! [`RegisterBus`] over an `embedded-hal-async` SPI device
//!
//! Wire format of a read, chip-select low for the whole exchange:
//!
//! | MOSI         | MISO          |
//! |--------------|---------------|
//! | reg_addr     | (don't care)  |
//! | (don't care) | reg_data[0]   |
//! | ...          | ...           |
//! | (don't care) | reg_data[n-1] |
//!
//! A write is the same with `reg_data` on MOSI.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use super::{BusError, RegisterBus, Transaction};

/// Adapts an SPI device and a delay provider to the driver's [`RegisterBus`]
/// contract.
///
/// The device implementation owns chip-select, so one shim corresponds to one
/// physical sensor. Every call runs a single transaction to completion.
pub struct SpiShim<S, D> {
    spi: S,
    delay: D,
}

impl<S, D> SpiShim<S, D>
where
    S: SpiDevice<u8>,
    D: DelayNs,
{
    pub const fn new(spi: S, delay: D) -> Self {
        Self { spi, delay }
    }

    /// Give back the wrapped peripherals.
    pub fn release(self) -> (S, D) {
        (self.spi, self.delay)
    }
}

impl<S, D> RegisterBus for SpiShim<S, D>
where
    S: SpiDevice<u8>,
    D: DelayNs,
{
    async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }

    async fn read(&mut self, dev_id: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        Transaction::read(dev_id, reg, buf)?
            .execute(&mut self.spi)
            .await
            .inspect_err(|e| log::error!("SPI read of {:#04x} failed: {}", reg, e))
    }

    async fn write(&mut self, dev_id: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        if data.is_empty() {
            return Ok(());
        }

        Transaction::write(dev_id, reg, data)?
            .execute(&mut self.spi)
            .await
            .inspect_err(|e| log::error!("SPI write to {:#04x} failed: {}", reg, e))
    }
}
