//! Register-bus contract between the BME280 driver and the host
//!
//! The driver never touches a peripheral directly. It issues register reads,
//! register writes and millisecond waits through [`RegisterBus`], so the same
//! driver runs over SPI ([`SpiShim`]), over the simulated sensor in
//! [`crate::sim`], or over any other transport that implements the trait.

mod spi;

pub use spi::SpiShim;

use embedded_hal::spi::ErrorKind;
use embedded_hal_async::spi::{Error as _, Operation, SpiDevice};
use thiserror_no_std::Error;

/// Longest data phase a single transaction may carry (non-DMA SPI FIFO span).
pub const MAX_TRANSFER_BYTES: usize = 64;

/// Transport-level failures reported by a [`RegisterBus`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("SPI transaction failed: {0:?}")]
    Spi(ErrorKind),
    #[error("Transfer of {len} bytes exceeds the {max} byte transaction span")]
    TransferTooLong { len: usize, max: usize },
}

/// Host primitives the BME280 driver requires.
///
/// `dev_id` identifies the physical device instance on the bus. Register
/// addresses are passed through untouched: the driver already applies the
/// SPI read/write bit.
pub trait RegisterBus {
    /// Suspend the caller for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32) -> impl Future<Output = ()>;

    /// Read `buf.len()` bytes starting at `reg` in one transaction.
    fn read(
        &mut self,
        dev_id: u8,
        reg: u8,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(), BusError>>;

    /// Write `data` starting at `reg` in one transaction.
    ///
    /// An empty `data` slice must return `Ok(())` without a bus transaction.
    fn write(
        &mut self,
        dev_id: u8,
        reg: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<(), BusError>>;
}

/// Level of the data/command side channel for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCommand {
    /// Address phase followed by bytes clocked in from the device.
    Command,
    /// Address phase followed by bytes clocked out to the device.
    Data,
}

/// Data phase of a [`Transaction`]. Exactly one direction is populated.
#[derive(Debug)]
pub enum Payload<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

/// Describes one SPI exchange: a single register address followed by a
/// contiguous run of data bytes.
#[derive(Debug)]
pub struct Transaction<'a> {
    pub dev_id: u8,
    pub register: u8,
    pub length_bits: usize,
    pub payload: Payload<'a>,
    pub marker: DataCommand,
}

impl<'a> Transaction<'a> {
    /// Describe a read of `buf.len()` bytes from `register`.
    pub fn read(dev_id: u8, register: u8, buf: &'a mut [u8]) -> Result<Self, BusError> {
        check_span(buf.len())?;
        Ok(Self {
            dev_id,
            register,
            length_bits: buf.len() * 8,
            payload: Payload::Read(buf),
            marker: DataCommand::Command,
        })
    }

    /// Describe a write of `data` to `register`.
    pub fn write(dev_id: u8, register: u8, data: &'a [u8]) -> Result<Self, BusError> {
        check_span(data.len())?;
        Ok(Self {
            dev_id,
            register,
            length_bits: data.len() * 8,
            payload: Payload::Write(data),
            marker: DataCommand::Data,
        })
    }

    /// Run the exchange on `spi`. Chip-select stays asserted for both phases.
    pub async fn execute<S: SpiDevice<u8>>(self, spi: &mut S) -> Result<(), BusError> {
        log::trace!(
            "spi dev={} reg={:#04x} bits={} {:?}",
            self.dev_id,
            self.register,
            self.length_bits,
            self.marker
        );

        let address = [self.register];
        let result = match self.payload {
            Payload::Read(buf) => {
                spi.transaction(&mut [Operation::Write(&address), Operation::Read(buf)])
                    .await
            }
            Payload::Write(data) => {
                spi.transaction(&mut [Operation::Write(&address), Operation::Write(data)])
                    .await
            }
        };

        result.map_err(|e| BusError::Spi(e.kind()))
    }
}

fn check_span(len: usize) -> Result<(), BusError> {
    if len > MAX_TRANSFER_BYTES {
        return Err(BusError::TransferTooLong {
            len,
            max: MAX_TRANSFER_BYTES,
        });
    }
    Ok(())
}
