//! Peripheral construction for the BME280 breakout wiring
//!
//! | Signal     | Pin    |
//! |------------|--------|
//! | SPI SCK    | GPIO12 |
//! | SPI MOSI   | GPIO11 |
//! | SPI MISO   | GPIO13 |
//! | SPI CS     | GPIO10 |
//! | UART0 TX   | GPIO43 |
//! | Status LED | GPIO2  |
//! | Stop (BOOT)| GPIO0  |

use bme_stream_core::StatusLed;
use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::Async;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::peripherals::{GPIO0, GPIO2, GPIO10, GPIO11, GPIO12, GPIO13, GPIO43, SPI2, UART0};
use esp_hal::spi::Mode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::uart::{Config as UartConfig, UartTx};

use crate::BootError;

/// The BME280 supports up to 10 MHz; 1 MHz keeps breadboard wiring happy.
const SPI_FREQUENCY_KHZ: u32 = 1000;
const UART_BAUDRATE: u32 = 115_200;

/// SPI device with its own chip-select line, asserted per transaction.
pub type SensorSpi = ExclusiveDevice<Spi<'static, Async>, Output<'static>, Delay>;

pub fn create_sensor_spi(
    spi2: SPI2<'static>,
    sck: GPIO12<'static>,
    mosi: GPIO11<'static>,
    miso: GPIO13<'static>,
    cs: GPIO10<'static>,
) -> Result<SensorSpi, BootError> {
    let config = SpiConfig::default()
        .with_frequency(Rate::from_khz(SPI_FREQUENCY_KHZ))
        .with_mode(Mode::_0);
    let bus = Spi::new(spi2, config)
        .map_err(BootError::Spi)?
        .with_sck(sck)
        .with_mosi(mosi)
        .with_miso(miso)
        .into_async();

    let cs = Output::new(cs, Level::High, OutputConfig::default());
    Ok(ExclusiveDevice::new(bus, cs, Delay).unwrap_or_else(|never| match never {}))
}

/// Transmit half of UART0; measurement lines only, logs go over RTT.
pub fn create_serial(
    uart0: UART0<'static>,
    tx: GPIO43<'static>,
) -> Result<UartTx<'static, Async>, BootError> {
    let config = UartConfig::default().with_baudrate(UART_BAUDRATE);
    Ok(UartTx::new(uart0, config)
        .map_err(BootError::Uart)?
        .with_tx(tx)
        .into_async())
}

pub fn create_status_led(pin: GPIO2<'static>) -> StatusLed<Output<'static>, Delay> {
    StatusLed::new(Output::new(pin, Level::Low, OutputConfig::default()), Delay)
}

/// BOOT button, active low.
pub fn create_stop_button(pin: GPIO0<'static>) -> Input<'static> {
    Input::new(pin, InputConfig::default().with_pull(Pull::Up))
}
