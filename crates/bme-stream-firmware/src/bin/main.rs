#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use bme_stream_core::{BlinkCode, SensorSession, SessionConfig, SpiShim, StatusLed};
use bme_stream_firmware::{hardware, session_config};
use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Delay;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::Output;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info, warn};

/// Power-up burst: 10 blinks at 10 Hz.
const STARTUP_BLINKS: u32 = 10;
const STARTUP_FREQUENCY_HZ: u32 = 10;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Repeat `code` on the status LED forever.
async fn halt(led: &mut StatusLed<Output<'static>, Delay>, code: BlinkCode) -> ! {
    loop {
        led.blink_code(code).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let mut led = hardware::create_status_led(peripherals.GPIO2);
    led.off();
    led.blink(STARTUP_BLINKS, STARTUP_FREQUENCY_HZ).await;

    let session_config = session_config().unwrap_or_else(|e| {
        warn!("{}, falling back to defaults", e);
        SessionConfig::default()
    });

    let mut serial = match hardware::create_serial(peripherals.UART0, peripherals.GPIO43) {
        Ok(serial) => serial,
        Err(e) => {
            error!("Serial setup failed: {}", e);
            halt(&mut led, BlinkCode::TransportFailure).await
        }
    };

    let spi = match hardware::create_sensor_spi(
        peripherals.SPI2,
        peripherals.GPIO12,
        peripherals.GPIO11,
        peripherals.GPIO13,
        peripherals.GPIO10,
    ) {
        Ok(spi) => spi,
        Err(e) => {
            error!("SPI setup failed: {}", e);
            halt(&mut led, BlinkCode::TransportFailure).await
        }
    };

    let mut session = SensorSession::new(SpiShim::new(spi, Delay), session_config);
    if let Err(e) = session.initialize().await {
        error!("{}", e);
        halt(&mut led, BlinkCode::SensorNotFound).await
    }

    info!("Streaming BME280 readings on UART0, press BOOT to stop");

    let stop = Signal::<NoopRawMutex, ()>::new();
    let finished = Signal::<NoopRawMutex, ()>::new();
    let mut button = hardware::create_stop_button(peripherals.GPIO0);

    let (result, _) = join(
        async {
            let result = session.run(&mut serial, &stop).await;
            finished.signal(());
            result
        },
        async {
            if let Either::First(()) = select(button.wait_for_falling_edge(), finished.wait()).await
            {
                info!("Stop button pressed");
                stop.signal(());
            }
        },
    )
    .await;

    match result {
        Ok(cycles) => {
            info!("Stopped after {} lines", cycles);
            halt(&mut led, BlinkCode::Stopped).await
        }
        Err(e) => {
            error!("Acquisition halted: {}", e);
            halt(&mut led, BlinkCode::TransportFailure).await
        }
    }
}
