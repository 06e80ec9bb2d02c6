//! Desktop simulator for the bme-stream acquisition loop.
//!
//! Runs the real [`SensorSession`] against a register-level simulated BME280
//! and prints one measurement line per cycle on stdout. Diagnostics go to
//! stderr through `env_logger` (set `RUST_LOG=info` to see them).
//!
//! # Arguments
//!
//! | Flag               | Default | Meaning                                |
//! |--------------------|---------|----------------------------------------|
//! | `--mode <m>`       | `fixed` | `fixed` or `float` output lines        |
//! | `--cycles <n>`     | `10`    | Lines to produce before stopping, 0 = forever |
//! | `--interval-ms <n>`| `1000`  | Trigger-to-read wait per cycle         |

use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use bme_stream_core::bus::{BusError, RegisterBus};
use bme_stream_core::sim::SimulatedBme280;
use bme_stream_core::{OutputMode, SensorSession, SessionConfig};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embedded_io_async::ErrorKind;
use log::{error, info};
use thiserror_no_std::Error;

const DEFAULT_CYCLES: u32 = 10;

#[derive(Error, Debug, PartialEq, Eq)]
enum ArgsError {
    #[error("Unknown argument '{0}'")]
    Unknown(String),
    #[error("Missing value for {0}")]
    MissingValue(&'static str),
    #[error("Invalid value '{value}' for {flag}")]
    InvalidValue { flag: &'static str, value: String },
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    mode: OutputMode,
    cycles: u32,
    interval_ms: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            mode: OutputMode::Fixed,
            cycles: DEFAULT_CYCLES,
            interval_ms: SessionConfig::default().sample_interval_ms,
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, ArgsError> {
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        let flag = match arg.as_str() {
            "--mode" => "--mode",
            "--cycles" => "--cycles",
            "--interval-ms" => "--interval-ms",
            _ => return Err(ArgsError::Unknown(arg)),
        };
        let value = args.next().ok_or(ArgsError::MissingValue(flag))?;
        let invalid = || ArgsError::InvalidValue {
            flag,
            value: value.clone(),
        };

        match flag {
            "--mode" => parsed.mode = value.parse().map_err(|_| invalid())?,
            "--cycles" => parsed.cycles = value.parse().map_err(|_| invalid())?,
            _ => parsed.interval_ms = value.parse().map_err(|_| invalid())?,
        }
    }

    Ok(parsed)
}

/// Simulated sensor whose delays take real time.
struct PacedSensor {
    sim: SimulatedBme280,
}

impl RegisterBus for PacedSensor {
    async fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    async fn read(&mut self, dev_id: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.sim.read(dev_id, reg, buf).await
    }

    async fn write(&mut self, dev_id: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        self.sim.write(dev_id, reg, data).await
    }
}

/// Stdout as the serial port. Each flushed line gets a newline so the
/// terminal stays readable; the stop signal is raised after `limit` lines.
struct Console<'a> {
    lines: u32,
    limit: u32,
    stop: &'a Signal<NoopRawMutex, ()>,
}

impl embedded_io_async::ErrorType for Console<'_> {
    type Error = ErrorKind;
}

impl embedded_io_async::Write for Console<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::stdout()
            .write_all(buf)
            .map_err(|_| ErrorKind::BrokenPipe)?;
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        let mut stdout = std::io::stdout();
        writeln!(stdout).map_err(|_| ErrorKind::BrokenPipe)?;
        stdout.flush().map_err(|_| ErrorKind::BrokenPipe)?;

        self.lines += 1;
        if self.limit != 0 && self.lines >= self.limit {
            self.stop.signal(());
        }
        Ok(())
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            error!("{}", e);
            eprintln!(
                "usage: bme-stream-simulator [--mode fixed|float] [--cycles N] [--interval-ms N]"
            );
            return ExitCode::from(2);
        }
    };
    info!("Starting bme-stream simulator: {:?}", args);

    let config = SessionConfig {
        output_mode: args.mode,
        sample_interval_ms: args.interval_ms,
        ..SessionConfig::default()
    };
    let sensor = PacedSensor {
        sim: SimulatedBme280::new().with_drift(),
    };
    let mut session = SensorSession::new(sensor, config);

    let stop = Signal::<NoopRawMutex, ()>::new();
    let mut console = Console {
        lines: 0,
        limit: args.cycles,
        stop: &stop,
    };

    let result = block_on(async {
        session.initialize().await?;
        session.run(&mut console, &stop).await
    });

    match result {
        Ok(cycles) => {
            info!("Simulator exiting after {} lines", cycles);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        assert_eq!(parse(&[]), Ok(Args::default()));
    }

    #[test]
    fn test_all_flags() {
        let args = parse(&["--mode", "float", "--cycles", "0", "--interval-ms", "250"]).unwrap();
        assert_eq!(
            args,
            Args {
                mode: OutputMode::Float,
                cycles: 0,
                interval_ms: 250,
            }
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(
            parse(&["--verbose"]),
            Err(ArgsError::Unknown("--verbose".into()))
        );
        assert_eq!(
            parse(&["--cycles"]),
            Err(ArgsError::MissingValue("--cycles"))
        );
        assert_eq!(
            parse(&["--mode", "double"]),
            Err(ArgsError::InvalidValue {
                flag: "--mode",
                value: "double".into(),
            })
        );
    }
}
