use std::path::Path;
use std::process;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use log::info;

use serial_injector::{Injector, PortConfig, TtyPort};

/// Writes `data` to a serial port every `interval_ms` milliseconds until the
/// process is terminated or a write fails.
#[derive(Debug, Parser)]
#[clap(name = "serial-injector")]
struct Cli {
    /// Path to the serial device, e.g. /dev/ttyUSB0.
    serial_port: String,
    /// Line speed in baud, e.g. 9600.
    baud_rate: u32,
    /// Payload written verbatim on every cycle, without added framing or
    /// terminator.
    data: String,
    /// Milliseconds between writes; 0 writes back-to-back.
    interval_ms: u64,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("serial-injector: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> serial_injector::Result<()> {
    let config = PortConfig::with_baud_rate(cli.baud_rate);
    let mut port = TtyPort::open(Path::new(&cli.serial_port), &config)?;
    info!("opened {} at {} baud", cli.serial_port, cli.baud_rate);

    let injector = Injector::new(
        cli.data.clone().into_bytes(),
        Duration::from_millis(cli.interval_ms),
    );
    info!(
        "injecting {} bytes every {} ms",
        injector.payload().len(),
        cli.interval_ms
    );

    // The sender is held open for the whole run and never signalled, so the
    // loop only ends on a write error or external process termination.
    let (_stop_tx, stop_rx) = mpsc::channel();
    injector.run(&mut port, &stop_rx)?;

    Ok(())
}
