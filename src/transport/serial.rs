//! Async serial link setup.
//!
//! The protocol runs over a plain byte pipe; this module only knows how
//! to open that pipe on real hardware: 115200 baud, 8 data bits, no
//! parity, 1 stop bit, no flow control. Opening the port toggles DTR on
//! boards that auto-reset on connect, so [`open`] waits out the reset
//! before handing the stream over.

use std::time::Duration;

use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info};

use crate::error::Result;

/// Line rate the device firmware is built for.
pub const BAUD_RATE: u32 = 115_200;

/// How long to wait after opening the port before trusting the link.
/// Covers the bootloader delay of boards that reset on DTR toggle.
pub const RESET_GRACE: Duration = Duration::from_secs(2);

/// Open `device` (e.g. `/dev/ttyUSB0`, `COM3`) at 115200 8N1 and wait
/// out the auto-reset grace period.
pub async fn open(device: &str) -> Result<SerialStream> {
    debug!(device, baud = BAUD_RATE, "opening serial port");

    let mut stream = tokio_serial::new(device, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    #[cfg(unix)]
    stream.set_exclusive(false)?;

    // Assert DTR so boards gated on it start talking, then wait for the
    // ones that treat the toggle as a reset.
    stream.write_data_terminal_ready(true)?;
    tokio::time::sleep(RESET_GRACE).await;

    info!(device, "serial link ready");
    Ok(stream)
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
