//! Real serial port backend.

use std::io;
use std::path::Path;

use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

use super::ControlLines;

/// Baud rate requested when opening the port.
///
/// The cart enumerates as a USB CDC device, so the value is nominal.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

impl ControlLines for SerialStream {
    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        self.write_data_terminal_ready(level).map_err(io::Error::from)
    }

    fn dsr(&mut self) -> io::Result<bool> {
        self.read_data_set_ready().map_err(io::Error::from)
    }
}

/// Open the serial port at `path`.
pub fn open(path: impl AsRef<Path>) -> io::Result<SerialStream> {
    let path = path.as_ref().to_string_lossy().into_owned();
    debug!(port = %path, baud = DEFAULT_BAUD_RATE, "opening serial port");
    tokio_serial::new(path, DEFAULT_BAUD_RATE)
        .open_native_async()
        .map_err(io::Error::from)
}
