//! Opens the configured port as a line source.
//!
//! Serial devices are opened through `serialport` with the configured baud
//! rate and a read timeout, so every read returns within that window and the
//! reader can notice a stop request on a quiet bus. Regular files (captures)
//! and stdin are read as plain streams.

use std::io;
use std::path::Path;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use cw_stream::{IoLineSource, LineSource, SourceError, SourceResult};

/// Port name that selects stdin, e.g. for `cat capture.csv | cw-monitor`.
pub const STDIN_PORT: &str = "-";

/// Line source over a serial device, capture file or stdin.
pub type PortSource = Box<dyn LineSource>;

/// How to open the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub port: String,
    pub baud: u32,
    /// Upper bound on one blocking read from a serial device.
    pub read_timeout: Duration,
}

/// Whether `port` names a serial device rather than stdin or a regular file.
pub fn is_device(port: &str) -> bool {
    port != STDIN_PORT && !Path::new(port).is_file()
}

/// Open the configured port.
pub fn open(settings: &PortSettings) -> SourceResult<PortSource> {
    let port = settings.port.as_str();
    if port == STDIN_PORT {
        return Ok(Box::new(IoLineSource::new("stdin", io::stdin())));
    }
    if !is_device(port) {
        let file = std::fs::File::open(port).map_err(|e| open_error(port, e))?;
        return Ok(Box::new(IoLineSource::new(port, file)));
    }

    let serial = serialport::new(port, settings.baud)
        .timeout(settings.read_timeout)
        .open()
        .map_err(|e| open_error(port, e))?;
    tracing::info!(
        port,
        baud = settings.baud,
        timeout = ?settings.read_timeout,
        "serial port opened"
    );
    Ok(Box::new(
        IoLineSource::new(port, serial).with_input_clear(clear_serial_input),
    ))
}

/// Flush the driver's receive queue, not just our own buffer.
fn clear_serial_input(serial: &mut Box<dyn SerialPort>) -> io::Result<()> {
    serial.clear(ClearBuffer::Input).map_err(io::Error::from)
}

fn open_error(port: &str, e: impl std::fmt::Display) -> SourceError {
    SourceError::Open {
        port: port.to_string(),
        message: e.to_string(),
    }
}
