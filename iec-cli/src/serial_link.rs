//! Host link over a serial port.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, SerialPortType};
use tracing::{debug, trace};

use iec_core::config::LinkConfig;
use iec_core::{HostLink, IecError, IecResult};

/// `HostLink` backed by a `serialport` handle. The port timeout bounds every
/// read, so a silent host shows up as a short read rather than a hang.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> IecResult<Self> {
        let port = serialport::new(name, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(std::io::Error::from)?;

        // Stale bytes from a previous session would desync the first verdict.
        port.clear(ClearBuffer::All).map_err(std::io::Error::from)?;
        debug!(port = name, baud_rate, ?timeout, "serial link open");
        Ok(Self { port })
    }

    pub fn from_config(config: &LinkConfig) -> IecResult<Self> {
        let name = config
            .port
            .as_deref()
            .ok_or_else(|| IecError::InvalidConfig("no serial port configured".to_string()))?;
        Self::open(name, config.baud_rate, config.timeout())
    }
}

impl HostLink for SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> IecResult<()> {
        trace!(len = bytes.len(), "link write");
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> IecResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn available(&mut self) -> IecResult<usize> {
        let pending = self.port.bytes_to_read().map_err(std::io::Error::from)?;
        Ok(pending as usize)
    }

    fn flush(&mut self) -> IecResult<()> {
        self.port.flush()?;
        Ok(())
    }
}

/// Print the serial ports the system knows about.
pub fn list_ports() -> IecResult<()> {
    let ports = serialport::available_ports().map_err(std::io::Error::from)?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}
