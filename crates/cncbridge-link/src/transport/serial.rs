//! Serial port transport: enumeration and a [`Transport`] implementation
//! over the `serialport` crate, grounded on the same short-timeout polling
//! idiom used throughout this dialect's controllers.

use std::io::{Read, Write};
use std::time::Duration;

use cncbridge_core::{Error, Result, TransportError};

use super::{ConnectionParams, SerialParity, Transport};

/// Information about one serial device the OS reports.
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// OS-level port name (e.g. `/dev/ttyUSB0`, `COM3`).
    pub port_name: String,
    /// Best-effort human description.
    pub description: String,
    /// USB manufacturer string, if the device reports one.
    pub manufacturer: Option<String>,
    /// USB serial number, if the device reports one.
    pub serial_number: Option<String>,
    /// USB vendor ID, if applicable.
    pub vid: Option<u16>,
    /// USB product ID, if applicable.
    pub pid: Option<u16>,
}

/// List serial ports that look like a USB CNC controller (plain OS COM
/// ports, or `/dev/ttyUSB*`/`/dev/ttyACM*`/`/dev/cu.usb*` on Unix), skipping
/// ports unlikely to ever be a controller (Bluetooth SPP, PCI modems, etc.).
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| Error::other(format!("failed to enumerate serial ports: {e}")))?;

    Ok(ports
        .iter()
        .filter(|p| is_valid_cnc_port(&p.port_name))
        .map(|p| {
            let mut info = SerialPortInfo {
                port_name: p.port_name.clone(),
                description: describe(p),
                manufacturer: None,
                serial_number: None,
                vid: None,
                pid: None,
            };
            if let serialport::SerialPortType::UsbPort(usb) = &p.port_type {
                info.manufacturer = usb.manufacturer.clone();
                info.serial_number = usb.serial_number.clone();
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
            }
            info
        })
        .collect())
}

fn is_valid_cnc_port(name: &str) -> bool {
    if let Some(rest) = name.strip_prefix("COM") {
        return !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit());
    }
    name.starts_with("/dev/ttyUSB")
        || name.starts_with("/dev/ttyACM")
        || name.starts_with("/dev/cu.usbserial")
        || name.starts_with("/dev/cu.usbmodem")
}

fn describe(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("device"),
            usb.product.as_deref().unwrap_or("serial port"),
        ),
        _ => "serial port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// A [`Transport`] backed by a local serial device.
pub struct SerialTransport {
    params: ConnectionParams,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    /// Build a transport for the given parameters; does not open the port yet.
    pub fn new(params: ConnectionParams) -> Self {
        Self { params, port: None }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        let data_bits = match self.params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(super::invalid_address(
                    &self.params.address,
                    format!("invalid data bits: {other}"),
                ))
            }
        };
        let stop_bits = match self.params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(super::invalid_address(
                    &self.params.address,
                    format!("invalid stop bits: {other}"),
                ))
            }
        };

        let built = serialport::new(&self.params.address, self.params.baud_rate)
            .timeout(self.params.timeout)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(self.params.parity))
            .flow_control(if self.params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| {
                tracing::warn!(port = %self.params.address, error = %e, "failed to open serial port");
                TransportError::Io {
                    reason: e.to_string(),
                }
            })?;

        self.port = Some(built);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.port = None;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.write_all(buf).map_err(|e| TransportError::Io {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::Io {
                reason: e.to_string(),
            }
            .into()),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.params.timeout = timeout;
        if let Some(port) = self.port.as_mut() {
            port.set_timeout(timeout).map_err(|e| TransportError::Io {
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_cnc_port_patterns() {
        assert!(is_valid_cnc_port("COM3"));
        assert!(is_valid_cnc_port("/dev/ttyUSB0"));
        assert!(is_valid_cnc_port("/dev/ttyACM1"));
        assert!(!is_valid_cnc_port("/dev/tty.Bluetooth-Incoming"));
        assert!(!is_valid_cnc_port("COM"));
    }
}
