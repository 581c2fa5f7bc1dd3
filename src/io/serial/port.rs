// src/io/serial/port.rs
//
// Serial port byte source backed by the serialport crate.
// A read timeout with no data is reported as an empty read; a zero-byte read
// without a timeout means the device went away.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, SerialPort, StopBits};
use std::io::{ErrorKind, Read};
use std::time::Duration;

use crate::io::error::ScanError;
use crate::io::source::ByteSource;

// ============================================================================
// Configuration
// ============================================================================

/// Parity setting for the UART link
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    fn to_serialport(self) -> serialport::Parity {
        match self {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }

    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Everything needed to open the scanner's UART
#[derive(Clone, Debug)]
pub struct SerialOptions {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// How long a single read may block before reporting no data
    pub read_timeout: Duration,
}

impl SerialOptions {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        SerialOptions {
            port: port.into(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout: Duration::from_secs(1),
        }
    }

    /// Short form such as `115200 8N1`
    pub fn line_settings(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }
}

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

// ============================================================================
// Source
// ============================================================================

/// Exclusive handle on an open serial port
pub struct SerialSource {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialSource {
    pub fn open(options: &SerialOptions) -> Result<Self, ScanError> {
        let port = serialport::new(&options.port, options.baud_rate)
            .data_bits(data_bits(options.data_bits))
            .stop_bits(stop_bits(options.stop_bits))
            .parity(options.parity.to_serialport())
            .timeout(options.read_timeout)
            .open()?;

        // Drop whatever the scanner sent before we attached; the synchronizer
        // would skip it anyway
        let _ = port.clear(serialport::ClearBuffer::Input);

        tlog!(
            "[serial] Opened {} at {} (timeout {} ms)",
            options.port,
            options.line_settings(),
            options.read_timeout.as_millis()
        );

        Ok(SerialSource {
            port,
            name: options.port.clone(),
        })
    }
}

impl ByteSource for SerialSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ScanError> {
        match self.port.read(buf) {
            Ok(0) if !buf.is_empty() => Err(ScanError::SourceClosed),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Port discovery
// ============================================================================

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// Enumerate serial ports the scanner could be attached to
pub fn list_ports() -> Result<Vec<SerialPortInfo>, String> {
    let ports =
        serialport::available_ports().map_err(|e| format!("Failed to enumerate ports: {}", e))?;

    Ok(ports
        .into_iter()
        // macOS lists each device twice; only the calling unit (/dev/cu.*) is useful
        .filter(|p| !cfg!(target_os = "macos") || !p.port_name.starts_with("/dev/tty."))
        .map(|p| {
            let mut info = SerialPortInfo {
                port_name: p.port_name,
                port_type: String::new(),
                manufacturer: None,
                product: None,
                serial_number: None,
                vid: None,
                pid: None,
            };
            info.port_type = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    info.manufacturer = usb.manufacturer;
                    info.product = usb.product;
                    info.serial_number = usb.serial_number;
                    info.vid = Some(usb.vid);
                    info.pid = Some(usb.pid);
                    "USB"
                }
                serialport::SerialPortType::BluetoothPort => "Bluetooth",
                serialport::SerialPortType::PciPort => "PCI",
                serialport::SerialPortType::Unknown => "Unknown",
            }
            .to_string();
            info
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_line_settings() {
        let options = SerialOptions::new("/dev/ttyUSB0", 115200);
        assert_eq!(options.line_settings(), "115200 8N1");
        assert_eq!(options.read_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_bit_conversions() {
        assert!(matches!(data_bits(7), DataBits::Seven));
        assert!(matches!(data_bits(9), DataBits::Eight));
        assert!(matches!(stop_bits(2), StopBits::Two));
        assert!(matches!(stop_bits(0), StopBits::One));
        assert!(matches!(Parity::Even.to_serialport(), serialport::Parity::Even));
    }

    #[test]
    fn test_parity_serde() {
        let parity: Parity = serde_json::from_str("\"odd\"").unwrap();
        assert_eq!(parity, Parity::Odd);
        assert_eq!(Parity::default(), Parity::None);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let options = SerialOptions::new("/dev/does-not-exist-bleuart", 115200);
        assert!(SerialSource::open(&options).is_err());
    }
}
