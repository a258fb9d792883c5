//! Serial port communication implementation
//!
//! Provides the `serialport` backed [`SerialLink`] used in production.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Line assembly across read timeouts
//! - Liveness probing through the driver's input queue

use super::{ConnectionParams, PortOpener, SerialLink};
use flockgate_core::ConnectionError;
use std::io::{self, Read};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List available serial ports on the system
pub fn list_ports() -> Result<Vec<SerialPortInfo>, ConnectionError> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::IoError {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let description = get_port_description(&port);
            match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                    port_name: port.port_name,
                    description,
                    manufacturer: usb.manufacturer,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                },
                _ => SerialPortInfo {
                    port_name: port.port_name,
                    description,
                    manufacturer: None,
                    vid: None,
                    pid: None,
                },
            }
        })
        .collect())
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Longest partial line kept while waiting for its terminator
pub const MAX_LINE_BYTES: usize = 4096;

/// Splits a byte stream into `\n` terminated lines.
///
/// A partial line longer than its limit is dropped and everything up to the
/// next terminator is skipped, so a device sending garbage at the wrong baud
/// rate cannot grow the buffer without bound.
#[derive(Debug)]
pub struct LineAssembler {
    pending: Vec<u8>,
    limit: usize,
    /// Skipping the rest of an oversized line
    resyncing: bool,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineAssembler {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::with_capacity(256),
            limit,
            resyncing: false,
        }
    }

    /// Append freshly read bytes.
    ///
    /// Returns false when an oversized partial line was dropped.
    pub fn push(&mut self, mut bytes: &[u8]) -> bool {
        if self.resyncing {
            match bytes.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.resyncing = false;
                    bytes = &bytes[end + 1..];
                }
                None => return true,
            }
        }

        self.pending.extend_from_slice(bytes);
        let complete = self
            .pending
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let partial = self.pending.len() - complete;
        if partial > self.limit {
            tracing::warn!(
                "Dropping {} bytes without a line terminator, resyncing",
                partial
            );
            self.pending.truncate(complete);
            self.resyncing = true;
            return false;
        }
        true
    }

    /// Take the next complete line without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(
            String::from_utf8_lossy(&line)
                .trim_end_matches(['\r', '\n'])
                .to_string(),
        )
    }

    /// Bytes buffered for lines not yet returned
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

/// Real serial port implementation using serialport crate
pub struct RealSerialPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    lines: LineAssembler,
}

impl RealSerialPort {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self, ConnectionError> {
        if params.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            });
        }

        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(params.timeout)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        Ok(Self::from_port(port, &params.port))
    }

    /// Wrap an already open port
    pub fn from_port(port: Box<dyn serialport::SerialPort>, name: &str) -> Self {
        Self {
            port,
            name: name.to_string(),
            lines: LineAssembler::default(),
        }
    }
}

impl SerialLink for RealSerialPort {
    /// Keeps reading until a line completes or a read times out
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(Some(line));
            }

            match self.port.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial port returned end of file",
                    ))
                }
                Ok(n) => {
                    // Hand control back after a dropped line so the caller can
                    // notice a disconnect
                    if !self.lines.push(&buf[..n]) {
                        return Ok(None);
                    }
                }
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn is_open(&mut self) -> bool {
        self.port.bytes_to_read().is_ok()
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// Opens [`RealSerialPort`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>, ConnectionError> {
        let port = RealSerialPort::open(params)?;
        tracing::info!(
            "Opened serial port {} at {} baud",
            params.port,
            params.baud_rate
        );
        Ok(Box::new(port))
    }
}
