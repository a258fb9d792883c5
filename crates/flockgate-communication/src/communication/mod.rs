//! Serial link abstraction
//!
//! The gateway never talks to `serialport` directly. It opens ports through a
//! [`PortOpener`] and reads lines through a [`SerialLink`], so tests can swap
//! in scripted devices.

pub mod serial;

use flockgate_core::ConnectionError;
use std::io;
use std::time::Duration;

/// Parameters used to open one port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on a single blocking read
    pub timeout: Duration,
}

/// Per-role serial settings, combined with a port name at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl LinkSettings {
    /// NMEA receivers: 9600 baud, 1 s timeout
    pub const fn gps() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_secs(1),
        }
    }

    /// Detector firmware: 115200 baud, 1 s timeout
    pub const fn detector() -> Self {
        Self {
            baud_rate: 115200,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn params(&self, port: &str) -> ConnectionParams {
        ConnectionParams {
            port: port.to_string(),
            baud_rate: self.baud_rate,
            timeout: self.timeout,
        }
    }
}

/// An open, line-oriented serial handle
///
/// Dropping the link closes it.
pub trait SerialLink: Send {
    /// Read one line without its terminator.
    ///
    /// Blocks for at most the configured timeout. `Ok(None)` means nothing
    /// complete arrived in time; any `Err` means the device is gone.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Cheap validity check used by the liveness monitor
    fn is_open(&mut self) -> bool;

    /// Name of the underlying port
    fn port_name(&self) -> &str;
}

/// Factory for serial links
pub trait PortOpener: Send + Sync {
    /// Open a port; may block for as long as the OS takes
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>, ConnectionError>;
}
