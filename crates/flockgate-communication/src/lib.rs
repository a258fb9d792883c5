//! # FlockGate Communication
//!
//! Serial device handling for the FlockGate ingestion gateway.
//!
//! - [`communication`]: the serial link abstraction and its `serialport` backend
//! - [`protocol`]: NMEA and detector JSON-lines decoding
//! - [`device`]: connection cells, reconnection supervisor, liveness monitor
//! - [`gateway`]: the runtime tying devices, store and event bus together

pub mod communication;
pub mod device;
pub mod gateway;
pub mod protocol;

pub use communication::{
    serial::{list_ports, RealSerialPort, SerialPortInfo, SerialPortOpener},
    ConnectionParams, LinkSettings, PortOpener, SerialLink,
};
pub use device::{
    DeviceConnection, LineRead, LivenessConfig, LivenessMonitor, ReconnectOutcome,
    ReconnectPolicy, ReconnectSupervisor,
};
pub use gateway::{Gateway, GatewayConfig, NOT_CONNECTED_MESSAGE, NO_PORT_MESSAGE};
pub use protocol::{classify_line, decode_sentence, parse_detection, parse_fix, DetectorLine};
