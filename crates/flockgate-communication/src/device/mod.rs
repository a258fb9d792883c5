//! Device lifecycle: connection cells, reconnection and liveness

pub mod connection;
pub mod monitor;
pub mod supervisor;

pub use connection::{DeviceConnection, LineRead};
pub use monitor::{LivenessConfig, LivenessMonitor};
pub use supervisor::{ReconnectOutcome, ReconnectPolicy, ReconnectSupervisor};
