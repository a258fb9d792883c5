//! # FlockGate
//!
//! Real-time ingestion gateway for two serial devices: an NMEA GPS receiver
//! and a radio-sniffing detector that prints JSON lines. Detections are
//! enriched with the current fix and the manufacturer of their MAC prefix,
//! deduplicated by MAC address, and fanned out to subscribers as events.
//!
//! ## Architecture
//!
//! 1. **flockgate-core** - Detection store, event bus, error types
//! 2. **flockgate-devicedb** - IEEE OUI manufacturer table
//! 3. **flockgate-communication** - Serial links, line decoders, device supervision, gateway runtime
//! 4. **flockgate-settings** - Configuration files
//! 5. **flockgate** - Command line binary wiring it all together

pub use flockgate_communication::{
    list_ports, Gateway, GatewayConfig, SerialPortInfo, SerialPortOpener,
};
pub use flockgate_core::{
    ConnectionState, ConnectionStatus, DetectionRecord, DeviceRole, Error, EventFilter,
    GatewayEvent, GpsFix, PublishError, RawDetection, Result, SubscriptionId,
};
pub use flockgate_devicedb::ManufacturerTable;
pub use flockgate_settings::Config;

use std::io::Write;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Logs go to stderr so stdout stays a clean JSON-lines event stream.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Serialize an event as one JSON line, without the newline
pub fn event_line(event: &GatewayEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

/// Event sink writing JSON lines to stdout
pub fn stdout_sink(event: &GatewayEvent) -> std::result::Result<(), PublishError> {
    let line = event_line(event).map_err(|e| PublishError::Rejected(e.to_string()))?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", line).map_err(|_| PublishError::Closed)?;
    out.flush().map_err(|_| PublishError::Closed)
}
