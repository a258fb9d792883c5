//! # FlockGate Core
//!
//! Core types shared by every FlockGate crate.
//! Provides the detection data model and store, GPS fixes, device
//! connection status, the error hierarchy and the event bus.

pub mod data;
pub mod error;
pub mod event_bus;

pub use data::{
    ConnectionState, ConnectionStatus, DetectionRecord, DetectionStore, DeviceRole, Enrichment,
    GpsFix, IngestOutcome, RawDetection,
};

pub use error::{
    ConnectionError, DecodeError, Error, PublishError, Result, StoreError, SubscribeError,
};

// Re-export event bus for convenience
pub use event_bus::{
    spawn_heartbeat, Audience, ChannelSink, EventBus, EventBusConfig, EventCategory, EventFilter,
    EventSink, GatewayEvent, SubscriberGroup, SubscriptionId,
};
