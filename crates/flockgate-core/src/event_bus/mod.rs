//! # Event Bus Module
//!
//! Publish/subscribe fan-out for everything the gateway reports.
//!
//! ## Overview
//!
//! - Publishers emit typed [`GatewayEvent`]s without knowing subscribers
//! - Subscribers register an [`EventSink`] and an [`EventFilter`]
//! - The terminal group receives raw detector lines, with replay on join
//! - A heartbeat task keeps idle subscribers informed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flockgate_core::event_bus::{EventBus, EventFilter, GatewayEvent};
//!
//! let bus = EventBus::new();
//! let (id, mut rx) = bus.subscribe_channel(EventFilter::All);
//!
//! bus.publish(GatewayEvent::Heartbeat);
//! assert_eq!(rx.try_recv().unwrap(), GatewayEvent::Heartbeat);
//!
//! bus.unsubscribe(id);
//! ```

mod bus;
mod events;
mod heartbeat;

pub use bus::*;
pub use events::*;
pub use heartbeat::spawn_heartbeat;
