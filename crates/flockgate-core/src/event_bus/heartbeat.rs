//! Periodic keep-alive published on the default channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{EventBus, GatewayEvent};

/// Publish `heartbeat` every `period` until the returned task is aborted.
///
/// The first heartbeat goes out one full period after the call.
pub fn spawn_heartbeat(bus: Arc<EventBus>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let delivered = bus.publish(GatewayEvent::Heartbeat);
            tracing::trace!("Heartbeat delivered to {} subscribers", delivered);
        }
    })
}
