//! Event Bus implementation.
//!
//! Fans gateway events out to registered sinks. Default-channel events reach
//! every subscriber whose filter matches; group events reach only members of
//! that group. The raw terminal stream also feeds a bounded replay buffer so
//! a late joiner sees recent output before live lines.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::events::{EventCategory, GatewayEvent};
use crate::error::{PublishError, SubscribeError};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event types on the default channel
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &GatewayEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

/// Named subset of subscribers for targeted delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberGroup {
    /// Receives raw detector output
    Terminal,
}

/// Where a published event goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every subscriber whose filter matches
    Everyone,
    /// Only members of one group
    Group(SubscriberGroup),
}

/// Transport-agnostic delivery endpoint for one subscriber
pub trait EventSink: Send + Sync {
    /// Hand one event to the subscriber's transport
    fn deliver(&self, event: &GatewayEvent) -> Result<(), PublishError>;
}

impl<F> EventSink for F
where
    F: Fn(&GatewayEvent) -> Result<(), PublishError> + Send + Sync,
{
    fn deliver(&self, event: &GatewayEvent) -> Result<(), PublishError> {
        self(event)
    }
}

/// Sink forwarding into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: &GatewayEvent) -> Result<(), PublishError> {
        self.tx.send(event.clone()).map_err(|_| PublishError::Closed)
    }
}

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast receiver.
    pub channel_capacity: usize,
    /// Raw terminal lines kept for replay.
    pub terminal_buffer_size: usize,
    /// Raw terminal lines replayed to a new terminal subscriber.
    pub terminal_replay_lines: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            terminal_buffer_size: 1000,
            terminal_replay_lines: 50,
        }
    }
}

struct Subscriber {
    filter: EventFilter,
    sink: Arc<dyn EventSink>,
    groups: HashSet<SubscriberGroup>,
}

/// Central event bus for gateway-wide event distribution
pub struct EventBus {
    /// Broadcast sender mirroring the default channel
    sender: broadcast::Sender<GatewayEvent>,
    /// Registered sinks
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    /// Recent raw detector lines, oldest first.
    ///
    /// Held while appending + delivering a line and while a terminal
    /// subscriber joins, so replay always precedes live lines.
    terminal: Mutex<VecDeque<String>>,
    /// Configuration
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            subscribers: RwLock::new(HashMap::new()),
            terminal: Mutex::new(VecDeque::with_capacity(config.terminal_buffer_size)),
            config,
        }
    }

    /// Publish an event to every matching subscriber
    ///
    /// Returns the number of successful sink deliveries. Failing sinks are
    /// logged and skipped.
    pub fn publish(&self, event: GatewayEvent) -> usize {
        self.publish_to(Audience::Everyone, event)
    }

    /// Publish an event to an audience
    pub fn publish_to(&self, audience: Audience, event: GatewayEvent) -> usize {
        tracing::trace!("Publishing {}", event.description());

        let delivered = {
            let subscribers = self.subscribers.read();
            let targets = subscribers.iter().filter(|(_, sub)| match audience {
                Audience::Everyone => sub.filter.matches(&event),
                Audience::Group(group) => sub.groups.contains(&group),
            });
            deliver_all(targets, &event)
        };

        if audience == Audience::Everyone {
            // Nobody holding a receiver is not an error
            let _ = self.sender.send(event);
        }

        delivered
    }

    /// Record a raw detector line and push it to the terminal group
    pub fn publish_serial_line(&self, line: &str) -> usize {
        let mut buffer = self.terminal.lock();
        buffer.push_back(line.to_string());
        while buffer.len() > self.config.terminal_buffer_size {
            buffer.pop_front();
        }

        let event = GatewayEvent::SerialData(line.to_string());
        let subscribers = self.subscribers.read();
        let targets = subscribers
            .iter()
            .filter(|(_, sub)| sub.groups.contains(&SubscriberGroup::Terminal));
        deliver_all(targets, &event)
    }

    /// Add a subscriber to the terminal group and replay recent lines to it.
    ///
    /// Sends `serial_connected` followed by up to `terminal_replay_lines`
    /// buffered lines in their original order. Returns the replayed count.
    pub fn join_terminal(&self, id: SubscriptionId) -> Result<usize, SubscribeError> {
        let buffer = self.terminal.lock();
        let sink = {
            let mut subscribers = self.subscribers.write();
            let sub = subscribers
                .get_mut(&id)
                .ok_or_else(|| SubscribeError::UnknownSubscriber(id.to_string()))?;
            sub.groups.insert(SubscriberGroup::Terminal);
            sub.sink.clone()
        };

        deliver_one(id, sink.as_ref(), &GatewayEvent::SerialConnected);

        let skip = buffer.len().saturating_sub(self.config.terminal_replay_lines);
        let mut replayed = 0;
        for line in buffer.iter().skip(skip) {
            deliver_one(id, sink.as_ref(), &GatewayEvent::SerialData(line.clone()));
            replayed += 1;
        }
        tracing::debug!("Replayed {} terminal lines to {}", replayed, id);
        Ok(replayed)
    }

    /// Remove a subscriber from a group
    ///
    /// Returns true if the subscriber was a member.
    pub fn leave_group(&self, id: SubscriptionId, group: SubscriberGroup) -> bool {
        self.subscribers
            .write()
            .get_mut(&id)
            .is_some_and(|sub| sub.groups.remove(&group))
    }

    /// Whether a subscriber belongs to a group
    pub fn is_member(&self, id: SubscriptionId, group: SubscriberGroup) -> bool {
        self.subscribers
            .read()
            .get(&id)
            .is_some_and(|sub| sub.groups.contains(&group))
    }

    /// Deliver an event to exactly one subscriber
    pub fn send_to(&self, id: SubscriptionId, event: &GatewayEvent) -> Result<(), PublishError> {
        let sink = self
            .subscribers
            .read()
            .get(&id)
            .map(|sub| sub.sink.clone())
            .ok_or(PublishError::Closed)?;
        sink.deliver(event)
    }

    /// Subscribe a sink to the default channel
    pub fn subscribe<S>(&self, filter: EventFilter, sink: S) -> SubscriptionId
    where
        S: EventSink + 'static,
    {
        let id = SubscriptionId::new();
        self.subscribers.write().insert(
            id,
            Subscriber {
                filter,
                sink: Arc::new(sink),
                groups: HashSet::new(),
            },
        );
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Subscribe with a channel sink and get the receiving half
    pub fn subscribe_channel(
        &self,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (sink, rx) = ChannelSink::new();
        (self.subscribe(filter, sink), rx)
    }

    /// Get a receiver mirroring the default channel
    ///
    /// Group-targeted events are not mirrored.
    pub fn receiver(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe from events and leave all groups
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Snapshot of the raw terminal buffer, oldest first
    pub fn terminal_backlog(&self) -> Vec<String> {
        self.terminal.lock().iter().cloned().collect()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

fn deliver_all<'a>(
    targets: impl Iterator<Item = (&'a SubscriptionId, &'a Subscriber)>,
    event: &GatewayEvent,
) -> usize {
    targets
        .filter(|(id, sub)| deliver_one(**id, sub.sink.as_ref(), event))
        .count()
}

fn deliver_one(id: SubscriptionId, sink: &dyn EventSink, event: &GatewayEvent) -> bool {
    match sink.deliver(event) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Delivery of {} to {} failed: {}", event.kind(), id, e);
            false
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_bus_creation() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();

        let id = bus.subscribe(
            EventFilter::All,
            |_: &GatewayEvent| -> Result<(), PublishError> { Ok(()) },
        );
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);

        // Double unsubscribe should return false
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_event_filtering() {
        let bus = EventBus::new();
        let connection_count = Arc::new(AtomicUsize::new(0));
        let detection_count = Arc::new(AtomicUsize::new(0));

        let cc = connection_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Connection]),
            move |_: &GatewayEvent| -> Result<(), PublishError> {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        let dc = detection_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Detection]),
            move |_: &GatewayEvent| -> Result<(), PublishError> {
                dc.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        bus.publish(GatewayEvent::GpsDisconnected);
        bus.publish(GatewayEvent::DetectionsCleared);

        assert_eq!(connection_count.load(Ordering::SeqCst), 1);
        assert_eq!(detection_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_sink_is_isolated() {
        let bus = EventBus::new();
        let good = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventFilter::All, |_: &GatewayEvent| {
            Err(PublishError::Closed)
        });
        let g = good.clone();
        bus.subscribe(EventFilter::All, move |_: &GatewayEvent| -> Result<(), PublishError> {
            g.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish(GatewayEvent::Heartbeat), 1);
        assert_eq!(good.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_serial_lines_only_reach_terminal_group() {
        let bus = EventBus::new();
        let (plain, mut plain_rx) = bus.subscribe_channel(EventFilter::All);
        let (term, mut term_rx) = bus.subscribe_channel(EventFilter::All);
        bus.join_terminal(term).unwrap();
        assert_eq!(term_rx.try_recv().unwrap(), GatewayEvent::SerialConnected);

        assert_eq!(bus.publish_serial_line("boot ok"), 1);
        assert_eq!(
            term_rx.try_recv().unwrap(),
            GatewayEvent::SerialData("boot ok".to_string())
        );
        assert!(plain_rx.try_recv().is_err());
        assert!(!bus.is_member(plain, SubscriberGroup::Terminal));
    }

    #[test]
    fn test_terminal_buffer_is_bounded() {
        let bus = EventBus::with_config(EventBusConfig {
            terminal_buffer_size: 3,
            ..Default::default()
        });
        for i in 0..5 {
            bus.publish_serial_line(&format!("line {i}"));
        }
        assert_eq!(bus.terminal_backlog(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_join_terminal_replays_most_recent_in_order() {
        let bus = EventBus::with_config(EventBusConfig {
            terminal_buffer_size: 10,
            terminal_replay_lines: 2,
            ..Default::default()
        });
        for i in 0..4 {
            bus.publish_serial_line(&format!("line {i}"));
        }

        let (id, mut rx) = bus.subscribe_channel(EventFilter::All);
        assert_eq!(bus.join_terminal(id).unwrap(), 2);
        bus.publish_serial_line("live");

        assert_eq!(rx.try_recv().unwrap(), GatewayEvent::SerialConnected);
        assert_eq!(
            rx.try_recv().unwrap(),
            GatewayEvent::SerialData("line 2".to_string())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            GatewayEvent::SerialData("line 3".to_string())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            GatewayEvent::SerialData("live".to_string())
        );
    }

    #[test]
    fn test_leave_group() {
        let bus = EventBus::new();
        let (id, _rx) = bus.subscribe_channel(EventFilter::All);
        bus.join_terminal(id).unwrap();
        assert!(bus.leave_group(id, SubscriberGroup::Terminal));
        assert!(!bus.leave_group(id, SubscriberGroup::Terminal));
        assert_eq!(bus.publish_serial_line("x"), 0);
    }

    #[test]
    fn test_join_unknown_subscriber() {
        let bus = EventBus::new();
        let (id, _rx) = bus.subscribe_channel(EventFilter::All);
        bus.unsubscribe(id);
        assert!(matches!(
            bus.join_terminal(id),
            Err(SubscribeError::UnknownSubscriber(_))
        ));
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        bus.publish(GatewayEvent::reconnected(
            crate::data::DeviceRole::Gps,
            "test",
        ));

        let received = receiver.try_recv();
        if let Ok(GatewayEvent::GpsReconnected { port }) = received {
            assert_eq!(port, "test");
        } else {
            panic!("Wrong event received");
        }
    }

    #[tokio::test]
    async fn test_group_events_not_mirrored() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();
        bus.publish_serial_line("raw");
        bus.publish_to(
            Audience::Group(SubscriberGroup::Terminal),
            GatewayEvent::SerialConnected,
        );
        assert!(receiver.try_recv().is_err());
    }
}
