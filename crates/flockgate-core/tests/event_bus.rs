//! Integration tests for event fan-out and terminal replay

use flockgate_core::{
    EventBus, EventBusConfig, EventCategory, EventFilter, GatewayEvent, PublishError,
    SubscriberGroup,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_replay_caps_at_configured_lines() {
    let bus = EventBus::new();
    for i in 0..120 {
        bus.publish_serial_line(&format!("raw {i}"));
    }
    let (id, mut rx) = bus.subscribe_channel(EventFilter::All);
    assert_eq!(bus.join_terminal(id).unwrap(), 50);

    assert_eq!(rx.try_recv().unwrap(), GatewayEvent::SerialConnected);
    for i in 70..120 {
        assert_eq!(
            rx.try_recv().unwrap(),
            GatewayEvent::SerialData(format!("raw {i}"))
        );
    }
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_join_with_empty_buffer_sends_only_ack() {
    let bus = EventBus::new();
    let (id, mut rx) = bus.subscribe_channel(EventFilter::All);
    assert_eq!(bus.join_terminal(id).unwrap(), 0);
    assert_eq!(rx.try_recv().unwrap(), GatewayEvent::SerialConnected);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_dropped_receiver_does_not_block_others() {
    let bus = EventBus::new();
    let (_gone, rx) = bus.subscribe_channel(EventFilter::All);
    drop(rx);
    let (_alive, mut alive_rx) = bus.subscribe_channel(EventFilter::All);

    assert_eq!(bus.publish(GatewayEvent::DetectionsCleared), 1);
    assert_eq!(alive_rx.try_recv().unwrap(), GatewayEvent::DetectionsCleared);
}

#[test]
fn test_send_to_single_subscriber() {
    let bus = EventBus::new();
    let (a, mut rx_a) = bus.subscribe_channel(EventFilter::All);
    let (_b, mut rx_b) = bus.subscribe_channel(EventFilter::All);

    let err = GatewayEvent::SerialError {
        message: "No port specified".to_string(),
    };
    bus.send_to(a, &err).unwrap();
    assert_eq!(rx_a.try_recv().unwrap(), err);
    assert!(rx_b.try_recv().is_err());
}

#[test]
fn test_category_filter_skips_terminal_events() {
    let bus = EventBus::new();
    let (_id, mut rx) =
        bus.subscribe_channel(EventFilter::Categories(vec![EventCategory::Detection]));
    bus.publish(GatewayEvent::Heartbeat);
    bus.publish(GatewayEvent::DetectionsCleared);
    assert_eq!(rx.try_recv().unwrap(), GatewayEvent::DetectionsCleared);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_concurrent_lines_keep_replay_before_live() {
    let bus = Arc::new(EventBus::with_config(EventBusConfig {
        terminal_buffer_size: 10_000,
        terminal_replay_lines: 10_000,
        ..Default::default()
    }));

    let writer = {
        let bus = bus.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                bus.publish_serial_line(&i.to_string());
            }
        })
    };

    let (id, mut rx) = bus.subscribe_channel(EventFilter::All);
    bus.join_terminal(id).unwrap();
    writer.join().unwrap();

    assert_eq!(rx.try_recv().unwrap(), GatewayEvent::SerialConnected);
    let mut seen = Vec::new();
    while let Ok(GatewayEvent::SerialData(line)) = rx.try_recv() {
        seen.push(line.parse::<u32>().unwrap());
    }
    // Every line exactly once, strictly in order
    assert_eq!(seen, (0..2_000).collect::<Vec<_>>());
    assert!(bus.is_member(id, SubscriberGroup::Terminal));
}

#[test]
fn test_failing_closure_counted_as_undelivered() {
    let bus = EventBus::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let a = attempts.clone();
    bus.subscribe(EventFilter::All, move |_: &GatewayEvent| {
        a.fetch_add(1, Ordering::SeqCst);
        Err(PublishError::Rejected("socket gone".to_string()))
    });

    assert_eq!(bus.publish(GatewayEvent::Heartbeat), 0);
    assert_eq!(bus.publish(GatewayEvent::Heartbeat), 0);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
