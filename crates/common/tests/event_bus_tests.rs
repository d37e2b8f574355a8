//! Event Bus Integration Tests
//!
//! Tests for the channel that carries scanner events from session threads to the consumer.
//!
//! # Test Scenarios
//! - Many producer threads, one async consumer
//! - Per-producer ordering
//! - Closing the bus as a shutdown path
//! - Unbounded capacity (no backpressure)
//!
//! Run with: `cargo test -p common --test event_bus_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, collect_events, with_timeout};
use common::{HotplugNotification, create_event_bus, create_notification_channel};
use protocol::{DeviceId, ScannerEvent};
use std::collections::HashMap;
use std::thread;

fn barcode(device: &str, text: &str) -> ScannerEvent {
    ScannerEvent::Barcode {
        device_id: DeviceId::from(device),
        raw_bytes: None,
        text: Some(text.to_string()),
    }
}

// ============================================================================
// Producer / Consumer Tests
// ============================================================================

#[tokio::test]
async fn test_many_producers_single_consumer() {
    let (sink, stream) = create_event_bus();

    let handles: Vec<_> = (1..=4)
        .map(|address| {
            let sink = sink.clone();
            thread::spawn(move || {
                let device_id = DeviceId::from_bus_address(1, address);
                sink.publish(ScannerEvent::Connected {
                    device_id: device_id.clone(),
                })
                .unwrap();
                for i in 0..25 {
                    sink.publish(barcode(device_id.as_str(), &i.to_string()))
                        .unwrap();
                }
                sink.publish(ScannerEvent::Disconnected { device_id })
                    .unwrap();
            })
        })
        .collect();
    drop(sink);

    for handle in handles {
        handle.join().expect("Producer thread panicked");
    }

    let mut per_device: HashMap<DeviceId, Vec<ScannerEvent>> = HashMap::new();
    while let Some(event) = with_timeout(DEFAULT_TEST_TIMEOUT, stream.recv())
        .await
        .expect("Timed out waiting for events")
    {
        per_device
            .entry(event.device_id().clone())
            .or_default()
            .push(event);
    }

    assert_eq!(per_device.len(), 4);
    for events in per_device.values() {
        assert_eq!(events.len(), 27);
        assert_eq!(events.first().unwrap().kind(), "connected");
        assert_eq!(events.last().unwrap().kind(), "disconnected");

        // Barcodes arrive in publish order
        let texts: Vec<String> = events[1..26]
            .iter()
            .map(|e| match e {
                ScannerEvent::Barcode { text, .. } => text.clone().unwrap(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(texts, expected);
    }
}

#[test]
fn test_no_backpressure() {
    let (sink, stream) = create_event_bus();

    // Nobody is reading; publishing must still never block or fail
    for i in 0..10_000 {
        sink.publish(barcode("1-5", &i.to_string())).unwrap();
    }
    assert_eq!(stream.len(), 10_000);
}

#[test]
fn test_blocking_consumer() {
    let (sink, stream) = create_event_bus();
    let producer = thread::spawn(move || {
        sink.publish(barcode("2-3", "X")).unwrap();
    });

    let event = stream.recv_blocking().unwrap();
    assert_eq!(event, barcode("2-3", "X"));
    producer.join().unwrap();
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_close_lets_consumer_drain_then_stop() {
    let (sink, stream) = create_event_bus();
    sink.publish(barcode("1-5", "before close")).unwrap();

    stream.close();
    assert!(sink.publish(barcode("1-5", "after close")).is_err());

    let drained = collect_events(&stream);
    assert_eq!(drained, vec![barcode("1-5", "before close")]);
    assert!(stream.recv().await.is_none());
}

// ============================================================================
// Notification Channel Tests
// ============================================================================

#[test]
fn test_notification_channel_preserves_order() {
    let (tx, rx) = create_notification_channel();
    tx.send_blocking(HotplugNotification::bind(1, 4, "/devices/usb1/1-1"))
        .unwrap();
    tx.send_blocking(HotplugNotification::unbind(1, 4, "/devices/usb1/1-1"))
        .unwrap();
    drop(tx);

    let received: Vec<_> = std::iter::from_fn(|| rx.recv_blocking().ok()).collect();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].action, common::HotplugAction::Bind);
    assert_eq!(received[1].action, common::HotplugAction::Unbind);
}
