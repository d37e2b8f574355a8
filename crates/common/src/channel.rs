//! Channels between USB threads and the Tokio runtime
//!
//! Two channels connect the pieces of the host:
//!
//! - the **event bus**: every session thread (and the startup scan) publishes `ScannerEvent`s,
//!   a single consumer reads them. It is unbounded: a consumer that stops reading makes memory
//!   grow without limit. With a handful of scanners attached this is acceptable, but it is a
//!   limit of the design.
//! - the **notification channel**: hot-plug sources push OS notifications to the monitor thread.

use async_channel::{Receiver, Sender, bounded, unbounded};
use protocol::ScannerEvent;
use tracing::debug;

use crate::usb_types::HotplugNotification;

/// Capacity of the hot-plug notification channel
pub const NOTIFICATION_CAPACITY: usize = 256;

/// Producer side of the event bus
///
/// Cheap to clone; hand one clone to every session.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<ScannerEvent>,
}

impl EventSink {
    /// Publish an event
    ///
    /// Never blocks. Fails only once the bus has been closed.
    pub fn publish(&self, event: ScannerEvent) -> crate::Result<()> {
        self.tx
            .try_send(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Whether the consumer side has closed the bus
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the event bus
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<ScannerEvent>,
}

impl EventStream {
    /// Receive the next event
    ///
    /// Returns None once the bus is closed and drained, or once every sink is dropped.
    pub async fn recv(&self) -> Option<ScannerEvent> {
        self.rx.recv().await.ok()
    }

    /// Receive the next event (blocking)
    pub fn recv_blocking(&self) -> Option<ScannerEvent> {
        self.rx.recv_blocking().ok()
    }

    /// Receive an event if one is queued
    pub fn try_recv(&self) -> Option<ScannerEvent> {
        self.rx.try_recv().ok()
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Close the bus
    ///
    /// Further publishes fail; already queued events can still be received.
    pub fn close(&self) -> bool {
        let closed = self.rx.close();
        if closed {
            debug!("Event bus closed with {} event(s) queued", self.rx.len());
        }
        closed
    }
}

/// Create the event bus
///
/// Returns (EventSink for producers, EventStream for the consumer)
pub fn create_event_bus() -> (EventSink, EventStream) {
    let (tx, rx) = unbounded();
    (EventSink { tx }, EventStream { rx })
}

/// Sender half of the notification channel
pub type NotificationSender = Sender<HotplugNotification>;

/// Receiver half of the notification channel
pub type NotificationReceiver = Receiver<HotplugNotification>;

/// Create the channel from hot-plug sources to the monitor
pub fn create_notification_channel() -> (NotificationSender, NotificationReceiver) {
    bounded(NOTIFICATION_CAPACITY)
}
