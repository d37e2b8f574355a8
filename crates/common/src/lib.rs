//! Common utilities for usb-barcode
//!
//! This crate provides the plumbing shared by the host and its tests: the event bus that
//! carries `ScannerEvent`s to the consumer, the hot-plug notification channel, the shutdown
//! signal, USB abstraction traits, error handling and logging.

pub mod channel;
pub mod clock;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod test_utils;
pub mod usb_types;

pub use channel::{
    EventSink, EventStream, NotificationReceiver, NotificationSender, create_event_bus,
    create_notification_channel,
};
pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use shutdown::Shutdown;
pub use usb_types::{
    BulkRead, ControlTransport, DeviceIdentity, HotplugAction, HotplugNotification,
    NotificationDeviceType, TransportError, UsbBus, UsbDevice,
};
