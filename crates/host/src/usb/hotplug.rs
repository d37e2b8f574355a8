//! Hot-plug notification sources
//!
//! Each source runs on its own thread and pushes [`HotplugNotification`]s into the notification
//! channel until shutdown. Two sources exist:
//!
//! - libusb hotplug callbacks (default, works wherever libusb supports hotplug)
//! - the udev netlink socket (`udev` feature, Linux only)

use common::{
    HotplugAction, HotplugNotification, NotificationDeviceType, NotificationSender, Shutdown,
};
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::device::port_path;

/// Interval at which source threads re-check the shutdown signal
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where hot-plug notifications come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotplugBackend {
    #[default]
    Libusb,
    Udev,
}

impl std::fmt::Display for HotplugBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotplugBackend::Libusb => write!(f, "libusb"),
            HotplugBackend::Udev => write!(f, "udev"),
        }
    }
}

/// Failure to start a hot-plug source
#[derive(Debug, Error)]
pub enum HotplugError {
    #[error("libusb on this platform does not support hotplug")]
    Unsupported,

    #[error("{0} hot-plug source is not compiled in")]
    Unavailable(HotplugBackend),

    #[error("Failed to register hotplug callback: {0}")]
    Registration(#[from] rusb::Error),

    #[error("Hot-plug source I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the configured source
pub fn spawn_source(
    backend: HotplugBackend,
    context: &Context,
    tx: NotificationSender,
    shutdown: Shutdown,
) -> Result<JoinHandle<()>, HotplugError> {
    match backend {
        HotplugBackend::Libusb => spawn_libusb_source(context, tx, shutdown),
        #[cfg(all(target_os = "linux", feature = "udev"))]
        HotplugBackend::Udev => udev::spawn_udev_source(tx, shutdown),
        #[cfg(not(all(target_os = "linux", feature = "udev")))]
        HotplugBackend::Udev => Err(HotplugError::Unavailable(backend)),
    }
}

/// Forwards libusb hotplug callbacks into the notification channel
struct NotificationForwarder {
    tx: NotificationSender,
}

impl NotificationForwarder {
    fn forward(&self, notification: HotplugNotification) {
        trace!("libusb hotplug: {:?}", notification);
        if let Err(e) = self.tx.try_send(notification) {
            if e.is_full() {
                warn!("Notification channel full, dropping hot-plug event");
            }
        }
    }
}

impl<T: UsbContext> Hotplug<T> for NotificationForwarder {
    fn device_arrived(&mut self, device: Device<T>) {
        let path = port_path(&device).unwrap_or_default();
        self.forward(HotplugNotification::bind(
            device.bus_number(),
            device.address(),
            path,
        ));
    }

    fn device_left(&mut self, device: Device<T>) {
        let path = port_path(&device).unwrap_or_default();
        self.forward(HotplugNotification::unbind(
            device.bus_number(),
            device.address(),
            path,
        ));
    }
}

/// Register libusb hotplug callbacks and drive them from a dedicated thread
///
/// Registration happens before the thread starts, so a missing hotplug capability is
/// reported to the caller instead of being logged from the thread.
pub fn spawn_libusb_source(
    context: &Context,
    tx: NotificationSender,
    shutdown: Shutdown,
) -> Result<JoinHandle<()>, HotplugError> {
    if !rusb::has_hotplug() {
        return Err(HotplugError::Unsupported);
    }

    let registration: Registration<Context> = HotplugBuilder::new()
        .enumerate(false)
        .register(context, Box::new(NotificationForwarder { tx }))?;
    debug!("Hot-plug callbacks registered");

    let context = context.clone();
    let handle = std::thread::Builder::new()
        .name("hotplug-libusb".to_string())
        .spawn(move || {
            info!("libusb hot-plug source started");
            while !shutdown.is_triggered() {
                match context.handle_events(Some(EVENT_POLL_INTERVAL)) {
                    Ok(()) => {}
                    Err(rusb::Error::Interrupted) => {
                        debug!("USB event handling interrupted");
                    }
                    Err(e) => {
                        warn!("Error handling USB events: {}", e);
                        std::thread::sleep(EVENT_POLL_INTERVAL);
                    }
                }
            }
            drop(registration);
            info!("libusb hot-plug source stopped");
        })?;
    Ok(handle)
}

/// Build a notification from udev event properties
///
/// `busnum`/`devnum` are the `BUSNUM`/`DEVNUM` properties, absent on interface events.
pub fn notification_from_udev(
    devtype: Option<&str>,
    busnum: Option<&str>,
    devnum: Option<&str>,
    devpath: &str,
    action: &str,
) -> HotplugNotification {
    HotplugNotification {
        device_type: devtype
            .map(NotificationDeviceType::from_devtype)
            .unwrap_or_else(|| NotificationDeviceType::Other(String::new())),
        bus: busnum.and_then(|v| v.trim().parse().ok()),
        address: devnum.and_then(|v| v.trim().parse().ok()),
        device_path: devpath.to_string(),
        action: HotplugAction::from_action(action),
    }
}

#[cfg(all(target_os = "linux", feature = "udev"))]
mod udev {
    use super::*;
    use futures::StreamExt;
    use std::ffi::OsStr;
    use tokio_udev::{AsyncMonitorSocket, EventType, MonitorBuilder};

    fn as_str(value: Option<&OsStr>) -> Option<&str> {
        value.and_then(OsStr::to_str)
    }

    fn action_name(event_type: EventType) -> &'static str {
        match event_type {
            EventType::Add => "add",
            EventType::Change => "change",
            EventType::Remove => "remove",
            EventType::Bind => "bind",
            EventType::Unbind => "unbind",
            _ => "unknown",
        }
    }

    /// Listen on the udev netlink socket from a dedicated thread
    ///
    /// The socket is not `Send`, so the thread runs its own single-threaded runtime.
    pub fn spawn_udev_source(
        tx: NotificationSender,
        shutdown: Shutdown,
    ) -> Result<JoinHandle<()>, HotplugError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let handle = std::thread::Builder::new()
            .name("hotplug-udev".to_string())
            .spawn(move || {
                let setup = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .and_then(|runtime| {
                        let socket = MonitorBuilder::new()?.match_subsystem("usb")?.listen()?;
                        Ok((runtime, socket))
                    });
                let (runtime, socket) = match setup {
                    Ok(parts) => {
                        let _ = ready_tx.send(Ok(()));
                        parts
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let mut monitor = match AsyncMonitorSocket::new(socket) {
                        Ok(monitor) => monitor,
                        Err(e) => {
                            warn!("Failed to watch udev socket: {}", e);
                            return;
                        }
                    };
                    info!("udev hot-plug source started");

                    while !shutdown.is_triggered() {
                        let event = tokio::select! {
                            event = monitor.next() => event,
                            _ = tokio::time::sleep(EVENT_POLL_INTERVAL) => continue,
                        };
                        let Some(event) = event else { break };
                        let event = match event {
                            Ok(event) => event,
                            Err(e) => {
                                warn!("udev monitor error: {}", e);
                                continue;
                            }
                        };

                        let device = event.device();
                        let notification = notification_from_udev(
                            as_str(device.devtype()),
                            as_str(device.property_value("BUSNUM")),
                            as_str(device.property_value("DEVNUM")),
                            &device.devpath().to_string_lossy(),
                            action_name(event.event_type()),
                        );
                        trace!("udev: {:?}", notification);
                        if tx.send(notification).await.is_err() {
                            break;
                        }
                    }
                    info!("udev hot-plug source stopped");
                });
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => Err(HotplugError::Io(e)),
            Err(_) => Err(HotplugError::Io(std::io::Error::other(
                "udev source thread exited during setup",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udev_device_event() {
        let notification = notification_from_udev(
            Some("usb_device"),
            Some("001"),
            Some("005"),
            "/devices/pci0000:00/0000:00:14.0/usb1/1-2",
            "bind",
        );
        assert_eq!(notification.device_type, NotificationDeviceType::UsbDevice);
        assert_eq!(notification.location(), Some((1, 5)));
        assert_eq!(notification.action, HotplugAction::Bind);
        assert_eq!(
            notification.device_path,
            "/devices/pci0000:00/0000:00:14.0/usb1/1-2"
        );
    }

    #[test]
    fn test_udev_interface_event() {
        let notification = notification_from_udev(
            Some("usb_interface"),
            None,
            None,
            "/devices/x/1-2:1.0",
            "bind",
        );
        assert_eq!(notification.device_type, NotificationDeviceType::UsbInterface);
        assert_eq!(notification.location(), None);
    }

    #[test]
    fn test_udev_garbage_numbers() {
        let notification =
            notification_from_udev(Some("usb_device"), Some("999"), Some("x"), "/x", "add");
        assert_eq!(notification.bus, None);
        assert_eq!(notification.address, None);
        assert_eq!(notification.action, HotplugAction::Other);
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(HotplugBackend::default(), HotplugBackend::Libusb);
        assert_eq!(HotplugBackend::Udev.to_string(), "udev");
    }

    #[cfg(not(all(target_os = "linux", feature = "udev")))]
    #[test]
    fn test_udev_unavailable_without_feature() {
        let Ok(context) = Context::new() else {
            return;
        };
        let (tx, _rx) = common::create_notification_channel();
        let result = spawn_source(HotplugBackend::Udev, &context, tx, Shutdown::new());
        assert!(matches!(
            result,
            Err(HotplugError::Unavailable(HotplugBackend::Udev))
        ));
    }
}
