//! Hot-plug monitor
//!
//! Consumes hot-plug notifications and decides, per device, whether to configure it, start a
//! read session or ignore it. Also performs the one-off scan of devices that were already
//! attached when the host started.

use common::{
    Clock, EventSink, HotplugAction, HotplugNotification, NotificationDeviceType,
    NotificationReceiver, Shutdown, TransportError, UsbBus, UsbDevice,
};
use protocol::{DeviceId, DeviceRole};
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::classifier::DeviceClassifier;
use super::configurator::AccessoryConfigurator;
use super::registry::SessionRegistry;
use super::session::spawn_session;

/// Failures while handling one notification
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The notified device could not be looked up (yet)
    #[error("Device at <{bus}:{address}> could not be resolved")]
    EnumerationRace { bus: u8, address: u8 },

    #[error("Enumeration failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to spawn session thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// What the monitor did with a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Interface-level, unknown action, or missing bus/address
    Ignored,
    /// Not a scanner
    Irrelevant,
    /// Handshake sent; the device re-enumerates on its own
    Configured,
    /// Handshake failed, the attach cycle is abandoned
    ConfigureFailed,
    SessionStarted(DeviceId),
    /// A session for this device is already running
    AlreadyActive(DeviceId),
    Unbound,
}

/// Ties hot-plug notifications to configuration and session starts
pub struct HotplugMonitor<B: UsbBus, C: Clock> {
    bus: B,
    classifier: DeviceClassifier,
    configurator: AccessoryConfigurator<B, C>,
    registry: SessionRegistry,
    sink: EventSink,
    shutdown: Shutdown,
}

impl<B: UsbBus, C: Clock> HotplugMonitor<B, C> {
    pub fn new(
        bus: B,
        classifier: DeviceClassifier,
        configurator: AccessoryConfigurator<B, C>,
        sink: EventSink,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            bus,
            classifier,
            configurator,
            registry: SessionRegistry::new(),
            sink,
            shutdown,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Handle devices that were attached before the monitor started
    ///
    /// Configured devices get a session, unconfigured ones are sent the handshake. A device that
    /// fails is logged and skipped. Returns the number of sessions started.
    pub fn scan_existing(&self) -> Result<usize, MonitorError> {
        let mut started = 0;
        for device in self.bus.devices()? {
            let identity = device.identity().clone();
            match catch_unwind(AssertUnwindSafe(|| self.process_device(device))) {
                Ok(Ok(MonitorOutcome::SessionStarted(_))) => started += 1,
                Ok(Ok(outcome)) => debug!("Startup scan of {}: {:?}", identity, outcome),
                Ok(Err(e)) => error!("Startup scan of {} failed: {}", identity, e),
                Err(panic) => error!("Panic during startup scan of {}: {:?}", identity, panic),
            }
        }
        info!("Startup scan started {} session(s)", started);
        Ok(started)
    }

    /// Handle one hot-plug notification
    pub fn handle_notification(
        &self,
        notification: &HotplugNotification,
    ) -> Result<MonitorOutcome, MonitorError> {
        if notification.device_type != NotificationDeviceType::UsbDevice {
            return Ok(MonitorOutcome::Ignored);
        }
        let Some((bus, address)) = notification.location() else {
            debug!(
                "Notification for {} without bus/address",
                notification.device_path
            );
            return Ok(MonitorOutcome::Ignored);
        };

        match notification.action {
            HotplugAction::Bind => {
                info!("Bind <{}:{}> ({})", bus, address, notification.device_path);
                let device = self
                    .bus
                    .find(bus, address)?
                    .ok_or(MonitorError::EnumerationRace { bus, address })?;
                self.process_device(device)
            }
            HotplugAction::Unbind => {
                // The session notices on its next read
                debug!("Unbind <{}:{}> ({})", bus, address, notification.device_path);
                Ok(MonitorOutcome::Unbound)
            }
            HotplugAction::Other => Ok(MonitorOutcome::Ignored),
        }
    }

    fn process_device(&self, device: B::Device) -> Result<MonitorOutcome, MonitorError> {
        let identity = device.identity().clone();

        match self
            .classifier
            .classify(identity.vendor_id, identity.product_id)
        {
            DeviceRole::Irrelevant => {
                debug!("Ignoring {}", identity);
                Ok(MonitorOutcome::Irrelevant)
            }
            DeviceRole::Unconfigured => match self.configurator.configure(&device) {
                Ok(reconfigured) => {
                    info!("{} is now {}", identity, reconfigured.identity());
                    Ok(MonitorOutcome::Configured)
                }
                Err(e) => {
                    warn!("Failed to configure {}: {}", identity, e);
                    Ok(MonitorOutcome::ConfigureFailed)
                }
            },
            DeviceRole::Configured => {
                let device_id = identity.device_id();
                let Some(guard) = self.registry.try_register(&device_id) else {
                    debug!("Session for {} already running", device_id);
                    return Ok(MonitorOutcome::AlreadyActive(device_id));
                };
                spawn_session(device, guard, self.sink.clone(), self.shutdown.clone())?;
                Ok(MonitorOutcome::SessionStarted(device_id))
            }
        }
    }

    /// Process notifications until the channel closes or shutdown is requested
    pub fn run(&self, notifications: NotificationReceiver) {
        info!("Hot-plug monitor started");

        while !self.shutdown.is_triggered() {
            let Ok(notification) = notifications.recv_blocking() else {
                debug!("Notification channel closed");
                break;
            };

            let result = catch_unwind(AssertUnwindSafe(|| {
                self.handle_notification(&notification)
            }));
            match result {
                Ok(Ok(outcome)) => debug!("{}: {:?}", notification.device_path, outcome),
                Ok(Err(e @ MonitorError::EnumerationRace { .. })) => warn!("{}", e),
                Ok(Err(e)) => error!("Failed to handle {}: {}", notification.device_path, e),
                Err(panic) => error!("Panic in hot-plug monitor: {:?}", panic),
            }
        }

        info!("Hot-plug monitor stopped");
    }
}
