//! USB subsystem
//!
//! Everything between the OS and the event bus:
//! - classification of attached devices
//! - the accessory handshake for unconfigured phones
//! - per-device read sessions
//! - the hot-plug monitor and its notification sources
//!
//! All USB I/O is blocking and runs on dedicated OS threads (one per session, one for the
//! monitor, one for the hot-plug source). Only the event bus crosses into the Tokio runtime.

pub mod classifier;
pub mod configurator;
pub mod device;
pub mod hotplug;
pub mod monitor;
pub mod registry;
pub mod session;

pub use classifier::DeviceClassifier;
pub use configurator::{AccessoryConfigurator, ConfigureError, ReconnectPolicy};
pub use device::{RusbBus, RusbDevice, map_rusb_error};
pub use hotplug::{HotplugBackend, HotplugError, spawn_source};
pub use monitor::{HotplugMonitor, MonitorError, MonitorOutcome};
pub use registry::{SessionGuard, SessionRegistry};
pub use session::{SessionEnd, run_session, spawn_session};
