//! USB type abstractions
//!
//! The host never talks to libusb directly outside of `host::usb::device`; everything else is
//! written against these traits so the configurator, sessions and monitor can run against
//! mocks (see [`crate::test_utils`]).

use protocol::DeviceId;
use std::fmt;
use thiserror::Error;

/// Transfer-level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transfer timed out")]
    Timeout,

    #[error("Device is no longer connected")]
    NoDevice,

    #[error("Endpoint stalled")]
    Pipe,

    #[error("Access denied (insufficient permissions)")]
    Access,

    #[error("No IN endpoint on interface 0")]
    NoEndpoint,

    #[error("USB error: {0}")]
    Other(String),
}

impl TransportError {
    /// A timeout only means no data arrived in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Snapshot of an attached device, taken when it is enumerated
///
/// `bus`/`address` are only valid until the device disconnects or re-enumerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub bus: u8,
    pub address: u8,
    /// Kernel device path (or port chain), when known
    pub kernel_path: Option<String>,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    /// Event bus identifier for this attachment
    pub fn device_id(&self) -> DeviceId {
        DeviceId::from_bus_address(self.bus, self.address)
    }

    /// Whether this identity sits at the given bus/address
    pub fn is_at(&self, bus: u8, address: u8) -> bool {
        self.bus == bus && self.address == address
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}:{}> {:04x}:{:04x}",
            self.bus, self.address, self.vendor_id, self.product_id
        )
    }
}

/// Control transfers on the default endpoint
pub trait ControlTransport {
    /// Device-to-host control transfer, returns the number of bytes read
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize, TransportError>;

    /// Host-to-device control transfer, returns the number of bytes written
    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError>;
}

/// Reads from a bulk IN endpoint
pub trait BulkRead {
    /// Read up to `buf.len()` bytes
    ///
    /// Returns [`TransportError::Timeout`] when the reader's poll interval elapses without data.
    fn read_bulk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Max packet size of the endpoint
    ///
    /// A bulk transfer only completes once its buffer is full or a short packet arrives.
    fn max_packet_size(&self) -> usize;
}

/// A device found on the bus
pub trait UsbDevice: Send + 'static {
    type Control: ControlTransport;
    type Reader: BulkRead;

    /// Identity captured at enumeration time
    fn identity(&self) -> &DeviceIdentity;

    /// Open the device for control transfers
    ///
    /// Dropping the returned handle releases it.
    fn open_control(&self) -> Result<Self::Control, TransportError>;

    /// Open the accessory bulk IN endpoint
    ///
    /// Selects the first IN endpoint on interface 0, alternate setting 0.
    fn open_accessory(&self) -> Result<Self::Reader, TransportError>;
}

/// USB enumeration
pub trait UsbBus: Clone + Send + Sync + 'static {
    type Device: UsbDevice;

    /// All currently attached devices
    fn devices(&self) -> Result<Vec<Self::Device>, TransportError>;

    /// Look up a device by bus number and address
    fn find(&self, bus: u8, address: u8) -> Result<Option<Self::Device>, TransportError> {
        Ok(self
            .devices()?
            .into_iter()
            .find(|device| device.identity().is_at(bus, address)))
    }
}

/// Kind of object a hot-plug notification refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationDeviceType {
    UsbDevice,
    UsbInterface,
    Other(String),
}

impl NotificationDeviceType {
    /// Map a udev `DEVTYPE` value
    pub fn from_devtype(devtype: &str) -> Self {
        match devtype {
            "usb_device" => NotificationDeviceType::UsbDevice,
            "usb_interface" => NotificationDeviceType::UsbInterface,
            other => NotificationDeviceType::Other(other.to_string()),
        }
    }
}

/// Hot-plug action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugAction {
    Bind,
    Unbind,
    /// add, remove, change and anything else the OS reports
    Other,
}

impl HotplugAction {
    /// Map a udev action name
    pub fn from_action(action: &str) -> Self {
        match action {
            "bind" => HotplugAction::Bind,
            "unbind" => HotplugAction::Unbind,
            _ => HotplugAction::Other,
        }
    }
}

/// One OS-level hot-plug notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugNotification {
    pub device_type: NotificationDeviceType,
    /// BUSNUM, absent for interface-level notifications
    pub bus: Option<u8>,
    /// DEVNUM, absent for interface-level notifications
    pub address: Option<u8>,
    pub device_path: String,
    pub action: HotplugAction,
}

impl HotplugNotification {
    /// Device-level bind notification
    pub fn bind(bus: u8, address: u8, device_path: impl Into<String>) -> Self {
        Self {
            device_type: NotificationDeviceType::UsbDevice,
            bus: Some(bus),
            address: Some(address),
            device_path: device_path.into(),
            action: HotplugAction::Bind,
        }
    }

    /// Device-level unbind notification
    pub fn unbind(bus: u8, address: u8, device_path: impl Into<String>) -> Self {
        Self {
            action: HotplugAction::Unbind,
            ..Self::bind(bus, address, device_path)
        }
    }

    /// Bus and address, when both are present
    pub fn location(&self) -> Option<(u8, u8)> {
        Some((self.bus?, self.address?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_device_id() {
        let identity = DeviceIdentity {
            bus: 1,
            address: 5,
            kernel_path: None,
            vendor_id: 0x18d1,
            product_id: 0x2d00,
        };
        assert_eq!(identity.device_id().as_str(), "1-5");
        assert!(identity.is_at(1, 5));
        assert!(!identity.is_at(1, 6));
        assert_eq!(identity.to_string(), "<1:5> 18d1:2d00");
    }

    #[test]
    fn test_devtype_mapping() {
        assert_eq!(
            NotificationDeviceType::from_devtype("usb_device"),
            NotificationDeviceType::UsbDevice
        );
        assert_eq!(
            NotificationDeviceType::from_devtype("usb_interface"),
            NotificationDeviceType::UsbInterface
        );
        assert!(matches!(
            NotificationDeviceType::from_devtype("hub"),
            NotificationDeviceType::Other(_)
        ));
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(HotplugAction::from_action("bind"), HotplugAction::Bind);
        assert_eq!(HotplugAction::from_action("unbind"), HotplugAction::Unbind);
        assert_eq!(HotplugAction::from_action("add"), HotplugAction::Other);
    }

    #[test]
    fn test_notification_constructors() {
        let bind = HotplugNotification::bind(3, 9, "/devices/pci0000:00/usb3/3-1");
        assert_eq!(bind.location(), Some((3, 9)));
        assert_eq!(bind.action, HotplugAction::Bind);

        let unbind = HotplugNotification::unbind(3, 9, "/devices/pci0000:00/usb3/3-1");
        assert_eq!(unbind.action, HotplugAction::Unbind);
        assert_eq!(unbind.device_type, NotificationDeviceType::UsbDevice);
    }

    #[test]
    fn test_timeout_classification() {
        assert!(TransportError::Timeout.is_timeout());
        assert!(!TransportError::NoDevice.is_timeout());
    }
}
