//! libusb-backed implementation of the USB traits
//!
//! This is the only place the host touches rusb directly for transfers.

use common::{BulkRead, ControlTransport, DeviceIdentity, TransportError, UsbBus, UsbDevice};
use rusb::{Context, Device, DeviceHandle, Direction, UsbContext};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Timeout for AOA control transfers
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Interface carrying the accessory endpoints
const ACCESSORY_INTERFACE: u8 = 0;

/// The USB bus as seen through libusb
#[derive(Clone)]
pub struct RusbBus {
    context: Context,
    read_timeout: Duration,
}

impl RusbBus {
    /// Create a bus whose bulk reads return after `read_timeout`
    ///
    /// A zero timeout makes reads block until data arrives or the device goes away.
    pub fn new(context: Context, read_timeout: Duration) -> Self {
        Self {
            context,
            read_timeout,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl UsbBus for RusbBus {
    type Device = RusbDevice;

    fn devices(&self) -> Result<Vec<Self::Device>, TransportError> {
        let list = self.context.devices().map_err(map_rusb_error)?;
        let mut devices = Vec::with_capacity(list.len());
        for device in list.iter() {
            match RusbDevice::new(device, self.read_timeout) {
                Ok(device) => devices.push(device),
                Err(e) => debug!("Skipping device without descriptor: {}", e),
            }
        }
        Ok(devices)
    }
}

/// One attached device
pub struct RusbDevice {
    device: Device<Context>,
    identity: DeviceIdentity,
    read_timeout: Duration,
}

impl RusbDevice {
    /// Wrap a device, reading its descriptor
    pub fn new(device: Device<Context>, read_timeout: Duration) -> Result<Self, TransportError> {
        let descriptor = device.device_descriptor().map_err(map_rusb_error)?;
        let identity = DeviceIdentity {
            bus: device.bus_number(),
            address: device.address(),
            kernel_path: port_path(&device),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
        };
        Ok(Self {
            device,
            identity,
            read_timeout,
        })
    }

    /// Address and max packet size of the first IN endpoint on interface 0, alternate setting 0
    fn accessory_endpoint(&self) -> Result<(u8, usize), TransportError> {
        let config = self
            .device
            .active_config_descriptor()
            .map_err(map_rusb_error)?;

        for interface in config.interfaces() {
            for setting in interface.descriptors() {
                if setting.interface_number() != ACCESSORY_INTERFACE
                    || setting.setting_number() != 0
                {
                    continue;
                }
                if let Some(endpoint) = setting
                    .endpoint_descriptors()
                    .find(|endpoint| endpoint.direction() == Direction::In)
                {
                    return Ok((endpoint.address(), endpoint.max_packet_size() as usize));
                }
            }
        }
        Err(TransportError::NoEndpoint)
    }
}

impl UsbDevice for RusbDevice {
    type Control = RusbControl;
    type Reader = RusbBulkReader;

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn open_control(&self) -> Result<Self::Control, TransportError> {
        let handle = self.device.open().map_err(|e| {
            warn!("Failed to open {}: {}", self.identity, e);
            map_rusb_error(e)
        })?;
        Ok(RusbControl { handle })
    }

    fn open_accessory(&self) -> Result<Self::Reader, TransportError> {
        let (endpoint, max_packet_size) = self.accessory_endpoint()?;
        let handle = self.device.open().map_err(map_rusb_error)?;

        match handle.kernel_driver_active(ACCESSORY_INTERFACE) {
            Ok(true) => {
                debug!("Detaching kernel driver from {}", self.identity);
                if let Err(e) = handle.detach_kernel_driver(ACCESSORY_INTERFACE) {
                    warn!("Failed to detach kernel driver from {}: {}", self.identity, e);
                }
            }
            Ok(false) => {}
            Err(e) => trace!("Could not check kernel driver on {}: {}", self.identity, e),
        }

        handle
            .claim_interface(ACCESSORY_INTERFACE)
            .map_err(map_rusb_error)?;
        debug!(
            "Claimed interface {} on {}, reading from endpoint {:#04x} ({} byte packets)",
            ACCESSORY_INTERFACE, self.identity, endpoint, max_packet_size
        );

        Ok(RusbBulkReader {
            handle,
            endpoint,
            max_packet_size,
            timeout: self.read_timeout,
        })
    }
}

/// Control handle, closed on drop
pub struct RusbControl {
    handle: DeviceHandle<Context>,
}

impl ControlTransport for RusbControl {
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        self.handle
            .read_control(request_type, request, value, index, buf, CONTROL_TIMEOUT)
            .map_err(map_rusb_error)
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        self.handle
            .write_control(request_type, request, value, index, data, CONTROL_TIMEOUT)
            .map_err(map_rusb_error)
    }
}

/// Claimed accessory interface
pub struct RusbBulkReader {
    handle: DeviceHandle<Context>,
    endpoint: u8,
    max_packet_size: usize,
    timeout: Duration,
}

impl BulkRead for RusbBulkReader {
    fn read_bulk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.handle
            .read_bulk(self.endpoint, buf, self.timeout)
            .map_err(map_rusb_error)
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

impl Drop for RusbBulkReader {
    fn drop(&mut self) {
        // Fails harmlessly once the device is gone
        if let Err(e) = self.handle.release_interface(ACCESSORY_INTERFACE) {
            trace!("Release of interface {} failed: {}", ACCESSORY_INTERFACE, e);
        }
    }
}

/// Port chain of a device, in the kernel's `<bus>-<port>.<port>` notation
pub fn port_path<T: UsbContext>(device: &Device<T>) -> Option<String> {
    let ports = device.port_numbers().ok()?;
    if ports.is_empty() {
        return None;
    }
    let chain: Vec<String> = ports.iter().map(u8::to_string).collect();
    Some(format!("{}-{}", device.bus_number(), chain.join(".")))
}

/// Map rusb errors to transport errors
pub fn map_rusb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::NoDevice | rusb::Error::NotFound => TransportError::NoDevice,
        rusb::Error::Pipe => TransportError::Pipe,
        rusb::Error::Access => TransportError::Access,
        _ => TransportError::Other(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), TransportError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), TransportError::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), TransportError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::NotFound), TransportError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::Access), TransportError::Access);
        assert!(matches!(
            map_rusb_error(rusb::Error::Busy),
            TransportError::Other(_)
        ));
    }

    #[test]
    fn test_enumerate_real_bus() {
        // May fail without USB access; must not panic
        let Ok(context) = Context::new() else {
            return;
        };
        let bus = RusbBus::new(context, Duration::from_millis(100));
        if let Ok(devices) = bus.devices() {
            for device in devices {
                let identity = device.identity();
                assert_eq!(
                    identity.device_id().as_str(),
                    format!("{}-{}", identity.bus, identity.address)
                );
            }
        }
    }
}
