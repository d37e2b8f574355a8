//! AOA handshake
//!
//! Switches an unconfigured phone into accessory mode:
//!
//! 1. GET_PROTOCOL, a zero version means no AOA support
//! 2. SEND_STRING for each of the six identification strings
//! 3. START, after which the phone drops off the bus
//! 4. poll the bus until the device shows up again in a configured state
//!
//! The poll matches on bus/address, which the phone usually does not keep across the
//! re-enumeration. A miss is expected; the hot-plug bind for the new address is what actually
//! starts the session.

use common::{Clock, ControlTransport, TransportError, UsbBus, UsbDevice};
use protocol::aoa::{
    ACCESSORY_GET_PROTOCOL, ACCESSORY_SEND_STRING, ACCESSORY_START, PROTOCOL_VERSION_LEN,
    REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT, encode_string,
};
use protocol::{AccessoryIdentification, AoaVersion, DeviceRole};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::classifier::DeviceClassifier;

/// Why configuring a device failed
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("Device does not support the accessory protocol")]
    UnsupportedDevice,

    #[error("Device did not reappear after {attempts} attempts")]
    ReconfigurationTimeout { attempts: u32 },

    #[error("Control transfer failed: {0}")]
    Transport(#[from] TransportError),
}

/// How long to wait for a device to come back after START
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

/// Drives the accessory handshake against devices on bus `B`
pub struct AccessoryConfigurator<B: UsbBus, C: Clock> {
    bus: B,
    identification: AccessoryIdentification,
    classifier: DeviceClassifier,
    policy: ReconnectPolicy,
    clock: C,
}

impl<B: UsbBus, C: Clock> AccessoryConfigurator<B, C> {
    pub fn new(
        bus: B,
        identification: AccessoryIdentification,
        classifier: DeviceClassifier,
        policy: ReconnectPolicy,
        clock: C,
    ) -> Self {
        Self {
            bus,
            identification,
            classifier,
            policy,
            clock,
        }
    }

    /// Reconfigure `device` into accessory mode
    ///
    /// Blocks for up to `attempts * interval` while waiting for the device to come back.
    /// Returns the re-enumerated device when it reappears at the same bus/address.
    pub fn configure(&self, device: &B::Device) -> Result<B::Device, ConfigureError> {
        let identity = device.identity().clone();
        info!("Configuring {} for accessory mode", identity);

        {
            let mut control = device.open_control()?;

            let version = query_protocol(&mut control)?;
            if !version.is_supported() {
                warn!("{} does not support the accessory protocol", identity);
                return Err(ConfigureError::UnsupportedDevice);
            }
            debug!("{} speaks AOA version {}", identity, version);

            for (which, value) in self.identification.strings() {
                trace!("Sending accessory string {:?} = {:?}", which, value);
                control.write_control(
                    REQUEST_TYPE_VENDOR_OUT,
                    ACCESSORY_SEND_STRING,
                    0,
                    which.index(),
                    &encode_string(value),
                )?;
            }

            control.write_control(REQUEST_TYPE_VENDOR_OUT, ACCESSORY_START, 0, 0, &[])?;
            debug!("Sent START to {}", identity);
            // The handle is invalid once the device re-enumerates
        }

        for attempt in 1..=self.policy.attempts {
            self.clock.sleep(self.policy.interval);

            let reappeared = self.bus.devices()?.into_iter().find(|candidate| {
                let c = candidate.identity();
                c.is_at(identity.bus, identity.address)
                    && self.classifier.classify(c.vendor_id, c.product_id) == DeviceRole::Configured
            });

            if let Some(reconfigured) = reappeared {
                info!(
                    "{} reappeared as {} (attempt {})",
                    identity,
                    reconfigured.identity(),
                    attempt
                );
                return Ok(reconfigured);
            }
            debug!(
                "{} not back yet (attempt {}/{})",
                identity, attempt, self.policy.attempts
            );
        }

        Err(ConfigureError::ReconfigurationTimeout {
            attempts: self.policy.attempts,
        })
    }
}

fn query_protocol<T: ControlTransport>(control: &mut T) -> Result<AoaVersion, TransportError> {
    let mut buf = [0u8; PROTOCOL_VERSION_LEN];
    let len = control.read_control(
        REQUEST_TYPE_VENDOR_IN,
        ACCESSORY_GET_PROTOCOL,
        0,
        0,
        &mut buf,
    )?;
    Ok(AoaVersion::from_response(&buf[..len]))
}
