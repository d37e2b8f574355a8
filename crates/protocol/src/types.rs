//! Event and device type definitions
//!
//! These are the types the host hands to whatever consumes scans. Each event serializes as a
//! flat record:
//!
//! ```json
//! {"kind": "barcode", "device_id": "1-5", "text": "ABC123"}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one physical attachment
///
/// Rendered as `<bus>-<address>`. Only valid until the device disconnects or re-enumerates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Build the id from a bus number and device address
    pub fn from_bus_address(bus: u8, address: u8) -> Self {
        Self(format!("{}-{}", bus, address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What the host should do with an attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Known vendor, not yet in accessory mode
    Unconfigured,
    /// In accessory mode, ready to stream scans
    Configured,
    /// Not a scanner
    Irrelevant,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceRole::Unconfigured => "unconfigured",
            DeviceRole::Configured => "configured",
            DeviceRole::Irrelevant => "irrelevant",
        };
        f.write_str(name)
    }
}

/// Event published on the event bus
///
/// Per session the order is always `Connected`, any number of `Barcode`, then at most one
/// `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScannerEvent {
    /// A session started for this device
    Connected { device_id: DeviceId },

    /// The session for this device ended
    Disconnected { device_id: DeviceId },

    /// One scan. Both fields may be absent.
    Barcode {
        device_id: DeviceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_bytes: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl ScannerEvent {
    /// Device the event belongs to
    pub fn device_id(&self) -> &DeviceId {
        match self {
            ScannerEvent::Connected { device_id }
            | ScannerEvent::Disconnected { device_id }
            | ScannerEvent::Barcode { device_id, .. } => device_id,
        }
    }

    /// Record kind as used in the serialized form
    pub fn kind(&self) -> &'static str {
        match self {
            ScannerEvent::Connected { .. } => "connected",
            ScannerEvent::Disconnected { .. } => "disconnected",
            ScannerEvent::Barcode { .. } => "barcode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_format() {
        let id = DeviceId::from_bus_address(1, 5);
        assert_eq!(id.as_str(), "1-5");
        assert_eq!(id.to_string(), "1-5");
        assert_eq!(id, DeviceId::from("1-5"));
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = ScannerEvent::Barcode {
            device_id: DeviceId::from("1-5"),
            raw_bytes: None,
            text: Some("ABC123".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "barcode", "device_id": "1-5", "text": "ABC123"})
        );
    }

    #[test]
    fn test_lifecycle_events_serialize() {
        let connected = ScannerEvent::Connected {
            device_id: DeviceId::from("2-7"),
        };
        assert_eq!(
            serde_json::to_string(&connected).unwrap(),
            r#"{"kind":"connected","device_id":"2-7"}"#
        );
        assert_eq!(connected.kind(), "connected");
        assert_eq!(connected.device_id().as_str(), "2-7");
    }

    #[test]
    fn test_event_deserializes_without_optional_fields() {
        let event: ScannerEvent =
            serde_json::from_str(r#"{"kind":"barcode","device_id":"1-5"}"#).unwrap();
        assert_eq!(
            event,
            ScannerEvent::Barcode {
                device_id: DeviceId::from("1-5"),
                raw_bytes: None,
                text: None,
            }
        );
    }

    #[test]
    fn test_role_display() {
        assert_eq!(DeviceRole::Configured.to_string(), "configured");
        assert_eq!(DeviceRole::Irrelevant.to_string(), "irrelevant");
    }
}
