//! Android Open Accessory (AOA) definitions
//!
//! See <https://source.android.com/devices/accessories/aoa>. The host switches a phone into
//! accessory mode with three vendor control requests on the default endpoint:
//!
//! ```text
//! GET_PROTOCOL  (51)  device -> host, 2 bytes, little-endian version
//! SEND_STRING   (52)  host -> device, one per identification string, wIndex = string id
//! START         (53)  host -> device, no payload
//! ```

use serde::{Deserialize, Serialize};

/// bmRequestType for device-to-host vendor requests
pub const REQUEST_TYPE_VENDOR_IN: u8 = 0xC0;

/// bmRequestType for host-to-device vendor requests
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;

/// Query the accessory protocol version
pub const ACCESSORY_GET_PROTOCOL: u8 = 51;

/// Send one identification string
pub const ACCESSORY_SEND_STRING: u8 = 52;

/// Switch the device into accessory mode
pub const ACCESSORY_START: u8 = 53;

/// Length of the GET_PROTOCOL response
pub const PROTOCOL_VERSION_LEN: usize = 2;

/// Google's vendor id
///
/// Used by every device in accessory mode, but also by Pixel phones in their normal
/// (unconfigured) personality.
pub const GOOGLE_VENDOR_ID: u16 = 0x18d1;

/// Accessory mode product ids (accessory, accessory + ADB)
pub const ACCESSORY_PRODUCT_IDS: [u16; 2] = [0x2D00, 0x2D01];

/// Index of an identification string in the SEND_STRING request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AccessoryString {
    Manufacturer = 0,
    Model = 1,
    Description = 2,
    Version = 3,
    Uri = 4,
    Serial = 5,
}

impl AccessoryString {
    /// All strings in the order they are sent
    pub const ALL: [AccessoryString; 6] = [
        AccessoryString::Manufacturer,
        AccessoryString::Model,
        AccessoryString::Description,
        AccessoryString::Version,
        AccessoryString::Uri,
        AccessoryString::Serial,
    ];

    /// wIndex value for the control request
    pub fn index(self) -> u16 {
        self as u16
    }
}

/// Identification the host announces to the phone
///
/// Android uses these strings to pick the app that handles the accessory, so they must match
/// the scanner app's accessory filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryIdentification {
    pub manufacturer: String,
    pub model: String,
    pub description: String,
    pub version: String,
    pub uri: String,
    pub serial: String,
}

impl Default for AccessoryIdentification {
    fn default() -> Self {
        Self {
            manufacturer: "Goldfish-Intelligence".to_string(),
            model: "CompanionScanner".to_string(),
            description: "UnifestWhoopWhoop".to_string(),
            version: "1".to_string(),
            uri: "https://unifest-karlsruhe.de/".to_string(),
            serial: "none".to_string(),
        }
    }
}

impl AccessoryIdentification {
    /// Get the value of one identification string
    pub fn get(&self, which: AccessoryString) -> &str {
        match which {
            AccessoryString::Manufacturer => &self.manufacturer,
            AccessoryString::Model => &self.model,
            AccessoryString::Description => &self.description,
            AccessoryString::Version => &self.version,
            AccessoryString::Uri => &self.uri,
            AccessoryString::Serial => &self.serial,
        }
    }

    /// Strings paired with their index, in send order
    pub fn strings(&self) -> impl Iterator<Item = (AccessoryString, &str)> {
        AccessoryString::ALL.into_iter().map(|s| (s, self.get(s)))
    }
}

/// Encode an identification string for SEND_STRING
///
/// AOA strings are zero-terminated UTF-8.
pub fn encode_string(value: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(value.len() + 1);
    data.extend_from_slice(value.as_bytes());
    data.push(0);
    data
}
