//! Device classification by vendor/product id

use protocol::DeviceRole;
use protocol::aoa::{ACCESSORY_PRODUCT_IDS, GOOGLE_VENDOR_ID};

/// Decides whether an attached device is a scanner, and in which state
///
/// Built once from configuration and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClassifier {
    vendor_ids: Vec<u16>,
    configured_product_ids: Vec<u16>,
}

impl Default for DeviceClassifier {
    fn default() -> Self {
        Self::new(vec![GOOGLE_VENDOR_ID], ACCESSORY_PRODUCT_IDS.to_vec())
    }
}

impl DeviceClassifier {
    pub fn new(vendor_ids: Vec<u16>, configured_product_ids: Vec<u16>) -> Self {
        Self {
            vendor_ids,
            configured_product_ids,
        }
    }

    /// Classify a device
    ///
    /// Any product id of a recognized vendor that is not an accessory id counts as
    /// unconfigured. Pixel phones share Google's vendor id, so unrelated Google devices are
    /// picked up too; the GET_PROTOCOL query weeds out the ones without AOA support.
    pub fn classify(&self, vendor_id: u16, product_id: u16) -> DeviceRole {
        if !self.vendor_ids.contains(&vendor_id) {
            return DeviceRole::Irrelevant;
        }
        if self.configured_product_ids.contains(&product_id) {
            DeviceRole::Configured
        } else {
            DeviceRole::Unconfigured
        }
    }

    pub fn vendor_ids(&self) -> &[u16] {
        &self.vendor_ids
    }

    pub fn configured_product_ids(&self) -> &[u16] {
        &self.configured_product_ids
    }
}
