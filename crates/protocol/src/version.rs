//! AOA protocol version

use serde::{Deserialize, Serialize};

/// Accessory protocol version reported by GET_PROTOCOL
///
/// Only support is detected; versions above 1 are not negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AoaVersion(pub u16);

impl AoaVersion {
    /// Parse the GET_PROTOCOL response (little-endian u16)
    ///
    /// A short response is treated as version 0.
    pub fn from_response(bytes: &[u8]) -> Self {
        match bytes {
            [lo, hi, ..] => Self(u16::from_le_bytes([*lo, *hi])),
            _ => Self(0),
        }
    }

    /// Whether the device speaks the accessory protocol at all
    pub fn is_supported(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for AoaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_little_endian() {
        assert_eq!(AoaVersion::from_response(&[1, 0]), AoaVersion(1));
        assert_eq!(AoaVersion::from_response(&[2, 0]), AoaVersion(2));
        assert_eq!(AoaVersion::from_response(&[0, 1]), AoaVersion(256));
    }

    #[test]
    fn test_zero_is_unsupported() {
        assert!(!AoaVersion::from_response(&[0, 0]).is_supported());
        assert!(AoaVersion::from_response(&[1, 0]).is_supported());
    }

    #[test]
    fn test_short_response() {
        assert_eq!(AoaVersion::from_response(&[]), AoaVersion(0));
        assert_eq!(AoaVersion::from_response(&[7]), AoaVersion(0));
    }
}
