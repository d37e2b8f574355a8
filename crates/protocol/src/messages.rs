//! Scan payload carried inside each frame
//!
//! The scanner app sends one JSON object per frame:
//!
//! ```json
//! {"rawBase64": "QUJDMTIz", "rawUTF8": "ABC123"}
//! ```
//!
//! Both fields are optional and unknown fields are ignored. A payload with neither field is
//! still a valid scan.

use crate::error::{ProtocolError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Wire representation of a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPayload {
    /// Raw barcode bytes, standard base64
    #[serde(rename = "rawBase64", default, skip_serializing_if = "Option::is_none")]
    pub raw_base64: Option<String>,
    /// Barcode content as text
    #[serde(rename = "rawUTF8", default, skip_serializing_if = "Option::is_none")]
    pub raw_utf8: Option<String>,
}

/// Decoded scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub raw_bytes: Option<Vec<u8>>,
    pub text: Option<String>,
}

/// Decode a frame payload into a scan
///
/// # Example
/// ```
/// use protocol::decode_scan;
///
/// let scan = decode_scan(br#"{"rawBase64":"AAE=","extra":true}"#).unwrap();
/// assert_eq!(scan.raw_bytes, Some(vec![0x00, 0x01]));
/// assert_eq!(scan.text, None);
/// ```
pub fn decode_scan(bytes: &[u8]) -> Result<Scan> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }

    let payload: ScanPayload = serde_json::from_value(value)?;
    let raw_bytes = payload
        .raw_base64
        .map(|encoded| STANDARD.decode(encoded))
        .transpose()?;

    Ok(Scan {
        raw_bytes,
        text: payload.raw_utf8,
    })
}

/// Encode a scan the way the scanner app does
pub fn encode_scan(scan: &Scan) -> Result<Vec<u8>> {
    let payload = ScanPayload {
        raw_base64: scan.raw_bytes.as_ref().map(|raw| STANDARD.encode(raw)),
        raw_utf8: scan.text.clone(),
    };
    Ok(serde_json::to_vec(&payload)?)
}
