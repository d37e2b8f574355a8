//! Protocol library for usb-barcode
//!
//! This crate defines everything that crosses the USB cable between the host and an
//! Android scanner app, plus the events the host hands to its consumer:
//!
//! - [`aoa`]: Android Open Accessory control requests and the accessory identification strings
//! - [`codec`]: the 2-byte big-endian length-prefixed framing used on the bulk IN endpoint
//! - [`messages`]: the JSON scan payload carried inside each frame
//! - [`types`]: `ScannerEvent`, `DeviceId` and `DeviceRole`
//!
//! # Example
//!
//! ```
//! use protocol::{FrameDecoder, decode_scan, encode_frame};
//!
//! let frame = encode_frame(br#"{"rawUTF8":"ABC123"}"#).unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.extend(&frame);
//! let payload = decoder.next_frame().unwrap();
//!
//! let scan = decode_scan(&payload).unwrap();
//! assert_eq!(scan.text.as_deref(), Some("ABC123"));
//! assert!(scan.raw_bytes.is_none());
//! ```

pub mod aoa;
pub mod codec;
pub mod error;
pub mod messages;
pub mod types;
pub mod version;

pub use aoa::{AccessoryIdentification, AccessoryString};
pub use codec::{FRAME_HEADER_LEN, FrameDecoder, MAX_PAYLOAD_LEN, encode_frame, read_frame};
pub use error::{ProtocolError, Result};
pub use messages::{Scan, ScanPayload, decode_scan, encode_scan};
pub use types::{DeviceId, DeviceRole, ScannerEvent};
pub use version::AoaVersion;
