//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
///
/// Every variant means the byte stream from a device can no longer be trusted;
/// sessions treat any of them as a malformed frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame payload is not valid JSON (this includes invalid UTF-8)
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload parsed but is not a JSON object
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// `rawBase64` field is not valid standard base64
    #[error("Invalid base64 in rawBase64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Payload does not fit in a 2-byte length prefix
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Stream ended inside a frame
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// I/O error during frame operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
