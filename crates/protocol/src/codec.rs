//! Length-prefixed framing for the bulk IN endpoint
//!
//! # Frame Format
//!
//! ```text
//! [Length: u16 (big-endian)][Length bytes of UTF-8 JSON]
//! ```
//!
//! USB bulk transfers do not preserve frame boundaries: one transfer may carry half a frame or
//! several frames back to back. [`FrameDecoder`] buffers whatever the endpoint delivers and hands
//! out complete payloads.

use crate::error::{ProtocolError, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::io::Read;

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 2;

/// Largest payload a 2-byte prefix can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Encode a payload with its length prefix
///
/// # Example
/// ```
/// use protocol::encode_frame;
///
/// let frame = encode_frame(b"{}").unwrap();
/// assert_eq!(frame, vec![0x00, 0x02, b'{', b'}']);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one frame payload from a blocking reader
///
/// # Example
/// ```
/// use protocol::{encode_frame, read_frame};
/// use std::io::Cursor;
///
/// let mut cursor = Cursor::new(encode_frame(b"{\"rawUTF8\":\"x\"}").unwrap());
/// let payload = read_frame(&mut cursor).unwrap();
/// assert_eq!(payload, b"{\"rawUTF8\":\"x\"}");
/// ```
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut len_bytes)?;
    let length = u16::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Incremental frame decoder
///
/// Feed raw endpoint data with [`extend`](Self::extend) and drain complete payloads with
/// [`next_frame`](Self::next_frame).
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Append bytes received from the endpoint
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Length of the frame currently being assembled (prefix included)
    ///
    /// Returns None until the length prefix is complete.
    pub fn expected_len(&self) -> Option<usize> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return None;
        }
        let length = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;
        Some(FRAME_HEADER_LEN + length)
    }

    /// Take the next complete payload, if one is buffered
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let expected = self.expected_len()?;
        if self.buffer.len() < expected {
            return None;
        }

        self.buffer.advance(FRAME_HEADER_LEN);
        Some(self.buffer.split_to(expected - FRAME_HEADER_LEN).freeze())
    }

    /// Number of bytes buffered but not yet returned
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True when no partial frame is pending
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check the stream ended on a frame boundary
    pub fn finish(&self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        Err(ProtocolError::IncompleteFrame {
            expected: self.expected_len().unwrap_or(FRAME_HEADER_LEN),
            actual: self.buffer.len(),
        })
    }
}
