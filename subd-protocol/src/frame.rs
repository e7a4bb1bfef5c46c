//! Length-prefixed frame format.
//!
//! Every request and reply travels as:
//!
//! ```text
//! +-------------+---------------------------+
//! | length      | payload                   |
//! | u32 LE      | `length` bytes of UTF-8   |
//! +-------------+---------------------------+
//! ```
//!
//! The server may also push an unsolicited 4-byte notification whose value,
//! read as a signed little-endian integer, is `-1`. It carries no payload and
//! only means "the shared data changed".

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Signed value of the change-notification prefix.
pub const SENTINEL: i32 = -1;

/// Wire bytes of the change-notification prefix.
pub const SENTINEL_BYTES: [u8; LENGTH_PREFIX_SIZE] = SENTINEL.to_le_bytes();

/// Interpretation of a 4-byte prefix read from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    /// Out-of-band change notification; no payload follows.
    Sentinel,
    /// Length of the payload that follows.
    Length(u32),
}

/// Reads a prefix as an unsigned little-endian length.
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_le_bytes(prefix)
}

/// Reads a prefix as a signed little-endian integer.
pub fn decode_signed(prefix: [u8; LENGTH_PREFIX_SIZE]) -> i32 {
    i32::from_le_bytes(prefix)
}

/// Distinguishes the notification sentinel from a payload length.
pub fn classify_prefix(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Prefix {
    if decode_signed(prefix) == SENTINEL {
        Prefix::Sentinel
    } else {
        Prefix::Length(decode_length(prefix))
    }
}

/// Checks a declared payload length against a ceiling.
///
/// The ceiling is itself clamped to [`MAX_PAYLOAD_SIZE`].
pub fn check_length(len: u64, max: u32) -> Result<(), ProtocolError> {
    let max = max.min(MAX_PAYLOAD_SIZE);
    if len > max as u64 {
        return Err(ProtocolError::FrameTooLarge { size: len, max });
    }
    Ok(())
}

/// Frames a payload: 4-byte little-endian length followed by the bytes.
pub fn encode(payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    check_length(payload.len() as u64, MAX_PAYLOAD_SIZE)?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf)
}

/// A decoded unit from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A request or reply payload.
    Data(Bytes),
    /// A change notification.
    Sentinel,
}

impl Frame {
    /// Decodes a frame from bytes, enforcing `max` as the payload ceiling.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Nothing is consumed unless a whole frame is available.
    pub fn decode(buf: &mut BytesMut, max: u32) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let prefix = [buf[0], buf[1], buf[2], buf[3]];
        let len = match classify_prefix(prefix) {
            Prefix::Sentinel => {
                buf.advance(LENGTH_PREFIX_SIZE);
                return Ok(Some(Frame::Sentinel));
            }
            Prefix::Length(len) => len as usize,
        };

        check_length(len as u64, max)?;

        if buf.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Frame::Data(payload)))
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        match self {
            Frame::Data(payload) => encode(payload),
            Frame::Sentinel => Ok(BytesMut::from(&SENTINEL_BYTES[..])),
        }
    }
}
