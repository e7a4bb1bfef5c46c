//! Encoder and buffered decoder for subd frames.

use crate::command::Command;
use crate::error::ProtocolError;
use crate::frame::{self, Frame, SENTINEL_BYTES};
use crate::MAX_PAYLOAD_SIZE;
use bytes::BytesMut;

/// Encodes commands, replies and notifications into wire bytes.
pub struct Encoder;

impl Encoder {
    /// Encodes a command into a frame.
    pub fn encode_command(command: &Command) -> Result<BytesMut, ProtocolError> {
        frame::encode(command.as_str().as_bytes())
    }

    /// Encodes arbitrary reply text into a frame.
    pub fn encode_text(text: &str) -> Result<BytesMut, ProtocolError> {
        frame::encode(text.as_bytes())
    }

    /// Returns the bytes of a change notification.
    pub fn encode_notification() -> [u8; 4] {
        SENTINEL_BYTES
    }
}

/// Accumulates stream bytes and yields complete frames.
pub struct Decoder {
    buffer: BytesMut,
    max_payload: u32,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Creates a decoder that rejects payloads longer than `max_payload`.
    pub fn with_max_payload(max_payload: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_payload: max_payload.min(MAX_PAYLOAD_SIZE),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer, self.max_payload)
    }

    /// Attempts to decode the next text payload, skipping notifications.
    pub fn decode_text(&mut self) -> Result<Option<String>, ProtocolError> {
        loop {
            match self.decode_frame()? {
                Some(Frame::Sentinel) => continue,
                Some(Frame::Data(payload)) => {
                    let text = String::from_utf8(payload.to_vec())
                        .map_err(|_| ProtocolError::MalformedReply)?;
                    return Ok(Some(text));
                }
                None => return Ok(None),
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
