//! AWS event-stream (`application/vnd.amazon.eventstream`) messages.
//!
//! Framing and checksums are handled by [`EventStreamCodec`]; this module
//! buffers body chunks for it and flattens decoded messages into the
//! string headers and payload the Bedrock adapter reads.

use aws_event_stream_parser::{EventStreamCodec, HeaderValue, Message};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder as _;

/// Framing error reported by the codec. The decoder is unusable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("corrupt event-stream frame")]
pub struct EventStreamError;

/// One decoded event-stream message. Only string-valued headers are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub headers: Vec<(String, String)>,
    pub payload: Bytes,
}

impl EventMessage {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `:message-type` header (`event`, `exception` or `error`).
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.header(":message-type")
    }

    /// `:event-type` header (`chunk` for Bedrock response chunks).
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.header(":event-type")
    }
}

impl From<Message> for EventMessage {
    fn from(message: Message) -> Self {
        let headers = message
            .headers
            .headers
            .into_iter()
            .filter_map(|header| match header.value {
                HeaderValue::String(value) => Some((header.key.to_string(), value.to_string())),
                _ => None,
            })
            .collect();
        Self {
            headers,
            payload: Bytes::copy_from_slice(&message.body[..]),
        }
    }
}

/// Incremental decoder: push raw body bytes, pull complete messages.
pub struct EventStreamDecoder {
    codec: EventStreamCodec,
    buffer: BytesMut,
}

impl Default for EventStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventStreamDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamDecoder")
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl EventStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            codec: EventStreamCodec,
            buffer: BytesMut::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet consumed by a complete message.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete message, if the buffer holds one.
    ///
    /// # Errors
    ///
    /// Returns [`EventStreamError`] when the codec rejects the framing.
    pub fn next_message(&mut self) -> Result<Option<EventMessage>, EventStreamError> {
        match self.codec.decode(&mut self.buffer) {
            Ok(message) => Ok(message.map(EventMessage::from)),
            Err(_) => Err(EventStreamError),
        }
    }
}

/// Frame a message with string headers. Builds upstream fixtures in tests.
#[cfg(test)]
pub(crate) fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Bytes {
    use bytes::BufMut;

    let mut header_block = BytesMut::new();
    for (name, value) in headers {
        header_block.put_u8(name.len() as u8);
        header_block.put_slice(name.as_bytes());
        header_block.put_u8(7);
        header_block.put_u16(value.len() as u16);
        header_block.put_slice(value.as_bytes());
    }

    let total_len = 16 + header_block.len() + payload.len();
    let mut out = BytesMut::with_capacity(total_len);
    out.put_u32(total_len as u32);
    out.put_u32(header_block.len() as u32);
    out.put_u32(crc32fast::hash(&out[..8]));
    out.put_slice(&header_block);
    out.put_slice(payload);
    out.put_u32(crc32fast::hash(&out));
    out.freeze()
}
