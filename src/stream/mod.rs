//! Upstream body decoding: bytes to text, text to lines, lines to deltas.

pub mod eventstream;
pub mod extract;
pub mod lines;
pub mod sink;
pub mod sse;
pub mod text;

pub use eventstream::{EventMessage, EventStreamDecoder, EventStreamError};
#[cfg(test)]
pub(crate) use eventstream::encode_message;
pub use extract::pick_text;
pub use lines::LineBreaker;
pub use sink::{delta_channel, ClientDisconnected, DeltaReceiver, DeltaSink, DEFAULT_SINK_CAPACITY};
pub use sse::{is_done_payload, parse_sse_data, parse_sse_event, DONE_SENTINEL};
pub use text::{text_stream, Utf8Decoder};
