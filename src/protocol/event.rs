use serde::{Deserialize, Serialize};

use crate::util::push_json_string_escaped;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";
pub const NO_STORE_CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate";

/// Canonical event emitted to streaming clients. End of stream is the
/// connection closing; there is no terminal variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputEvent {
    Delta { content: String },
}

/// Encode one delta as a newline-terminated NDJSON line.
///
/// Produces the same bytes as serializing [`OutputEvent::Delta`] with
/// `serde_json` followed by `\n`.
#[must_use]
pub fn encode_delta_line(content: &str) -> String {
    let mut line = String::with_capacity(content.len() + 32);
    line.push_str("{\"type\":\"delta\",\"content\":");
    push_json_string_escaped(&mut line, content);
    line.push_str("}\n");
    line
}
