//! SSE (Server-Sent Events) line helpers.
//!
//! Upstream SSE bodies are consumed one line at a time (see
//! [`super::LineBreaker`]); these helpers classify single lines per the
//! [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html)
//! field syntax, without frame assembly.

/// Payload some upstreams send in place of a final JSON chunk.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Return the payload of a `data:` line, or `None` for any other line.
///
/// Leading whitespace before the field name and after the colon is skipped;
/// the rest of the line is returned verbatim.
#[must_use]
pub fn parse_sse_data(line: &str) -> Option<&str> {
    parse_field(line, "data:")
}

/// Return the event name of an `event:` line, or `None` for any other line.
#[must_use]
pub fn parse_sse_event(line: &str) -> Option<&str> {
    parse_field(line, "event:").map(str::trim_end)
}

#[inline]
fn parse_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    line.trim_start()
        .strip_prefix(field)
        .map(str::trim_start)
}

/// Whether a `data:` payload is the `[DONE]` completion sentinel.
#[inline]
#[must_use]
pub fn is_done_payload(payload: &str) -> bool {
    payload.trim() == DONE_SENTINEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_line_returns_trailing_substring() {
        assert_eq!(parse_sse_data("data: hello"), Some("hello"));
        assert_eq!(parse_sse_data("data:hello"), Some("hello"));
        assert_eq!(parse_sse_data("data:   {\"a\": 1} "), Some("{\"a\": 1} "));
        assert_eq!(parse_sse_data("  data: x"), Some("x"));
        assert_eq!(parse_sse_data("data:"), Some(""));
    }

    #[test]
    fn test_non_data_lines_do_not_match() {
        assert_eq!(parse_sse_data("event: message_stop"), None);
        assert_eq!(parse_sse_data(": keepalive"), None);
        assert_eq!(parse_sse_data(""), None);
        assert_eq!(parse_sse_data("{\"text\":\"bare\"}"), None);
        assert_eq!(parse_sse_data("id: 7"), None);
    }

    #[test]
    fn test_event_line_name() {
        assert_eq!(parse_sse_event("event: message_stop"), Some("message_stop"));
        assert_eq!(parse_sse_event("event:content_block_delta "), Some("content_block_delta"));
        assert_eq!(parse_sse_event("data: {}"), None);
    }

    #[test]
    fn test_done_sentinel() {
        assert!(is_done_payload("[DONE]"));
        assert!(is_done_payload("[DONE] "));
        assert!(!is_done_payload("{\"done\":true}"));
    }
}
