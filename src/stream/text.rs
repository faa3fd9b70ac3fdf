//! Incremental byte-to-text decoding for upstream response bodies.

use futures_util::{Stream, StreamExt};

const REPLACEMENT: char = '\u{fffd}';

/// Streaming UTF-8 decoder.
///
/// Multi-byte sequences split across chunk boundaries are held back until
/// the next chunk completes them; invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk. Bytes of an incomplete trailing sequence stay buffered.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        if self.pending.is_empty() {
            let (text, rest) = decode_prefix(chunk);
            self.pending.extend_from_slice(rest);
            return text;
        }

        self.pending.extend_from_slice(chunk);
        let buffered = std::mem::take(&mut self.pending);
        let (text, rest) = decode_prefix(&buffered);
        self.pending.extend_from_slice(rest);
        text
    }

    /// Number of bytes held back waiting for the rest of a sequence.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Decode as much of `bytes` as possible, returning the text and the
/// incomplete tail that must wait for more input.
fn decode_prefix(bytes: &[u8]) -> (String, &[u8]) {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(text) => {
                out.push_str(text);
                return (out, &[]);
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                out.push_str(std::str::from_utf8(&rest[..valid_up_to]).unwrap_or_default());
                match err.error_len() {
                    Some(invalid_len) => {
                        out.push(REPLACEMENT);
                        rest = &rest[valid_up_to + invalid_len..];
                    }
                    None => return (out, &rest[valid_up_to..]),
                }
            }
        }
    }
}

/// Turn an upstream byte stream into a lazy stream of decoded text fragments.
///
/// The stream ends at the first transport error; empty fragments are skipped.
pub fn text_stream<S, E>(byte_stream: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(byte_stream), Utf8Decoder::new()),
        |(mut stream, mut decoder)| async move {
            loop {
                match stream.as_mut().next().await? {
                    Ok(bytes) => {
                        let text = decoder.decode(&bytes);
                        if !text.is_empty() {
                            return Some((text, (stream, decoder)));
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "upstream body read failed, ending stream");
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_decode_split_multibyte_sequence() {
        let encoded = "caf\u{e9} \u{1f600}".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in encoded {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        assert_eq!(out, "caf\u{e9} \u{1f600}");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_decode_holds_incomplete_tail() {
        let mut decoder = Utf8Decoder::new();
        let emoji = "\u{1f600}".as_bytes();
        assert_eq!(decoder.decode(&emoji[..2]), "");
        assert_eq!(decoder.pending_len(), 2);
        assert_eq!(decoder.decode(&emoji[2..]), "\u{1f600}");
    }

    #[test]
    fn test_decode_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[tokio::test]
    async fn test_text_stream_reassembles_chunks() {
        let emoji = "\u{1f600}".as_bytes();
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: ")),
            Ok(Bytes::copy_from_slice(&emoji[..1])),
            Ok(Bytes::copy_from_slice(&emoji[1..])),
            Ok(Bytes::from_static(b"\n")),
        ];
        let fragments: Vec<String> = text_stream(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(fragments.concat(), "data: \u{1f600}\n");
    }

    #[tokio::test]
    async fn test_text_stream_stops_on_error() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"first\n")),
            Err(std::io::Error::other("reset")),
            Ok(Bytes::from_static(b"never\n")),
        ];
        let fragments: Vec<String> = text_stream(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(fragments, vec!["first\n".to_string()]);
    }
}
