use memchr::memchr_iter;

/// Stateful line splitter for text arriving in arbitrary fragments.
///
/// Returns only complete lines (split on `\n`, a preceding `\r` is
/// dropped) and keeps the trailing partial line for the next call.
#[derive(Debug, Default)]
pub struct LineBreaker {
    buffer: String,
}

impl LineBreaker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a fragment and return the lines it completed.
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        let mut lines = Vec::new();
        self.feed_into(fragment, &mut lines);
        lines
    }

    /// Feed a fragment and append completed lines to `out`.
    pub fn feed_into(&mut self, fragment: &str, out: &mut Vec<String>) {
        // The retained partial line never contains '\n', so only the new
        // fragment needs scanning.
        let scan_start = self.buffer.len();
        self.buffer.push_str(fragment);

        let mut line_start = 0usize;
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[line_start..line_end];
            out.push(line.strip_suffix('\r').unwrap_or(line).to_owned());
            line_start = line_end + 1;
        }

        if line_start > 0 {
            self.buffer.drain(..line_start);
        }
    }

    /// The retained partial line (content after the last `\n`).
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_only_complete_lines() {
        let mut breaker = LineBreaker::new();
        assert!(breaker.feed("data: hel").is_empty());
        assert_eq!(breaker.feed("lo\ndata: wor"), vec!["data: hello"]);
        assert_eq!(breaker.remainder(), "data: wor");
        assert_eq!(breaker.feed("ld\n\n"), vec!["data: world", ""]);
        assert_eq!(breaker.remainder(), "");
    }

    #[test]
    fn test_strips_carriage_return_before_newline() {
        let mut breaker = LineBreaker::new();
        assert_eq!(breaker.feed("a\r\nb\r"), vec!["a"]);
        assert_eq!(breaker.feed("\nc"), vec!["b"]);
        assert_eq!(breaker.remainder(), "c");
    }

    #[test]
    fn test_round_trip_across_every_split_point() {
        let input = "event: x\r\ndata: {\"a\":1}\n\ndata: caf\u{e9}\npartial tail";
        let expected: Vec<&str> = input.split('\n').map(|l| l.trim_end_matches('\r')).collect();

        for split in (0..=input.len()).filter(|i| input.is_char_boundary(*i)) {
            let mut breaker = LineBreaker::new();
            let mut lines = breaker.feed(&input[..split]);
            lines.extend(breaker.feed(&input[split..]));
            lines.push(breaker.remainder().to_owned());
            assert_eq!(lines, expected, "split at {split}");
        }
    }

    #[test]
    fn test_round_trip_one_char_at_a_time() {
        let input = "l1\nl2\r\n\nl4";
        let mut breaker = LineBreaker::new();
        let mut lines = Vec::new();
        for ch in input.chars() {
            let mut buf = [0u8; 4];
            breaker.feed_into(ch.encode_utf8(&mut buf), &mut lines);
        }
        lines.push(breaker.remainder().to_owned());
        assert_eq!(lines, vec!["l1", "l2", "", "l4"]);
    }

    #[test]
    fn test_unterminated_line_is_never_emitted() {
        let mut breaker = LineBreaker::new();
        assert!(breaker.feed("data: {\"text\":\"tail\"}").is_empty());
        assert!(breaker.feed("").is_empty());
        assert_eq!(breaker.remainder(), "data: {\"text\":\"tail\"}");
    }
}
