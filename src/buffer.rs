//! Line-oriented receive buffer for inbound UART data
//! Notifications arrive in arbitrarily-sized fragments; this buffer
//! accumulates them in delivery order and hands them back either raw or as
//! terminator-delimited lines.

/// Append-only byte accumulator with line extraction.
///
/// Single-writer (the notification path) and single-reader (the consumer
/// path); consumed bytes are permanently removed.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Appends a notification fragment to the end of the buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Returns the entire buffer content, raw, and clears it.
    pub fn read_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Extracts the text before the first occurrence of `terminator` and
    /// removes it, terminator included, from the front of the buffer.
    /// Returns `None` and leaves the buffer untouched when no terminator is
    /// buffered yet.
    ///
    /// Decoding is lossy UTF-8. The removed length is counted in characters
    /// of the decoded text but applied in bytes, so multi-byte input ahead
    /// of the terminator leaves the buffer misaligned.
    pub fn read_line(&mut self, terminator: &str) -> Option<String> {
        let text = String::from_utf8_lossy(&self.data);
        let index = text.find(terminator)?;
        let line = text[..index].to_string();

        let consumed = line.chars().count() + terminator.chars().count();
        self.data.drain(..consumed.min(self.data.len()));

        Some(line)
    }

    /// Splits the whole buffer on `terminator` and clears it unconditionally.
    /// The fragment after the last terminator comes back as the final line;
    /// it is not retained for a later append.
    pub fn read_all_lines(&mut self, terminator: &str) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.data).into_owned();
        self.data.clear();

        text.split(terminator).map(str::to_string).collect()
    }

    /// Drops all buffered content without returning it.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_all_drains_in_order() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(b"ab");
        buffer.append(b"cd");

        assert_eq!(buffer.read_all(), b"abcd");
        assert_eq!(buffer.read_all(), b"");
    }

    #[test]
    fn read_all_preserves_raw_bytes() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(&[0x00, 0xff, 0x7f]);

        assert_eq!(buffer.read_all(), vec![0x00, 0xff, 0x7f]);
    }

    #[test]
    fn read_line_extracts_first_line_and_keeps_rest() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(b"abc\r\ndef");

        assert_eq!(buffer.read_line("\r\n").as_deref(), Some("abc"));
        assert_eq!(buffer.read_line("\r\n"), None);
        assert_eq!(buffer.read_all(), b"def");
    }

    #[test]
    fn read_line_without_terminator_leaves_buffer_untouched() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(b"partial");

        assert_eq!(buffer.read_line("\n"), None);
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn read_line_handles_leading_terminator() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(b"\nrest");

        assert_eq!(buffer.read_line("\n").as_deref(), Some(""));
        assert_eq!(buffer.read_all(), b"rest");
    }

    #[test]
    fn read_all_lines_clears_buffer_and_returns_trailing_fragment() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(b"one\ntwo\nthree");

        assert_eq!(buffer.read_all_lines("\n"), ["one", "two", "three"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn read_all_lines_with_trailing_terminator_yields_empty_last_line() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(b"one\n");

        assert_eq!(buffer.read_all_lines("\n"), ["one", ""]);
    }

    #[test]
    fn clear_drops_everything() {
        let mut buffer = ReceiveBuffer::new();
        buffer.append(b"data");
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.read_line("\n"), None);
    }
}
