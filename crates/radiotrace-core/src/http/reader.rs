/// Line-oriented cursor over a reassembled byte stream.
///
/// Lines are CRLF-terminated (a bare LF is tolerated); the terminator is
/// consumed but not returned. A trailing run of bytes without a
/// terminator is returned as a final line, since captures routinely cut
/// off mid-message.
pub struct ByteLineReader<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> ByteLineReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    /// Current byte offset, i.e. where the next line would start.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn at_end(&self) -> bool {
        self.index >= self.data.len()
    }

    /// Read the next line, lossily decoded. `None` at end of data.
    pub fn read_line(&mut self) -> Option<String> {
        if self.at_end() {
            return None;
        }
        let start = self.index;
        let mut end = start;
        while end < self.data.len() && self.data[end] != b'\n' {
            end += 1;
        }
        let mut line_end = end;
        if line_end > start && self.data[line_end - 1] == b'\r' {
            line_end -= 1;
        }
        self.index = if end < self.data.len() { end + 1 } else { end };
        Some(String::from_utf8_lossy(&self.data[start..line_end]).into_owned())
    }

    /// Skip `len` bytes of body, clamping at the end of the buffer when
    /// the capture is shorter than the declared content.
    pub fn skip_forward(&mut self, len: usize) {
        self.index = (self.index + len).min(self.data.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_crlf_lines_and_tracks_index() {
        let mut reader = ByteLineReader::new(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nbody");
        assert_eq!(reader.read_line().as_deref(), Some("GET / HTTP/1.1"));
        assert_eq!(reader.read_line().as_deref(), Some("Host: x"));
        assert_eq!(reader.read_line().as_deref(), Some(""));
        let body_start = reader.index();
        assert_eq!(&reader.data[body_start..], b"body");
    }

    #[test]
    fn bare_lf_and_trailing_fragment() {
        let mut reader = ByteLineReader::new(b"a\nb");
        assert_eq!(reader.read_line().as_deref(), Some("a"));
        assert_eq!(reader.read_line().as_deref(), Some("b"));
        assert_eq!(reader.read_line(), None);
    }

    #[test]
    fn skip_forward_clamps_at_end() {
        let mut reader = ByteLineReader::new(b"abcdef");
        reader.skip_forward(4);
        assert_eq!(reader.index(), 4);
        reader.skip_forward(100);
        assert_eq!(reader.index(), 6);
        assert!(reader.at_end());
        assert_eq!(reader.read_line(), None);
    }
}
