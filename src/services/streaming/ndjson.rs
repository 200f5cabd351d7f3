//! Newline-delimited JSON parser
//!
//! The daemon streams one JSON object per line. Network chunks do not respect
//! line boundaries, so bytes are buffered until a full line is available.

/// Line splitter for NDJSON streams
#[derive(Debug, Default)]
pub struct NdjsonParser {
    /// Bytes of the line being assembled
    buffer: Vec<u8>,
}

impl NdjsonParser {
    /// Create a new parser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes
    ///
    /// Returns the complete, non-blank lines it finished. A partial trailing
    /// line is kept until the next call.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !is_blank(&line) {
                lines.push(line);
            }
        }

        lines
    }

    /// Take whatever is left once the stream has ended
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        let line = std::mem::take(&mut self.buffer);
        (!is_blank(&line)).then_some(line)
    }

    /// Whether a partial line is buffered
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !is_blank(&self.buffer)
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
