//! Incremental reasoning filter for live output
//!
//! Streamed text arrives in arbitrary pieces, so a `<think>` marker can be
//! split across chunks. [`VisibleTextFilter`] releases only text known to lie
//! outside every reasoning block. Leading and trailing whitespace of the
//! visible text is held back and dropped, so the released text matches the
//! trimmed visible text of the folded response.

use crate::error::{ChatError, Result};
use crate::reasoning::{CLOSE_MARKER, OPEN_MARKER};

/// Streaming counterpart of [`split_reasoning`](crate::reasoning::split_reasoning)
#[derive(Debug, Default)]
pub struct VisibleTextFilter {
    /// Text not classified yet
    pending: String,

    /// Inside a reasoning block
    in_block: bool,

    /// Bytes of input already classified
    consumed: usize,

    /// Offset of the opening marker of the current block
    open_at: usize,

    /// Whether any visible text has been released
    started: bool,

    /// Whitespace held until more visible text follows it
    held: String,
}

impl VisibleTextFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text increment, returning the visible text it releases
    pub fn push(&mut self, delta: &str) -> String {
        self.pending.push_str(delta);
        let mut released = String::new();

        loop {
            if self.in_block {
                if let Some(close) = self.pending.find(CLOSE_MARKER) {
                    self.advance(close + CLOSE_MARKER.len());
                    self.in_block = false;
                    continue;
                }
                let keep = partial_marker_len(&self.pending, CLOSE_MARKER);
                self.advance(self.pending.len() - keep);
                break;
            }

            if let Some(open) = self.pending.find(OPEN_MARKER) {
                let visible = self.pending[..open].to_string();
                self.release(&visible, &mut released);
                self.open_at = self.consumed + open;
                self.advance(open + OPEN_MARKER.len());
                self.in_block = true;
                continue;
            }

            // a marker may still be completed by the next increment
            let ready = self.pending.len() - partial_marker_len(&self.pending, OPEN_MARKER);
            let visible = self.pending[..ready].to_string();
            self.release(&visible, &mut released);
            self.advance(ready);
            break;
        }

        released
    }

    /// Release what is left once the stream has ended
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnterminatedReasoningBlock`] if a block is still open
    pub fn finish(mut self) -> Result<String> {
        if self.in_block {
            return Err(ChatError::UnterminatedReasoningBlock {
                marker: OPEN_MARKER,
                offset: self.open_at,
            });
        }

        let rest = std::mem::take(&mut self.pending);
        let mut released = String::new();
        self.release(&rest, &mut released);
        Ok(released)
    }

    fn advance(&mut self, len: usize) {
        self.pending.drain(..len);
        self.consumed += len;
    }

    fn release(&mut self, text: &str, released: &mut String) {
        let text = if self.started { text } else { text.trim_start() };
        if text.is_empty() {
            return;
        }

        self.held.push_str(text);
        let body = self.held.trim_end().len();
        if body > 0 {
            released.push_str(&self.held[..body]);
            self.held.drain(..body);
            self.started = true;
        }
    }
}

/// Length of the longest suffix of `text` that starts `marker`
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| text.ends_with(&marker[..len]))
        .unwrap_or(0)
}
