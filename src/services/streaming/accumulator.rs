//! Folds streamed chunks into one response
//!
//! Text increments are concatenated in arrival order; statistics come from
//! the final (`done=true`) chunk.

use crate::error::{ChatError, Result};
use crate::services::{GenerationChunk, PayloadMode};

/// Assembles a streamed answer
#[derive(Debug)]
pub struct StreamAccumulator {
    mode: PayloadMode,

    /// Text content being assembled
    text: String,

    /// Daemon-reported reasoning being assembled
    thinking: Option<String>,

    /// Final chunk, once received
    last: Option<GenerationChunk>,

    /// Number of chunks seen
    chunks: usize,
}

impl StreamAccumulator {
    /// Create a new accumulator for responses of the given shape
    #[must_use]
    pub const fn new(mode: PayloadMode) -> Self {
        Self {
            mode,
            text: String::new(),
            thinking: None,
            last: None,
            chunks: 0,
        }
    }

    /// Add a chunk
    ///
    /// Returns true once the final chunk has been received. Chunks after the
    /// final one are ignored.
    pub fn push(&mut self, chunk: GenerationChunk) -> bool {
        if self.last.is_some() {
            return true;
        }

        self.chunks += 1;
        self.text.push_str(&chunk.text);
        if let Some(thinking) = &chunk.thinking {
            self.thinking
                .get_or_insert_with(String::new)
                .push_str(thinking);
        }

        if chunk.done {
            self.last = Some(chunk);
            return true;
        }

        false
    }

    /// Text received so far
    #[must_use]
    pub fn current_text(&self) -> &str {
        &self.text
    }

    /// Number of chunks folded in
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Whether the final chunk has arrived
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.last.is_some()
    }

    /// The assembled response
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::IncompleteResponse`] if the stream ended before a
    /// `done=true` chunk
    pub fn finish(self) -> Result<GenerationChunk> {
        let Some(last) = self.last else {
            return Err(ChatError::IncompleteResponse {
                endpoint: self.mode.endpoint().path().to_string(),
            });
        };

        Ok(GenerationChunk {
            text: self.text,
            thinking: self.thinking,
            ..last
        })
    }
}
