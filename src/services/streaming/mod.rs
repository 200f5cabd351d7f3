//! Streaming support for daemon responses
//!
//! With `stream=true` the daemon answers with newline-delimited JSON: one
//! envelope per line, each carrying a text increment, the last one marked
//! `done=true` and carrying the statistics.

pub mod accumulator;
pub mod ndjson;
pub mod visible;

pub use accumulator::StreamAccumulator;
pub use ndjson::NdjsonParser;
pub use visible::VisibleTextFilter;

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;
use crate::services::GenerationChunk;

/// Chunks of a streamed generation, in arrival order
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk>> + Send>>;
