//! Reasoning block sanitizer
//!
//! Reasoning models such as qwen3 open their answer with a
//! `<think>...</think>` block. [`split_reasoning`] separates that block from
//! the text meant for the user. It is a pure function: no I/O, no state.

use crate::error::{ChatError, Result};

/// Opening reasoning marker
pub const OPEN_MARKER: &str = "<think>";

/// Closing reasoning marker
pub const CLOSE_MARKER: &str = "</think>";

/// Text split into reasoning and user-visible parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningSplit {
    /// Content of the reasoning block(s), trimmed. `None` when the input had no block.
    pub reasoning: Option<String>,

    /// Everything outside the reasoning block(s)
    pub visible: String,
}

/// Split `text` into reasoning and visible text
///
/// Without an opening marker the input is returned unchanged. Otherwise every
/// `<think>...</think>` block is cut out; the visible text is what remains,
/// trimmed. Markers do not nest: a block ends at the first closing marker.
/// Several blocks are joined into one reasoning string, separated by a blank
/// line.
///
/// # Errors
///
/// Returns [`ChatError::UnterminatedReasoningBlock`] when an opening marker
/// has no closing marker after it.
pub fn split_reasoning(text: &str) -> Result<ReasoningSplit> {
    if !text.contains(OPEN_MARKER) {
        return Ok(ReasoningSplit {
            reasoning: None,
            visible: text.to_string(),
        });
    }

    let mut segments: Vec<String> = Vec::new();
    let mut visible = text.to_string();

    // Removing a block can splice a new marker together from the text around
    // it, so repeat until the visible text is marker free.
    while visible.contains(OPEN_MARKER) {
        visible = remove_blocks(&visible, &mut segments)?;
    }

    let reasoning = segments
        .iter()
        .filter(|segment| !segment.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(ReasoningSplit {
        reasoning: Some(reasoning),
        visible: visible.trim().to_string(),
    })
}

/// One left-to-right pass over `text`, collecting block contents
fn remove_blocks(text: &str, segments: &mut Vec<String>) -> Result<String> {
    let mut visible = String::with_capacity(text.len());
    let mut rest = text;
    let mut consumed = 0;

    while let Some(open) = rest.find(OPEN_MARKER) {
        let inner_start = open + OPEN_MARKER.len();
        let Some(close) = rest[inner_start..].find(CLOSE_MARKER) else {
            return Err(ChatError::UnterminatedReasoningBlock {
                marker: OPEN_MARKER,
                offset: consumed + open,
            });
        };

        visible.push_str(&rest[..open]);
        segments.push(rest[inner_start..inner_start + close].trim().to_string());

        let after = inner_start + close + CLOSE_MARKER.len();
        consumed += after;
        rest = &rest[after..];
    }

    visible.push_str(rest);
    Ok(visible)
}
