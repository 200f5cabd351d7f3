//! Legacy flat-string prompt template
//!
//! Older callers format a whole conversation into one string using role
//! markers:
//!
//! ```text
//! <|system|>
//! You are helpful
//! <|user|>
//! Hi
//! <|assistant|>
//! ```
//!
//! [`render_legacy_prompt`] produces that format, [`parse_legacy_prompt`]
//! turns it back into role-tagged messages. A trailing empty `<|assistant|>`
//! is the generation cue and carries no message.

use crate::error::{ChatError, Result};

use super::{ConversationMessage, Role};

const SYSTEM_MARKER: &str = "<|system|>";
const USER_MARKER: &str = "<|user|>";
const ASSISTANT_MARKER: &str = "<|assistant|>";

const MARKERS: [(&str, Role); 3] = [
    (SYSTEM_MARKER, Role::System),
    (USER_MARKER, Role::User),
    (ASSISTANT_MARKER, Role::Assistant),
];

/// Marker string for a role
#[must_use]
pub const fn marker_for(role: Role) -> &'static str {
    match role {
        Role::System => SYSTEM_MARKER,
        Role::User => USER_MARKER,
        Role::Assistant => ASSISTANT_MARKER,
    }
}

/// Format messages into the legacy flat-string template
///
/// With `add_generation_prompt` a trailing `<|assistant|>` cue is appended.
#[must_use]
pub fn render_legacy_prompt(messages: &[ConversationMessage], add_generation_prompt: bool) -> String {
    let mut prompt = String::new();

    for message in messages {
        prompt.push_str(marker_for(message.role()));
        prompt.push('\n');
        prompt.push_str(message.content());
        prompt.push('\n');
    }

    if add_generation_prompt {
        prompt.push_str(ASSISTANT_MARKER);
        prompt.push('\n');
    }

    prompt
}

/// A role marker found in the input
struct MarkerHit {
    role: Role,
    start: usize,
    end: usize,
}

/// Find the earliest role marker at or after `from`
fn next_marker(input: &str, from: usize) -> Option<MarkerHit> {
    MARKERS
        .iter()
        .filter_map(|(marker, role)| {
            input[from..].find(marker).map(|offset| MarkerHit {
                role: *role,
                start: from + offset,
                end: from + offset + marker.len(),
            })
        })
        .min_by_key(|hit| hit.start)
}

/// Parse a legacy flat-string prompt into conversation messages
///
/// - Text before the first marker becomes an implicit system message.
/// - Input without any marker becomes a single user message.
/// - A marker with empty or missing content is an error, except for the
///   trailing `<|assistant|>` generation cue, which is dropped.
///
/// # Errors
///
/// Returns [`ChatError::MalformedPrompt`] if a marker has no content or the
/// input yields no messages.
pub fn parse_legacy_prompt(input: &str) -> Result<Vec<ConversationMessage>> {
    let Some(first) = next_marker(input, 0) else {
        let content = input.trim();
        if content.is_empty() {
            return Err(ChatError::MalformedPrompt("prompt is empty".to_string()));
        }
        return Ok(vec![ConversationMessage::user(content)]);
    };

    let mut messages = Vec::new();

    let leading = input[..first.start].trim();
    if !leading.is_empty() {
        messages.push(ConversationMessage::system(leading));
    }

    let mut current = Some(first);
    while let Some(hit) = current {
        let next = next_marker(input, hit.end);
        let block_end = next.as_ref().map_or(input.len(), |n| n.start);
        let content = input[hit.end..block_end].trim();

        if content.is_empty() {
            let is_generation_cue = hit.role == Role::Assistant && next.is_none();
            if !is_generation_cue {
                return Err(ChatError::MalformedPrompt(format!(
                    "`{}` at byte {} has no content",
                    marker_for(hit.role),
                    hit.start
                )));
            }
        } else {
            messages.push(ConversationMessage::new(hit.role, content));
        }

        current = next;
    }

    if messages.is_empty() {
        return Err(ChatError::MalformedPrompt(
            "prompt contains no messages".to_string(),
        ));
    }

    Ok(messages)
}
