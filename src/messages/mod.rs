//! Message types for local model conversations
//!
//! A conversation is an ordered list of role-tagged [`ConversationMessage`]s.
//! Older callers that hand over a single pre-formatted string go through the
//! [`template`] module, which parses that string into the same sequence.

pub mod template;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use template::{parse_legacy_prompt, render_legacy_prompt};

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Invalid role: {s}")),
        }
    }
}

/// A single message in the conversation
///
/// Serializes to the `{role, content}` shape the chat endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    role: Role,
    content: String,
}

impl ConversationMessage {
    /// Create a message with an explicit role
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_messages() {
        let msg = ConversationMessage::user("Hello");
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.content(), "Hello");

        let msg = ConversationMessage::system("Be brief");
        assert_eq!(msg.role(), Role::System);
    }

    #[test]
    fn test_wire_shape() {
        let msg = ConversationMessage::assistant("Hi there");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, serde_json::json!({"role": "assistant", "content": "Hi there"}));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("User".parse::<Role>().unwrap(), Role::User);
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);
        assert!("tool".parse::<Role>().is_err());
    }
}
