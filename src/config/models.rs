//! Model references
//!
//! Applications name models as `ollama:<name>` (for example
//! `ollama:qwen3:0.6b`) or by the bare daemon name. Prefixes naming other
//! backends are rejected: this crate only talks to the local daemon.

use std::fmt;
use std::str::FromStr;

use crate::error::{ChatError, Result};

const OLLAMA_PREFIX: &str = "ollama:";

const FOREIGN_PREFIXES: [&str; 2] = ["hf:", "huggingface:"];

/// A validated reference to a model served by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    name: String,
}

impl ModelRef {
    /// Parse a model identifier, stripping an `ollama:` prefix
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConfigValidation`] for an empty name or a prefix
    /// naming another backend
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        if let Some(prefix) = FOREIGN_PREFIXES.iter().find(|p| raw.starts_with(**p)) {
            return Err(ChatError::ConfigValidation(format!(
                "model `{raw}` uses the `{prefix}` backend, only the local daemon is supported"
            )));
        }

        let name = raw.strip_prefix(OLLAMA_PREFIX).unwrap_or(raw).trim();
        if name.is_empty() {
            return Err(ChatError::ConfigValidation(format!(
                "model identifier `{raw}` is empty"
            )));
        }

        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Name as the daemon knows it (e.g. `qwen3:0.6b`)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for ModelRef {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_and_bare_names() {
        assert_eq!(ModelRef::parse("ollama:qwen3:0.6b").unwrap().name(), "qwen3:0.6b");
        assert_eq!(ModelRef::parse("qwen3:0.6b").unwrap().name(), "qwen3:0.6b");
        assert_eq!(
            "hf.co/bartowski/Llama-3.2-1B-Instruct-GGUF".parse::<ModelRef>().unwrap().name(),
            "hf.co/bartowski/Llama-3.2-1B-Instruct-GGUF"
        );
    }

    #[test]
    fn test_rejects_empty_and_foreign() {
        assert!(ModelRef::parse("").is_err());
        assert!(ModelRef::parse("ollama:").is_err());
        assert!(ModelRef::parse("hf:TinyLlama/TinyLlama-1.1B-Chat-v1.0").is_err());
    }
}
