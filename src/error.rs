//! Error types for localchat-rs

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`ChatError`]
pub type Result<T> = std::result::Result<T, ChatError>;

/// Maximum number of bytes of a response body kept inside an error
pub const ERROR_BODY_LIMIT: usize = 2048;

/// Main error type for localchat-rs
#[derive(Debug, Error)]
pub enum ChatError {
    /// The caller's prompt or conversation could not be turned into a payload
    #[error("Malformed prompt: {0}")]
    MalformedPrompt(String),

    /// The HTTP call to the inference daemon failed
    #[error("Transport error on {endpoint} ({kind}): {detail}")]
    Transport {
        endpoint: String,
        kind: TransportErrorKind,
        detail: String,
    },

    /// The daemon answered with a body that is not a valid envelope
    #[error("Failed to parse response from {endpoint}: {message}")]
    ResponseParse {
        endpoint: String,
        message: String,
        /// Offending body, truncated to [`ERROR_BODY_LIMIT`]
        body: String,
    },

    /// The daemon reported `done=false` and nothing else is coming
    #[error("Incomplete response from {endpoint}: backend never reported done")]
    IncompleteResponse { endpoint: String },

    /// An opening reasoning marker has no matching closing marker
    #[error("Unterminated reasoning block: `{marker}` at byte {offset} is never closed")]
    UnterminatedReasoningBlock { marker: &'static str, offset: usize },

    /// The requested mode is not enabled for this adapter
    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    /// The daemon returned an error object inside a successful response
    #[error("Backend error from {endpoint}: {message}")]
    Backend { endpoint: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// JSON serialization error (request side)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Classification of a [`ChatError::Transport`] failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Nothing is listening on the configured address
    ConnectionRefused,
    /// The request exceeded the configured timeout
    Timeout,
    /// The daemon answered with a non-2xx status
    HttpStatus(u16),
    /// Any other request failure (body decoding, redirect loops, ...)
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::Timeout => write!(f, "timeout"),
            Self::HttpStatus(code) => write!(f, "HTTP {code}"),
            Self::Other => write!(f, "request failed"),
        }
    }
}

impl ChatError {
    /// Transport failure kind, if this is a transport error
    #[must_use]
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this is a timeout of the underlying request
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.transport_kind() == Some(TransportErrorKind::Timeout)
    }

    /// Build a [`ChatError::ResponseParse`], keeping a bounded copy of the body
    pub(crate) fn response_parse(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        body: &str,
    ) -> Self {
        Self::ResponseParse {
            endpoint: endpoint.into(),
            message: message.into(),
            body: truncate_body(body),
        }
    }
}

/// Cut a body down to [`ERROR_BODY_LIMIT`] bytes on a char boundary
#[must_use]
pub fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind() {
        let err = ChatError::Transport {
            endpoint: "/api/chat".into(),
            kind: TransportErrorKind::HttpStatus(404),
            detail: "model not found".into(),
        };
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::HttpStatus(404)));
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Transport error on /api/chat (HTTP 404): model not found"
        );
    }

    #[test]
    fn test_non_transport_has_no_kind() {
        let err = ChatError::UnsupportedMode("streaming".into());
        assert!(err.transport_kind().is_none());
    }

    #[test]
    fn test_truncate_body() {
        let short = "short body";
        assert_eq!(truncate_body(short), short);

        let long = "é".repeat(ERROR_BODY_LIMIT);
        let truncated = truncate_body(&long);
        assert!(truncated.len() < long.len());
        assert!(truncated.ends_with(&format!("({} bytes total)", long.len())));
    }
}
