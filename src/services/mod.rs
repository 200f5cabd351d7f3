//! Service layer for the local inference daemon
//!
//! This module provides:
//! - Request/response types shared by every endpoint
//! - The [`Transport`] seam between the adapter and the network
//! - The Ollama adapter itself ([`ollama::OllamaAdapter`])

pub mod ollama;
pub mod request;
pub mod response;
pub mod streaming;
pub mod transport;

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{error::Result, messages::ConversationMessage};

pub use ollama::OllamaAdapter;
pub use response::{GenerationChunk, ModelInfo};
pub use transport::HttpTransport;

/// Generation options forwarded to the daemon's `options` object
///
/// Unknown keys are kept in `extra` and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p for nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,

    /// Sampling seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Any other backend-specific parameter
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationOptions {
    /// True when no option is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fill every unset field from `defaults`
    #[must_use]
    pub fn or(mut self, defaults: &Self) -> Self {
        self.temperature = self.temperature.or(defaults.temperature);
        self.top_p = self.top_p.or(defaults.top_p);
        self.top_k = self.top_k.or(defaults.top_k);
        self.num_predict = self.num_predict.or(defaults.num_predict);
        self.seed = self.seed.or(defaults.seed);
        self.stop = self.stop.or_else(|| defaults.stop.clone());
        for (key, value) in &defaults.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self
    }
}

/// Which wire shape a request uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    /// Structured chat (`/api/chat`)
    #[default]
    Chat,
    /// Plain completion (`/api/generate`)
    Completion,
}

impl PayloadMode {
    /// Endpoint serving this payload shape
    #[must_use]
    pub const fn endpoint(self) -> Endpoint {
        match self {
            Self::Chat => Endpoint::Chat,
            Self::Completion => Endpoint::Generate,
        }
    }
}

impl fmt::Display for PayloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Completion => write!(f, "completion"),
        }
    }
}

impl FromStr for PayloadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "completion" | "generate" => Ok(Self::Completion),
            _ => Err(format!("Invalid payload mode: {s} (expected chat or completion)")),
        }
    }
}

/// Daemon endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Chat,
    Generate,
    Tags,
}

impl Endpoint {
    /// Path relative to the base URL
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Chat => "/api/chat",
            Self::Generate => "/api/generate",
            Self::Tags => "/api/tags",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// One text generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier; empty means the configured default
    pub model: String,

    /// Conversation in order
    pub messages: Vec<ConversationMessage>,

    /// Legacy-format prompt (`raw=false`) or fully formatted prompt (`raw=true`)
    pub prompt: Option<String>,

    /// Whether to stream the response
    pub stream: bool,

    /// Backend generation parameters
    pub options: GenerationOptions,

    /// Bypass the daemon's prompt template
    pub raw: bool,

    /// Payload shape
    pub mode: PayloadMode,
}

impl GenerationRequest {
    /// Structured chat request
    #[must_use]
    pub fn chat(model: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            mode: PayloadMode::Chat,
            ..Self::default()
        }
    }

    /// Completion request built from a conversation
    #[must_use]
    pub fn completion(model: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            mode: PayloadMode::Completion,
            ..Self::default()
        }
    }

    /// Request from a legacy flat-string prompt
    #[must_use]
    pub fn legacy(model: impl Into<String>, prompt: impl Into<String>, mode: PayloadMode) -> Self {
        Self {
            model: model.into(),
            prompt: Some(prompt.into()),
            mode,
            ..Self::default()
        }
    }

    /// Raw completion request; the prompt is sent verbatim
    #[must_use]
    pub fn raw(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: Some(prompt.into()),
            raw: true,
            mode: PayloadMode::Completion,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Token and timing statistics reported by the daemon
///
/// Durations serialize as nanoseconds, like the daemon reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    #[serde(serialize_with = "as_nanos")]
    pub total_duration: Duration,
    #[serde(serialize_with = "as_nanos")]
    pub load_duration: Duration,
    #[serde(serialize_with = "as_nanos")]
    pub prompt_eval_duration: Duration,
    #[serde(serialize_with = "as_nanos")]
    pub eval_duration: Duration,
}

fn as_nanos<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

impl Usage {
    #[must_use]
    pub const fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Generation speed, if the daemon reported an eval duration
    #[must_use]
    pub fn tokens_per_second(&self) -> Option<f64> {
        let secs = self.eval_duration.as_secs_f64();
        (secs > 0.0).then(|| f64::from(self.completion_tokens) / secs)
    }
}

/// Result of a generation call, reasoning already separated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResponse {
    /// Text meant for the user
    pub text: String,

    /// Content of the stripped reasoning block, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    pub done: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,

    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Token context returned by the completion endpoint
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<i64>,

    pub usage: Usage,
}

/// Body of a response, delivered as it arrives
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// HTTP seam between the adapter and the daemon
///
/// [`HttpTransport`] is the real implementation; tests plug in fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON payload; the body is returned as a byte stream
    ///
    /// Implementations fail before returning for connection errors and
    /// non-2xx statuses. Timeouts may also surface while the stream is read.
    async fn post(&self, endpoint: Endpoint, payload: &Value) -> Result<ByteStream>;

    /// GET an endpoint and return the full body
    async fn get(&self, endpoint: Endpoint) -> Result<Bytes>;
}
