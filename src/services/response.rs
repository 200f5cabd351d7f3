//! Response normalizer
//!
//! The chat endpoint puts generated text at `message.content`, the completion
//! endpoint at `response`. Both carry the same token and timing statistics.
//! [`parse_envelope`] reads either shape into one [`GenerationChunk`];
//! which shape to expect is decided by the request's [`PayloadMode`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ChatError, Result};
use crate::reasoning::split_reasoning;

use super::{Endpoint, GenerationResponse, PayloadMode, Usage};

/// One decoded response object
///
/// In non-streaming mode this is the whole answer. In streaming mode it is a
/// single chunk: `text` is the increment, and only the final chunk
/// (`done=true`) carries statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationChunk {
    pub text: String,

    /// Reasoning the daemon reported in a separate `thinking` field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    pub done: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,

    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<i64>,

    pub usage: Usage,
}

/// Fields shared by both envelopes
#[derive(Debug, Default, Deserialize)]
struct CommonFields {
    #[serde(default)]
    model: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    load_duration: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_duration: Option<u64>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    eval_duration: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl CommonFields {
    fn usage(&self) -> Usage {
        let nanos = |value: Option<u64>| Duration::from_nanos(value.unwrap_or(0));
        Usage {
            prompt_tokens: self.prompt_eval_count.unwrap_or(0),
            completion_tokens: self.eval_count.unwrap_or(0),
            total_duration: nanos(self.total_duration),
            load_duration: nanos(self.load_duration),
            prompt_eval_duration: nanos(self.prompt_eval_duration),
            eval_duration: nanos(self.eval_duration),
        }
    }
}

/// `/api/chat` response
#[derive(Debug, Deserialize)]
struct ChatEnvelope {
    #[serde(default)]
    message: Option<ChatEnvelopeMessage>,
    #[serde(flatten)]
    common: CommonFields,
}

#[derive(Debug, Deserialize)]
struct ChatEnvelopeMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

/// `/api/generate` response
#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    context: Option<Vec<i64>>,
    #[serde(flatten)]
    common: CommonFields,
}

/// Timestamps are informational; an unexpected format is dropped, not fatal
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|value| value.with_timezone(&Utc)))
}

/// Decode one response object of the given shape
///
/// # Errors
///
/// - [`ChatError::ResponseParse`] for empty or invalid JSON, or when the text
///   field of the expected shape is missing
/// - [`ChatError::Backend`] when the object carries an `error` field
pub fn parse_envelope(mode: PayloadMode, body: &[u8]) -> Result<GenerationChunk> {
    let endpoint = mode.endpoint();
    let text_body = String::from_utf8_lossy(body);

    if text_body.trim().is_empty() {
        return Err(ChatError::response_parse(
            endpoint.path(),
            "empty response body",
            &text_body,
        ));
    }

    let decode_error =
        |e: serde_json::Error| ChatError::response_parse(endpoint.path(), e.to_string(), &text_body);

    let (text, thinking, context, common) = match mode {
        PayloadMode::Chat => {
            let envelope: ChatEnvelope = serde_json::from_slice(body).map_err(decode_error)?;
            check_error(endpoint, &envelope.common)?;
            let message = envelope.message.ok_or_else(|| {
                ChatError::response_parse(endpoint.path(), "missing `message`", &text_body)
            })?;
            let content = message.content.ok_or_else(|| {
                ChatError::response_parse(endpoint.path(), "missing `message.content`", &text_body)
            })?;
            (content, message.thinking, Vec::new(), envelope.common)
        }
        PayloadMode::Completion => {
            let envelope: CompletionEnvelope =
                serde_json::from_slice(body).map_err(decode_error)?;
            check_error(endpoint, &envelope.common)?;
            let response = envelope.response.ok_or_else(|| {
                ChatError::response_parse(endpoint.path(), "missing `response`", &text_body)
            })?;
            (
                response,
                envelope.thinking,
                envelope.context.unwrap_or_default(),
                envelope.common,
            )
        }
    };

    Ok(GenerationChunk {
        text,
        thinking: thinking.filter(|t| !t.is_empty()),
        done: common.done,
        usage: common.usage(),
        done_reason: common.done_reason,
        model: common.model.unwrap_or_default(),
        created_at: common.created_at,
        context,
    })
}

/// Decode a complete non-streaming body
///
/// # Errors
///
/// Same as [`parse_envelope`], plus [`ChatError::IncompleteResponse`] when the
/// daemon did not report `done=true`
pub fn normalize(mode: PayloadMode, body: &[u8]) -> Result<GenerationChunk> {
    let chunk = parse_envelope(mode, body)?;
    if !chunk.done {
        return Err(ChatError::IncompleteResponse {
            endpoint: mode.endpoint().path().to_string(),
        });
    }
    Ok(chunk)
}

/// Split reasoning out of the assembled text
///
/// Reasoning the daemon sent in its own `thinking` field comes first, followed
/// by any `<think>` blocks found inline.
impl TryFrom<GenerationChunk> for GenerationResponse {
    type Error = ChatError;

    fn try_from(chunk: GenerationChunk) -> Result<Self> {
        let split = split_reasoning(&chunk.text)?;

        let reasoning = match (chunk.thinking, split.reasoning) {
            (Some(field), Some(inline)) if !inline.is_empty() => {
                Some(format!("{field}\n\n{inline}"))
            }
            (Some(field), _) => Some(field),
            (None, inline) => inline,
        };

        Ok(Self {
            text: split.visible,
            reasoning,
            done: chunk.done,
            done_reason: chunk.done_reason,
            model: chunk.model,
            created_at: chunk.created_at,
            context: chunk.context,
            usage: chunk.usage,
        })
    }
}

fn check_error(endpoint: Endpoint, common: &CommonFields) -> Result<()> {
    match &common.error {
        Some(message) => Err(ChatError::Backend {
            endpoint: endpoint.path().to_string(),
            message: message.clone(),
        }),
        None => Ok(()),
    }
}

/// An installed model, as listed by `/api/tags`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

#[derive(Debug, Deserialize)]
struct TagsEnvelope {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Decode the `/api/tags` inventory
///
/// # Errors
///
/// Returns [`ChatError::ResponseParse`] if the body is not a tags object
pub fn parse_tags(body: &[u8]) -> Result<Vec<ModelInfo>> {
    serde_json::from_slice::<TagsEnvelope>(body)
        .map(|tags| tags.models)
        .map_err(|e| {
            ChatError::response_parse(
                Endpoint::Tags.path(),
                e.to_string(),
                &String::from_utf8_lossy(body),
            )
        })
}
