//! Request builder
//!
//! Turns a [`GenerationRequest`] into exactly one wire payload: a chat body
//! for `/api/chat` or a completion body for `/api/generate`. The shape is
//! chosen by the caller's [`PayloadMode`], never guessed from content.

use serde::Serialize;
use serde_json::Value;

use crate::{
    config::ModelRef,
    error::{ChatError, Result},
    messages::{parse_legacy_prompt, render_legacy_prompt, ConversationMessage, Role},
};

use super::{Endpoint, GenerationOptions, GenerationRequest, PayloadMode};

/// Body for `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatPayload {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "GenerationOptions::is_empty")]
    pub options: GenerationOptions,
}

/// Body for `POST /api/generate`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionPayload {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub raw: bool,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "GenerationOptions::is_empty")]
    pub options: GenerationOptions,
}

/// A payload ready to be sent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Chat(ChatPayload),
    Completion(CompletionPayload),
}

impl Payload {
    /// Endpoint this payload is sent to
    #[must_use]
    pub const fn endpoint(&self) -> Endpoint {
        match self {
            Self::Chat(_) => Endpoint::Chat,
            Self::Completion(_) => Endpoint::Generate,
        }
    }

    /// Response shape the daemon will answer with
    #[must_use]
    pub const fn mode(&self) -> PayloadMode {
        match self {
            Self::Chat(_) => PayloadMode::Chat,
            Self::Completion(_) => PayloadMode::Completion,
        }
    }

    /// Whether the daemon will stream the answer
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        match self {
            Self::Chat(payload) => payload.stream,
            Self::Completion(payload) => payload.stream,
        }
    }

    /// Serialize to a JSON value
    ///
    /// # Errors
    ///
    /// Returns an error if an option cannot be represented as JSON
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Build the payload for `request`
///
/// `defaults` fills any option the request leaves unset.
///
/// # Errors
///
/// Returns [`ChatError::MalformedPrompt`] when the request cannot be turned
/// into a payload:
/// - `raw=true` together with messages, without a prompt, or in chat mode
/// - both messages and a legacy prompt, or neither
/// - a legacy prompt that does not parse
pub fn build_payload(
    request: &GenerationRequest,
    model: &ModelRef,
    defaults: &GenerationOptions,
) -> Result<Payload> {
    let options = request.options.clone().or(defaults);

    if request.raw {
        return build_raw(request, model, options).map(Payload::Completion);
    }

    let messages = resolve_conversation(request)?;

    match request.mode {
        PayloadMode::Chat => Ok(Payload::Chat(ChatPayload {
            model: model.name().to_string(),
            messages,
            stream: request.stream,
            options,
        })),
        PayloadMode::Completion => {
            build_completion(&messages, model, request.stream, options).map(Payload::Completion)
        }
    }
}

/// The conversation a non-raw request carries
///
/// # Errors
///
/// Returns [`ChatError::MalformedPrompt`] if the request has both messages
/// and a legacy prompt, neither, or a legacy prompt that does not parse
pub fn resolve_conversation(request: &GenerationRequest) -> Result<Vec<ConversationMessage>> {
    match (request.messages.is_empty(), request.prompt.as_deref()) {
        (false, None) => Ok(request.messages.clone()),
        (false, Some(_)) => Err(ChatError::MalformedPrompt(
            "both messages and a legacy prompt were supplied".to_string(),
        )),
        (true, Some(prompt)) => parse_legacy_prompt(prompt),
        (true, None) => Err(ChatError::MalformedPrompt(
            "conversation is empty".to_string(),
        )),
    }
}

fn build_raw(
    request: &GenerationRequest,
    model: &ModelRef,
    mut options: GenerationOptions,
) -> Result<CompletionPayload> {
    if !request.messages.is_empty() {
        return Err(ChatError::MalformedPrompt(
            "raw mode takes a pre-formatted prompt, not messages".to_string(),
        ));
    }

    if request.mode == PayloadMode::Chat {
        return Err(ChatError::MalformedPrompt(
            "raw prompts are only accepted in completion mode".to_string(),
        ));
    }

    let prompt = request
        .prompt
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ChatError::MalformedPrompt("raw mode requires a prompt".to_string()))?;

    let stop = options.stop.take().filter(|stop| !stop.is_empty());
    if stop.is_none() {
        tracing::warn!(
            model = %model,
            "raw prompt without stop sequences, generation may run until the timeout"
        );
    }

    Ok(CompletionPayload {
        model: model.name().to_string(),
        prompt: prompt.to_string(),
        system: None,
        raw: true,
        stream: request.stream,
        stop,
        options,
    })
}

/// Completion body from a conversation
///
/// System messages go to `system`. A single remaining turn is sent as the
/// prompt; longer histories are rendered with the legacy template.
fn build_completion(
    messages: &[ConversationMessage],
    model: &ModelRef,
    stream: bool,
    options: GenerationOptions,
) -> Result<CompletionPayload> {
    let (system, turns): (Vec<_>, Vec<_>) = messages
        .iter()
        .cloned()
        .partition(|message| message.role() == Role::System);

    let prompt = match turns.as_slice() {
        [] => {
            return Err(ChatError::MalformedPrompt(
                "completion mode needs at least one user or assistant message".to_string(),
            ))
        }
        [single] => single.content().to_string(),
        many => render_legacy_prompt(many, true),
    };

    let system = (!system.is_empty()).then(|| {
        system
            .iter()
            .map(ConversationMessage::content)
            .collect::<Vec<_>>()
            .join("\n\n")
    });

    Ok(CompletionPayload {
        model: model.name().to_string(),
        prompt,
        system,
        raw: false,
        stream,
        stop: None,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn model() -> ModelRef {
        ModelRef::parse("qwen3:0.6b").unwrap()
    }

    fn build(request: &GenerationRequest) -> Result<Value> {
        build_payload(request, &model(), &GenerationOptions::default())?.to_value()
    }

    #[test]
    fn test_chat_payload_keeps_order_and_roles() {
        let request = GenerationRequest::chat(
            "qwen3:0.6b",
            vec![
                ConversationMessage::system("Always respond in markdown."),
                ConversationMessage::user("one"),
                ConversationMessage::user("two"),
                ConversationMessage::assistant("reply"),
                ConversationMessage::assistant("more"),
                ConversationMessage::user("three"),
            ],
        );

        assert_eq!(
            build(&request).unwrap(),
            json!({
                "model": "qwen3:0.6b",
                "messages": [
                    {"role": "system", "content": "Always respond in markdown."},
                    {"role": "user", "content": "one"},
                    {"role": "user", "content": "two"},
                    {"role": "assistant", "content": "reply"},
                    {"role": "assistant", "content": "more"},
                    {"role": "user", "content": "three"},
                ],
                "stream": false,
            })
        );
    }

    #[test]
    fn test_chat_payload_from_legacy_prompt() {
        let request = GenerationRequest::legacy(
            "qwen3:0.6b",
            "<|system|>You are helpful<|user|>Hi",
            PayloadMode::Chat,
        );

        let payload = build_payload(&request, &model(), &GenerationOptions::default()).unwrap();
        let Payload::Chat(chat) = payload else {
            panic!("Expected chat payload");
        };
        assert_eq!(
            chat.messages,
            vec![
                ConversationMessage::system("You are helpful"),
                ConversationMessage::user("Hi"),
            ]
        );
    }

    #[test]
    fn test_options_are_merged_with_defaults() {
        let defaults = GenerationOptions {
            temperature: Some(0.7),
            top_k: Some(50),
            ..GenerationOptions::default()
        };
        let request = GenerationRequest::chat("m", vec![ConversationMessage::user("hi")])
            .with_options(GenerationOptions {
                temperature: Some(0.2),
                ..GenerationOptions::default()
            })
            .with_stream(true);

        let value = build_payload(&request, &model(), &defaults)
            .unwrap()
            .to_value()
            .unwrap();
        assert_eq!(value["options"], json!({"temperature": 0.2f32, "top_k": 50}));
        assert_eq!(value["stream"], json!(true));
    }

    #[test]
    fn test_completion_single_turn() {
        let request = GenerationRequest::completion(
            "qwen3:0.6b",
            vec![
                ConversationMessage::system("Be brief."),
                ConversationMessage::user("Why is the sky blue?"),
            ],
        );

        assert_eq!(
            build(&request).unwrap(),
            json!({
                "model": "qwen3:0.6b",
                "prompt": "Why is the sky blue?",
                "system": "Be brief.",
                "stream": false,
            })
        );
    }

    #[test]
    fn test_completion_multi_turn_uses_template() {
        let request = GenerationRequest::completion(
            "qwen3:0.6b",
            vec![
                ConversationMessage::user("hi"),
                ConversationMessage::assistant("hello"),
                ConversationMessage::user("bye"),
            ],
        );

        let value = build(&request).unwrap();
        assert_eq!(
            value["prompt"],
            json!("<|user|>\nhi\n<|assistant|>\nhello\n<|user|>\nbye\n<|assistant|>\n")
        );
        assert!(value.get("system").is_none());
    }

    #[test]
    fn test_completion_requires_a_turn() {
        let request =
            GenerationRequest::completion("m", vec![ConversationMessage::system("only system")]);
        assert!(matches!(build(&request), Err(ChatError::MalformedPrompt(_))));
    }

    #[test]
    fn test_raw_payload_lifts_stop() {
        let prompt = "<|im_start|>user\nHi<|im_end|>\n<|im_start|>assistant\n";
        let request = GenerationRequest::raw("qwen3:0.6b", prompt).with_options(GenerationOptions {
            stop: Some(vec!["<|im_end|>".into()]),
            temperature: Some(0.5),
            ..GenerationOptions::default()
        });

        assert_eq!(
            build(&request).unwrap(),
            json!({
                "model": "qwen3:0.6b",
                "prompt": prompt,
                "raw": true,
                "stream": false,
                "stop": ["<|im_end|>"],
                "options": {"temperature": 0.5f32},
            })
        );
    }

    #[test]
    fn test_raw_prompt_is_not_parsed() {
        let request = GenerationRequest::raw("m", "<|user|>");
        let value = build(&request).unwrap();
        assert_eq!(value["prompt"], json!("<|user|>"));
    }

    #[test]
    fn test_raw_with_messages_is_rejected() {
        let mut request = GenerationRequest::raw("m", "prompt");
        request.messages.push(ConversationMessage::user("hi"));
        assert!(matches!(build(&request), Err(ChatError::MalformedPrompt(_))));
    }

    #[test]
    fn test_raw_in_chat_mode_is_rejected() {
        let mut request = GenerationRequest::raw("m", "prompt");
        request.mode = PayloadMode::Chat;
        assert!(matches!(build(&request), Err(ChatError::MalformedPrompt(_))));
    }

    #[test]
    fn test_raw_without_prompt_is_rejected() {
        let mut request = GenerationRequest::raw("m", "");
        assert!(build(&request).is_err());
        request.prompt = None;
        assert!(build(&request).is_err());
    }

    #[test]
    fn test_messages_and_legacy_prompt_is_rejected() {
        let mut request = GenerationRequest::chat("m", vec![ConversationMessage::user("hi")]);
        request.prompt = Some("<|user|>hi".into());
        assert!(matches!(build(&request), Err(ChatError::MalformedPrompt(_))));
    }

    #[test]
    fn test_empty_conversation_is_rejected() {
        let request = GenerationRequest::chat("m", Vec::new());
        assert!(matches!(build(&request), Err(ChatError::MalformedPrompt(_))));
    }

    #[test]
    fn test_malformed_legacy_prompt_is_rejected() {
        let request = GenerationRequest::legacy("m", "<|user|>", PayloadMode::Chat);
        assert!(matches!(build(&request), Err(ChatError::MalformedPrompt(_))));
    }

    #[test]
    fn test_payload_endpoint() {
        let chat = build_payload(
            &GenerationRequest::chat("m", vec![ConversationMessage::user("hi")]),
            &model(),
            &GenerationOptions::default(),
        )
        .unwrap();
        assert_eq!(chat.endpoint(), Endpoint::Chat);
        assert!(!chat.is_stream());

        let raw = build_payload(
            &GenerationRequest::raw("m", "p").with_stream(true),
            &model(),
            &GenerationOptions::default(),
        )
        .unwrap();
        assert_eq!(raw.endpoint(), Endpoint::Generate);
        assert!(raw.is_stream());
    }
}
