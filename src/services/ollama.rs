//! Ollama adapter
//!
//! Builds the payload for a [`GenerationRequest`], sends it over a
//! [`Transport`], normalizes the answer and separates reasoning from the
//! visible text. The adapter holds no per-call state, so one instance (or
//! its clones) can serve concurrent calls.

use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, TryStreamExt};

use crate::{
    config::{AdapterConfig, ModelRef},
    error::{ChatError, Result},
    messages::ConversationMessage,
};

use super::{
    request::{build_payload, Payload},
    response::{normalize, parse_envelope, parse_tags},
    streaming::{ChunkStream, NdjsonParser, StreamAccumulator},
    ByteStream, Endpoint, GenerationChunk, GenerationRequest, GenerationResponse, HttpTransport,
    ModelInfo, PayloadMode, Transport,
};

/// Client for a local Ollama daemon
#[derive(Clone)]
pub struct OllamaAdapter {
    transport: Arc<dyn Transport>,
    config: Arc<AdapterConfig>,
}

impl OllamaAdapter {
    /// Create an adapter talking HTTP to `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create an adapter over any transport
    #[must_use]
    pub fn with_transport(config: AdapterConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Model to use for a request; empty means the configured default
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConfigValidation`] if the identifier is not an
    /// Ollama model or no model is available at all
    pub fn resolve_model(&self, requested: &str) -> Result<ModelRef> {
        if !requested.trim().is_empty() {
            return ModelRef::parse(requested);
        }

        if self.config.default_model.trim().is_empty() {
            return Err(ChatError::ConfigValidation(
                "no model requested and no default_model configured".to_string(),
            ));
        }

        ModelRef::parse(&self.config.default_model)
    }

    /// Run one generation and return the normalized, reasoning-free answer
    ///
    /// Streaming requests are folded into a single response.
    ///
    /// # Errors
    ///
    /// - [`ChatError::MalformedPrompt`] if the request cannot be encoded
    /// - [`ChatError::UnsupportedMode`] for a streaming request while
    ///   streaming is disabled
    /// - [`ChatError::Transport`] on connection, timeout or HTTP failures
    /// - [`ChatError::ResponseParse`], [`ChatError::IncompleteResponse`] or
    ///   [`ChatError::Backend`] for bad answers
    /// - [`ChatError::UnterminatedReasoningBlock`] if the text opens a
    ///   reasoning block it never closes
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let payload = self.prepare(request)?;
        let mode = payload.mode();
        let started = Instant::now();

        let chunk = if payload.is_stream() {
            let mut chunks = self.open_stream(&payload).await?;
            let mut accumulator = StreamAccumulator::new(mode);
            while let Some(chunk) = chunks.try_next().await? {
                if accumulator.push(chunk) {
                    break;
                }
            }
            tracing::debug!(chunks = accumulator.chunk_count(), "stream folded");
            accumulator.finish()?
        } else {
            let body = self.transport.post(payload.endpoint(), &payload.to_value()?).await?;
            normalize(mode, &collect_body(body).await?)?
        };

        let response = GenerationResponse::try_from(chunk)?;

        tracing::info!(
            endpoint = %payload.endpoint(),
            model = %response.model,
            stream = payload.is_stream(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            has_reasoning = response.reasoning.is_some(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "generation finished"
        );

        Ok(response)
    }

    /// Stream the chunks of a generation as they arrive
    ///
    /// The request is sent with `stream=true` whatever its own flag says.
    /// Chunk text is passed through untouched; reasoning markers may span
    /// chunks, so sanitizing is left to whoever assembles the text. The
    /// stream ends after the `done=true` chunk, or with
    /// [`ChatError::IncompleteResponse`] if the body ends without one.
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate) for everything up to the
    /// response headers
    pub async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        let request = request.clone().with_stream(true);
        let payload = self.prepare(&request)?;
        self.open_stream(&payload).await
    }

    /// Convenience wrapper: optional system prompt plus one user turn, chat mode
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate)
    pub async fn generate_text(&self, system_prompt: Option<&str>, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(ConversationMessage::system(system));
        }
        messages.push(ConversationMessage::user(prompt));

        let request = GenerationRequest::chat(String::new(), messages);
        Ok(self.generate(&request).await?.text)
    }

    /// Models installed on the daemon
    ///
    /// # Errors
    ///
    /// Returns a transport error if the daemon is unreachable, or
    /// [`ChatError::ResponseParse`] if the listing cannot be decoded
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let body = self.transport.get(Endpoint::Tags).await?;
        let models = parse_tags(&body)?;
        tracing::debug!(count = models.len(), "listed models");
        Ok(models)
    }

    fn prepare(&self, request: &GenerationRequest) -> Result<Payload> {
        if request.stream && !self.config.allow_streaming {
            return Err(ChatError::UnsupportedMode(
                "streaming is disabled (allow_streaming = false)".to_string(),
            ));
        }

        let model = self.resolve_model(&request.model)?;
        let payload = build_payload(request, &model, &self.config.options)?;

        tracing::debug!(
            endpoint = %payload.endpoint(),
            model = %model,
            raw = request.raw,
            stream = payload.is_stream(),
            "built payload"
        );

        Ok(payload)
    }

    async fn open_stream(&self, payload: &Payload) -> Result<ChunkStream> {
        let body = self.transport.post(payload.endpoint(), &payload.to_value()?).await?;
        Ok(Box::pin(decode_stream(payload.mode(), body)))
    }
}

impl std::fmt::Debug for OllamaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaAdapter")
            .field("base_url", &self.config.base_url)
            .field("default_model", &self.config.default_model)
            .finish_non_exhaustive()
    }
}

async fn collect_body(mut body: ByteStream) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    while let Some(bytes) = body.try_next().await? {
        buffer.extend_from_slice(&bytes);
    }
    Ok(buffer)
}

/// Decode an NDJSON body into chunks, stopping at the final one
fn decode_stream(
    mode: PayloadMode,
    mut body: ByteStream,
) -> impl futures::Stream<Item = Result<GenerationChunk>> + Send + 'static {
    async_stream::try_stream! {
        let mut parser = NdjsonParser::new();
        let mut done = false;

        while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            for line in parser.parse_chunk(&bytes) {
                let chunk = parse_envelope(mode, &line)?;
                done = chunk.done;
                yield chunk;
                if done {
                    break;
                }
            }
            if done {
                if parser.has_pending() {
                    tracing::debug!(endpoint = %mode.endpoint(), "ignoring bytes after the final chunk");
                }
                break;
            }
        }

        if !done {
            // last line without a trailing newline
            if let Some(line) = parser.flush() {
                let chunk = parse_envelope(mode, &line)?;
                done = chunk.done;
                yield chunk;
            }
        }

        if !done {
            Err::<(), _>(ChatError::IncompleteResponse {
                endpoint: mode.endpoint().path().to_string(),
            })?;
        }
    }
}
