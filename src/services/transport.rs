//! HTTP transport to the daemon
//!
//! One `reqwest` client per transport, built with the configured connect and
//! total timeouts. No retries: every failure is classified and returned.

use std::error::Error as StdError;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::Value;

use crate::{
    config::AdapterConfig,
    error::{truncate_body, ChatError, Result, TransportErrorKind},
};

use super::{ByteStream, Endpoint, Transport};

/// `reqwest`-backed [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: AdapterConfig,
}

impl HttpTransport {
    /// Create a transport for the configured daemon
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &AdapterConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| ChatError::ConfigValidation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        self.config.endpoint_url(endpoint.path())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, endpoint: Endpoint, payload: &Value) -> Result<ByteStream> {
        let url = self.url(endpoint);
        let started = Instant::now();

        tracing::debug!(url = %url, "sending request");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| classify(endpoint, &e))?;

        let response = check_status(endpoint, response).await?;

        tracing::debug!(
            url = %url,
            status = response.status().as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "response headers received"
        );

        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify(endpoint, &e)));

        Ok(Box::pin(body))
    }

    async fn get(&self, endpoint: Endpoint) -> Result<Bytes> {
        let url = self.url(endpoint);
        tracing::debug!(url = %url, "sending request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify(endpoint, &e))?;

        check_status(endpoint, response)
            .await?
            .bytes()
            .await
            .map_err(|e| classify(endpoint, &e))
    }
}

/// Turn a non-2xx response into a transport error carrying the body
async fn check_status(endpoint: Endpoint, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_message(&body).unwrap_or(body);

    tracing::warn!(endpoint = %endpoint, status = status.as_u16(), detail = %detail, "daemon returned an error status");

    Err(ChatError::Transport {
        endpoint: endpoint.path().to_string(),
        kind: TransportErrorKind::HttpStatus(status.as_u16()),
        detail: truncate_body(&detail),
    })
}

/// The daemon reports failures as `{"error": "..."}`
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(String::from)
}

fn classify(endpoint: Endpoint, error: &reqwest::Error) -> ChatError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::ConnectionRefused
    } else if let Some(status) = error.status() {
        TransportErrorKind::HttpStatus(status.as_u16())
    } else {
        TransportErrorKind::Other
    };

    ChatError::Transport {
        endpoint: endpoint.path().to_string(),
        kind,
        detail: error_chain(error),
    }
}

/// Error message including its sources (`reqwest` keeps the cause there)
fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
