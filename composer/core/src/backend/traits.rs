//! Upstream Request Types and Transport Trait
//!
//! Types shared by every provider call, and the [`Transport`] seam that turns
//! one prepared [`UpstreamCall`] into an asynchronous byte-chunk source.
//!
//! # Design
//!
//! The core never talks HTTP directly. A [`Transport`] opens the connection,
//! applies timeouts and proxies, and hands back the raw body as a stream of
//! byte deliveries. Everything above it (decoding, classification,
//! composition) works on that stream alone, which is what lets tests replace
//! the network with a scripted transport.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of characters of an upstream error body kept in messages
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// Role of one chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// End-user turn
    User,
    /// Model turn
    Assistant,
}

/// One chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a message with an explicit role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Optional sampling parameters, forwarded only when set
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling mass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Frequency penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

/// One request to one upstream provider
///
/// Built once per call and not modified after it is handed to an adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamRequest {
    /// Conversation sent to the provider
    pub messages: Vec<ChatMessage>,
    /// Provider-side model identifier
    pub model: String,
    /// Sampling parameters
    pub sampling: SamplingParams,
    /// Upper bound on generated tokens, if any
    pub max_tokens_override: Option<u32>,
}

impl UpstreamRequest {
    /// Create a request for `model` with default sampling
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            sampling: SamplingParams::default(),
            max_tokens_override: None,
        }
    }

    /// Set sampling parameters
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the generated-token bound
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens_override = Some(max_tokens);
        self
    }
}

/// A fully prepared HTTP call: endpoint, headers and JSON body
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamCall {
    /// Provider name, for logs and error messages
    pub provider: String,
    /// Endpoint URL
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// JSON request body
    pub body: serde_json::Value,
}

/// Errors raised while opening or reading an upstream connection
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established or the request failed to send
    #[error("connection to {provider} failed: {message}")]
    Connect {
        /// Provider name
        provider: String,
        /// Underlying error text
        message: String,
    },

    /// The provider answered with a non-success HTTP status
    #[error("{provider} returned {status}: {body}")]
    Status {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// The body stream broke mid-response
    #[error("stream from {provider} interrupted: {message}")]
    Interrupted {
        /// Provider name
        provider: String,
        /// Underlying error text
        message: String,
    },

    /// The call timed out
    #[error("request to {provider} timed out")]
    Timeout {
        /// Provider name
        provider: String,
    },
}

/// Raw body of one upstream response, one item per transport delivery
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Asynchronous byte-chunk source
///
/// Implement this trait to plug a different transport under the composer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name (e.g., "http")
    fn name(&self) -> &str;

    /// Open the call and return its body as a stream of deliveries
    async fn open(&self, call: UpstreamCall) -> Result<ByteStream, TransportError>;
}

/// Truncate an upstream body so raw payloads are not echoed in full
pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let mut cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        cut.push_str("...");
        cut
    }
}
