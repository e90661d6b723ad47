//! Provider Dialects
//!
//! Request construction for the two upstream wire shapes the composer speaks:
//!
//! - **openai**: `/v1/chat/completions` with bearer auth. Used by DeepSeek,
//!   SiliconFlow, OpenRouter and most OpenAI-compatible gateways.
//! - **anthropic**: `/v1/messages` with `x-api-key` auth; system messages are
//!   lifted into the top-level `system` field and `max_tokens` is mandatory.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::traits::{Role, UpstreamCall, UpstreamRequest};

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` sent to Anthropic when the request does not bound it
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 8192;

/// Upstream wire shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// OpenAI chat-completions streaming
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages streaming
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "oneapi" | "openrouter" | "openai-compatible" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(format!("unknown provider dialect: {other}")),
        }
    }
}

/// Where and how to reach one provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEndpoint {
    /// Provider name, used in logs and errors
    pub name: String,
    /// Wire shape
    pub dialect: Dialect,
    /// Full endpoint URL
    pub api_url: String,
    /// API key
    pub api_key: String,
}

impl ProviderEndpoint {
    /// Create an endpoint
    pub fn new(
        name: impl Into<String>,
        dialect: Dialect,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dialect,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build the streaming HTTP call for `request`
    #[must_use]
    pub fn build_call(&self, request: &UpstreamRequest) -> UpstreamCall {
        let (headers, body) = match self.dialect {
            Dialect::OpenAi => (self.openai_headers(), openai_body(request)),
            Dialect::Anthropic => (self.anthropic_headers(), anthropic_body(request)),
        };

        UpstreamCall {
            provider: self.name.clone(),
            url: self.api_url.clone(),
            headers,
            body,
        }
    }

    fn openai_headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "text/event-stream".to_string()),
        ]
    }

    fn anthropic_headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), self.api_key.clone()),
            (
                "anthropic-version".to_string(),
                ANTHROPIC_VERSION.to_string(),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "text/event-stream".to_string()),
        ]
    }
}

fn openai_body(request: &UpstreamRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": request.messages,
        "stream": true,
    });

    let sampling = &request.sampling;
    if let Some(temperature) = sampling.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    if let Some(top_p) = sampling.top_p {
        body["top_p"] = serde_json::json!(top_p);
    }
    if let Some(penalty) = sampling.presence_penalty {
        body["presence_penalty"] = serde_json::json!(penalty);
    }
    if let Some(penalty) = sampling.frequency_penalty {
        body["frequency_penalty"] = serde_json::json!(penalty);
    }
    if let Some(max_tokens) = request.max_tokens_override {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }

    body
}

fn anthropic_body(request: &UpstreamRequest) -> serde_json::Value {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let messages: Vec<_> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();

    let mut body = serde_json::json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_tokens_override.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
        "stream": true,
    });

    if !system.is_empty() {
        body["system"] = serde_json::json!(system.join("\n\n"));
    }

    // Anthropic has no presence/frequency penalties
    if let Some(temperature) = request.sampling.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    if let Some(top_p) = request.sampling.top_p {
        body["top_p"] = serde_json::json!(top_p);
    }

    body
}
