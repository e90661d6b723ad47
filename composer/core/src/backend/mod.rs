//! LLM Backend Integration
//!
//! Request types, provider dialects and the transport seam between the
//! composer and the network.
//!
//! # Available Dialects
//!
//! - **openai**: OpenAI-compatible chat completions (DeepSeek, gateways)
//! - **anthropic**: Anthropic messages API
//!
//! # Usage
//!
//! ```ignore
//! use composer_core::backend::{ChatMessage, Dialect, HttpTransport, ProviderEndpoint, Transport, UpstreamRequest};
//!
//! let transport = HttpTransport::new(std::time::Duration::from_secs(120), None)?;
//! let endpoint = ProviderEndpoint::new("deepseek", Dialect::OpenAi, url, key);
//! let request = UpstreamRequest::new(vec![ChatMessage::user("Hello!")], "deepseek-reasoner");
//! let body = transport.open(endpoint.build_call(&request)).await?;
//! ```

mod dialect;
mod http;
mod traits;

pub use dialect::{Dialect, ProviderEndpoint, ANTHROPIC_DEFAULT_MAX_TOKENS, ANTHROPIC_VERSION};
pub use http::{HttpTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use traits::{
    ByteStream, ChatMessage, Role, SamplingParams, Transport, TransportError, UpstreamCall,
    UpstreamRequest, MAX_ERROR_BODY_CHARS,
};
