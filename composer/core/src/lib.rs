//! Composer Core - Dual-Stream Reasoning Composition
//!
//! This crate streams a "reasoning" model and an "answer" model as one
//! response. The reasoner's thinking is forwarded as it arrives, then the
//! original conversation plus that thinking goes to the responder, whose
//! answer follows in the same stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Composer                               │
//! │                                                                  │
//! │   phase one                              phase two               │
//! │  ┌────────────────────────┐            ┌────────────────────────┐│
//! │  │  StreamAdapter         │  reasoning │  StreamAdapter         ││
//! │  │  (reasoner)            │ ─────────▶ │  (responder)           ││
//! │  │                        │   prompt   │                        ││
//! │  │  LineDecoder           │            │  LineDecoder           ││
//! │  │  DeltaClassifier       │            │  DeltaClassifier       ││
//! │  │   └ ThinkTagMachine    │            │                        ││
//! │  └───────────┬────────────┘            └───────────┬────────────┘│
//! │              │                                     │             │
//! └──────────────┼─────────────────────────────────────┼─────────────┘
//!                │           Transport (HTTP)          │
//!                ▼                                     ▼
//!          reasoning provider                   answer provider
//! ```
//!
//! # Key Types
//!
//! - [`Composer`]: Drives both providers for one request
//! - [`ClassifiedEvent`]: One piece of reasoning or answer text
//! - [`StreamAdapter`]: One upstream call as a lazy event stream
//! - [`Transport`]: Seam between the core and the network
//! - [`ComposerConfig`]: Resolved configuration for both providers
//! - [`ChunkEncoder`]: OpenAI-style SSE framing of composed events
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use composer_core::{load_config, ChatMessage, ChatRequest, Composer, HttpTransport};
//! use futures::StreamExt;
//!
//! let config = load_config()?;
//! let transport = Arc::new(HttpTransport::new(config.read_timeout, config.proxy.as_deref())?);
//! let composer = Composer::from_config(transport, &config);
//!
//! let mut events = composer.compose_stream(ChatRequest::new(vec![ChatMessage::user("1+1?")]));
//! while let Some(event) = events.next().await {
//!     let event = event?;
//!     print!("{}", event.text);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Request types, provider dialects and the HTTP transport
//! - [`stream`]: Line decoding, delta classification and think-tag inference
//! - [`compose`]: Two-phase orchestration
//! - [`config`]: TOML, environment and CLI configuration
//! - [`wire`]: OpenAI-compatible request parsing and response framing

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod compose;
pub mod config;
pub mod stream;
pub mod wire;

// Re-exports for convenience
pub use backend::{
    ByteStream, ChatMessage, Dialect, HttpTransport, ProviderEndpoint, Role, SamplingParams,
    Transport, TransportError, UpstreamCall, UpstreamRequest,
};
pub use compose::{ChatRequest, ComposeError, ComposedResponse, ComposedStream, Composer};
pub use stream::{
    AdapterError, ClassifiedEvent, ClassifierMode, EventStream, Phase, ReasoningPolicy,
    StreamAdapter,
};
pub use wire::{ChatCompletionRequest, ChunkEncoder};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ComposerConfig, ComposerToml,
    ConfigError, ConfigOverrides, ConfigSource, ProviderConfig,
};
