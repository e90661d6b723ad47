//! Two-Phase Composition
//!
//! Phase one streams the reasoner and keeps its reasoning text. Phase two
//! sends the original conversation, with that reasoning folded in, to the
//! responder and streams its answer. Both halves come out as one ordered
//! sequence of [`ClassifiedEvent`]s.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

use super::prompt::responder_messages;
use crate::backend::{ChatMessage, SamplingParams, Transport, UpstreamRequest};
use crate::config::{ComposerConfig, ProviderConfig};
use crate::stream::{AdapterError, ClassifiedEvent, StreamAdapter};

/// Request-level composition errors
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The reasoning provider failed
    #[error("reasoner failed: {0}")]
    Reasoner(#[source] AdapterError),

    /// The answer provider failed
    #[error("responder failed: {0}")]
    Responder(#[source] AdapterError),

    /// The request cannot be composed
    #[error("composition error: {0}")]
    Composition(String),
}

/// One client request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatRequest {
    /// Conversation so far
    pub messages: Vec<ChatMessage>,
    /// Sampling parameters for the answer phase
    pub sampling: SamplingParams,
}

impl ChatRequest {
    /// Create a request with default sampling
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            sampling: SamplingParams::default(),
        }
    }

    /// Set sampling parameters
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Non-streaming composition result
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComposedResponse {
    /// Everything the reasoner produced before the phase boundary
    pub reasoning: String,
    /// The responder's answer
    pub content: String,
}

/// Ordered events for one composed request
pub type ComposedStream = BoxStream<'static, Result<ClassifiedEvent, ComposeError>>;

/// Per-request composition state
#[derive(Debug, Default)]
pub struct CompositionContext {
    reasoning: String,
    phase_switched: bool,
}

impl CompositionContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one phase-one event's text
    pub fn record(&mut self, event: &ClassifiedEvent) {
        self.reasoning.push_str(&event.text);
    }

    /// Reasoning collected so far
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Whether the phase boundary has been emitted
    #[must_use]
    pub fn phase_switched(&self) -> bool {
        self.phase_switched
    }

    /// Mark the switch to phase two
    ///
    /// Returns the boundary marker the first time only.
    pub fn switch_phase(&mut self) -> Option<ClassifiedEvent> {
        if self.phase_switched {
            return None;
        }
        self.phase_switched = true;
        Some(ClassifiedEvent::phase_boundary())
    }
}

/// Drives the reasoner and the responder for each request
#[derive(Clone)]
pub struct Composer {
    transport: Arc<dyn Transport>,
    reasoner: ProviderConfig,
    responder: ProviderConfig,
}

impl Composer {
    /// Create a composer from two provider configurations
    pub fn new(
        transport: Arc<dyn Transport>,
        reasoner: ProviderConfig,
        responder: ProviderConfig,
    ) -> Self {
        Self {
            transport,
            reasoner,
            responder,
        }
    }

    /// Create a composer from a resolved configuration
    pub fn from_config(transport: Arc<dyn Transport>, config: &ComposerConfig) -> Self {
        Self::new(
            transport,
            config.reasoner.clone(),
            config.responder.clone(),
        )
    }

    /// Reasoning provider configuration
    #[must_use]
    pub fn reasoner(&self) -> &ProviderConfig {
        &self.reasoner
    }

    /// Answer provider configuration
    #[must_use]
    pub fn responder(&self) -> &ProviderConfig {
        &self.responder
    }

    fn adapter(&self, provider: &ProviderConfig) -> StreamAdapter {
        StreamAdapter::new(
            Arc::clone(&self.transport),
            provider.endpoint(),
            provider.policy,
        )
    }

    /// Stream one composed answer
    ///
    /// Reasoning events are forwarded as they arrive, followed by exactly one
    /// phase-boundary marker and then the responder's content. A failure
    /// yields one terminal `Err` and ends the stream. Nothing is sent
    /// upstream until the stream is first polled, and dropping it cancels
    /// whichever upstream call is open.
    #[must_use]
    pub fn compose_stream(&self, request: ChatRequest) -> ComposedStream {
        let reasoner = self.adapter(&self.reasoner);
        let responder = self.adapter(&self.responder);
        let reasoner_model = self.reasoner.model.clone();
        let responder_model = self.responder.model.clone();

        let stream = async_stream::stream! {
            if request.messages.is_empty() {
                yield Err(ComposeError::Composition("no messages to compose".to_string()));
                return;
            }

            let mut context = CompositionContext::new();

            tracing::info!(
                provider = %reasoner.endpoint().name,
                model = %reasoner_model,
                "Starting reasoning phase"
            );
            let phase_one = UpstreamRequest::new(request.messages.clone(), reasoner_model);
            let mut reasoning = reasoner.into_stream(phase_one);
            while let Some(item) = reasoning.next().await {
                match item {
                    Ok(event) if event.is_content() => {
                        tracing::debug!(
                            boundary = event.is_phase_boundary,
                            "Reasoner reached content, ending reasoning phase"
                        );
                        break;
                    }
                    Ok(event) => {
                        context.record(&event);
                        yield Ok(event);
                    }
                    Err(e) => {
                        yield Err(ComposeError::Reasoner(e));
                        return;
                    }
                }
            }
            drop(reasoning);

            if let Some(boundary) = context.switch_phase() {
                tracing::info!(
                    reasoning_chars = context.reasoning().chars().count(),
                    "Reasoning phase complete"
                );
                yield Ok(boundary);
            }

            let messages = responder_messages(&request.messages, context.reasoning());
            let phase_two = UpstreamRequest::new(messages, responder_model)
                .with_sampling(request.sampling);

            tracing::info!(
                provider = %responder.endpoint().name,
                "Starting answer phase"
            );
            let mut answer = responder.into_stream(phase_two);
            while let Some(item) = answer.next().await {
                match item {
                    Ok(event) if event.is_content() && !event.is_phase_boundary => {
                        if !event.text.is_empty() {
                            yield Ok(event);
                        }
                    }
                    Ok(event) => {
                        tracing::trace!(phase = %event.phase, "Dropping responder non-content event");
                    }
                    Err(e) => {
                        yield Err(ComposeError::Responder(e));
                        return;
                    }
                }
            }

            tracing::debug!("Composition finished");
        };

        stream.boxed()
    }

    /// Compose one answer and return it whole
    ///
    /// # Errors
    ///
    /// Any reasoner, responder or composition failure fails the call with
    /// no partial text.
    pub async fn compose(&self, request: ChatRequest) -> Result<ComposedResponse, ComposeError> {
        let mut stream = self.compose_stream(request);
        let mut response = ComposedResponse::default();
        let mut answering = false;

        while let Some(item) = stream.next().await {
            let event = item?;
            if event.is_phase_boundary {
                answering = true;
            } else if answering {
                response.content.push_str(&event.text);
            } else {
                response.reasoning.push_str(&event.text);
            }
        }

        Ok(response)
    }
}
