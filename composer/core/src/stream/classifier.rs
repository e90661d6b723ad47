//! Delta Classifier
//!
//! Converts one decoded line into zero or more [`ClassifiedEvent`]s.
//!
//! Provider payloads are parsed here and nowhere else: each dialect's JSON is
//! reduced to a [`Delta`] (structured reasoning text, content text), and the
//! configured [`ClassifierMode`] decides how that delta is classified.
//!
//! - **Native**: a non-empty reasoning field is reasoning; otherwise a
//!   non-empty content field is content. The field switch is the phase
//!   boundary, so no synthetic marker is emitted.
//! - **Tag inference**: only content text is used, and the
//!   [`ThinkTagMachine`] infers reasoning from inline markers.
//!
//! The outcome of every line is an explicit [`LineOutcome`]; malformed lines
//! are logged and skipped rather than aborting the stream.

use serde::Deserialize;
use thiserror::Error;

use super::decoder::DecodedLine;
use super::think::ThinkTagMachine;
use super::types::{ClassifiedEvent, ClassifierMode};
use crate::backend::{Dialect, MAX_ERROR_BODY_CHARS};

/// The upstream sent an error payload inside the stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("upstream reported an error: {message}")]
pub struct UpstreamProtocolError {
    /// Human-readable upstream message
    pub message: String,
}

/// Provider-neutral content of one upstream event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
    /// Structured reasoning text
    pub reasoning: Option<String>,
    /// Answer text
    pub content: Option<String>,
}

/// What the adapter should do with one line
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Forward these events, in order
    Emit(Vec<ClassifiedEvent>),
    /// Nothing to forward (keep-alive, control event, malformed line)
    Skip,
    /// The upstream signalled end of stream
    Done,
    /// The upstream reported an error; the stream must end
    Fatal(UpstreamProtocolError),
}

/// Per-dialect parse result
#[derive(Debug, PartialEq, Eq)]
enum Extracted {
    Delta(Delta),
    Stop,
    Error(String),
    KeepAlive,
}

/// Classifier for one upstream stream
#[derive(Debug)]
pub struct DeltaClassifier {
    dialect: Dialect,
    mode: ClassifierMode,
    think: ThinkTagMachine,
    in_reasoning: bool,
}

impl DeltaClassifier {
    /// Create a classifier; `mode` is fixed for its lifetime
    #[must_use]
    pub fn new(dialect: Dialect, mode: ClassifierMode) -> Self {
        Self {
            dialect,
            mode,
            think: ThinkTagMachine::new(),
            in_reasoning: false,
        }
    }

    /// Classification mode
    #[must_use]
    pub fn mode(&self) -> ClassifierMode {
        self.mode
    }

    /// Classify one decoded line
    pub fn classify_line(&mut self, line: DecodedLine) -> LineOutcome {
        let payload = match line {
            DecodedLine::Done => return LineOutcome::Done,
            DecodedLine::Event(name) => {
                tracing::trace!(event = %name, "Stream event");
                return LineOutcome::Skip;
            }
            DecodedLine::Data(payload) => payload,
        };

        let extracted = match self.dialect {
            Dialect::OpenAi => extract_openai(&payload),
            Dialect::Anthropic => extract_anthropic(&payload),
        };

        match extracted {
            Ok(Extracted::Delta(delta)) => self.classify_delta(delta),
            Ok(Extracted::KeepAlive) => LineOutcome::Skip,
            Ok(Extracted::Stop) => LineOutcome::Done,
            Ok(Extracted::Error(message)) => {
                tracing::error!(dialect = %self.dialect, message = %message, "Upstream error event");
                LineOutcome::Fatal(UpstreamProtocolError { message })
            }
            Err(e) => {
                tracing::warn!(dialect = %self.dialect, error = %e, "Skipping malformed stream line");
                LineOutcome::Skip
            }
        }
    }

    /// Classify one provider-neutral delta
    pub fn classify_delta(&mut self, delta: Delta) -> LineOutcome {
        match self.mode {
            ClassifierMode::Native => self.classify_native(delta),
            ClassifierMode::TagInference => self.classify_tagged(delta),
        }
    }

    fn classify_native(&mut self, delta: Delta) -> LineOutcome {
        if let Some(reasoning) = delta.reasoning.filter(|r| !r.is_empty()) {
            tracing::debug!(len = reasoning.len(), "Reasoning fragment");
            self.in_reasoning = true;
            return LineOutcome::Emit(vec![ClassifiedEvent::reasoning(reasoning)]);
        }

        match delta.content.filter(|c| !c.is_empty()) {
            Some(content) => {
                if std::mem::take(&mut self.in_reasoning) {
                    tracing::info!("Native reasoning finished, content started");
                }
                LineOutcome::Emit(vec![ClassifiedEvent::content(content)])
            }
            None => LineOutcome::Skip,
        }
    }

    fn classify_tagged(&mut self, delta: Delta) -> LineOutcome {
        let Some(content) = delta.content.filter(|c| !c.is_empty()) else {
            return LineOutcome::Skip;
        };

        let events = self.think.push(&content);
        if events.is_empty() {
            return LineOutcome::Skip;
        }
        if events.iter().any(|e| e.is_phase_boundary) {
            tracing::info!("Inline reasoning finished, content started");
        }
        LineOutcome::Emit(events)
    }

    /// Flush text held back by tag inference at end of stream
    pub fn finish(&mut self) -> Vec<ClassifiedEvent> {
        match self.mode {
            ClassifierMode::Native => Vec::new(),
            ClassifierMode::TagInference => self.think.finish(),
        }
    }
}

// ============================================================================
// OpenAI dialect
// ============================================================================

#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: Option<OpenAiDelta>,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    reasoning_content: Option<String>,
    /// Spelling used by some gateways
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

fn extract_openai(payload: &str) -> Result<Extracted, serde_json::Error> {
    let chunk: OpenAiChunk = serde_json::from_str(payload)?;

    if let Some(error) = chunk.error.filter(|e| !e.is_null()) {
        return Ok(Extracted::Error(error_message(&error)));
    }

    let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) else {
        return Ok(Extracted::KeepAlive);
    };

    Ok(Extracted::Delta(Delta {
        reasoning: delta.reasoning_content.or(delta.reasoning),
        content: delta.content,
    }))
}

// ============================================================================
// Anthropic dialect
// ============================================================================

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockDelta {
        delta: AnthropicDelta,
    },
    MessageStop,
    Error {
        error: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

fn extract_anthropic(payload: &str) -> Result<Extracted, serde_json::Error> {
    let event: AnthropicEvent = serde_json::from_str(payload)?;

    Ok(match event {
        AnthropicEvent::ContentBlockDelta {
            delta: AnthropicDelta::TextDelta { text },
        } => Extracted::Delta(Delta {
            reasoning: None,
            content: Some(text),
        }),
        AnthropicEvent::ContentBlockDelta {
            delta: AnthropicDelta::ThinkingDelta { thinking },
        } => Extracted::Delta(Delta {
            reasoning: Some(thinking),
            content: None,
        }),
        AnthropicEvent::MessageStop => Extracted::Stop,
        AnthropicEvent::Error { error } => Extracted::Error(error_message(&error)),
        AnthropicEvent::ContentBlockDelta {
            delta: AnthropicDelta::Other,
        }
        | AnthropicEvent::Other => Extracted::KeepAlive,
    })
}

/// Pull a readable message out of an upstream error object
fn error_message(error: &serde_json::Value) -> String {
    let message = error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| error.to_string(), str::to_string);
    message.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
