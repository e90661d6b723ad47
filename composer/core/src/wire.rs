//! OpenAI-Compatible Wire Framing
//!
//! Parses the incoming `chat/completions` body and renders composed events
//! back out as `chat.completion.chunk` server-sent events, or as a single
//! `chat.completion` object when the client did not ask for a stream.

use serde::{Deserialize, Serialize};

use crate::backend::{ChatMessage, Role, SamplingParams};
use crate::compose::{ChatRequest, ComposedResponse};
use crate::stream::{ClassifiedEvent, Phase, DONE_SENTINEL};

/// Incoming `chat/completions` request body
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatCompletionRequest {
    /// Client-facing model name, echoed back in responses
    #[serde(default)]
    pub model: Option<String>,

    /// Conversation
    pub messages: Vec<ChatMessage>,

    /// Whether to stream the answer
    #[serde(default = "default_stream")]
    pub stream: bool,

    /// Sampling parameters
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

fn default_stream() -> bool {
    true
}

impl ChatCompletionRequest {
    /// Parse a request body
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body is not a valid request.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Model name to echo back
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL_NAME)
    }

    /// Convert into an orchestrator request
    #[must_use]
    pub fn into_chat_request(self) -> ChatRequest {
        ChatRequest::new(self.messages).with_sampling(self.sampling)
    }
}

/// Model name reported when the client sent none
pub const DEFAULT_MODEL_NAME: &str = "deepclaude";

#[derive(Serialize)]
struct ChunkDelta<'a> {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<&'a str>,
    content: &'a str,
}

#[derive(Serialize)]
struct ChunkChoice<'a> {
    index: u32,
    delta: ChunkDelta<'a>,
}

#[derive(Serialize)]
struct Chunk<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    choices: [ChunkChoice<'a>; 1],
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    code: &'static str,
}

#[derive(Serialize)]
struct ErrorChunk<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: Role,
    content: &'a str,
    reasoning_content: &'a str,
}

#[derive(Serialize)]
struct CompletionChoice<'a> {
    index: u32,
    message: CompletionMessage<'a>,
    finish_reason: &'static str,
}

#[derive(Serialize)]
struct Completion<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    choices: [CompletionChoice<'a>; 1],
}

/// Renders one response's events as SSE frames
///
/// Every frame of one response shares the same id and creation time.
#[derive(Clone, Debug)]
pub struct ChunkEncoder {
    id: String,
    model: String,
    created: i64,
}

impl ChunkEncoder {
    /// Create an encoder for one response
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
        }
    }

    /// Completion id shared by every frame
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Render one event as a `data:` frame
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the chunk cannot be serialized.
    pub fn encode(&self, event: &ClassifiedEvent) -> Result<String, serde_json::Error> {
        let delta = match event.phase {
            Phase::Reasoning | Phase::Passthrough => ChunkDelta {
                role: Role::Assistant,
                reasoning_content: Some(event.text.as_str()),
                content: "",
            },
            Phase::Content => ChunkDelta {
                role: Role::Assistant,
                reasoning_content: None,
                content: &event.text,
            },
        };
        let chunk = Chunk {
            id: &self.id,
            object: "chat.completion.chunk",
            created: self.created,
            model: &self.model,
            choices: [ChunkChoice { index: 0, delta }],
        };
        frame(&chunk)
    }

    /// Render a terminal error as a `data:` frame
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the chunk cannot be serialized.
    pub fn error(&self, message: &str) -> Result<String, serde_json::Error> {
        let chunk = ErrorChunk {
            id: &self.id,
            object: "chat.completion.chunk",
            created: self.created,
            model: &self.model,
            error: ErrorBody {
                message,
                kind: "api_error",
                code: "invalid_request_error",
            },
        };
        frame(&chunk)
    }

    /// The final `[DONE]` frame
    #[must_use]
    pub fn done(&self) -> String {
        format!("data: {DONE_SENTINEL}\n\n")
    }

    /// Render a whole non-streaming response
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the completion cannot be serialized.
    pub fn completion(
        &self,
        response: &ComposedResponse,
    ) -> Result<serde_json::Value, serde_json::Error> {
        let completion = Completion {
            id: &self.id,
            object: "chat.completion",
            created: self.created,
            model: &self.model,
            choices: [CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: Role::Assistant,
                    content: &response.content,
                    reasoning_content: &response.reasoning,
                },
                finish_reason: "stop",
            }],
        };
        serde_json::to_value(&completion)
    }
}

fn frame<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(format!("data: {json}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn payload(frame: Result<String, serde_json::Error>) -> Value {
        let frame = frame.unwrap();
        let body = frame
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("framed as SSE");
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_parse_request_defaults() {
        let request = ChatCompletionRequest::from_json(
            r#"{"messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();

        assert!(request.stream);
        assert_eq!(request.model_name(), DEFAULT_MODEL_NAME);
        assert_eq!(request.sampling, SamplingParams::default());
    }

    #[test]
    fn test_parse_request_sampling() {
        let request = ChatCompletionRequest::from_json(
            r#"{"model":"deepclaude","stream":false,"temperature":0.3,"top_p":0.9,
                "messages":[{"role":"system","content":"s"},{"role":"user","content":"q"}]}"#,
        )
        .unwrap();

        assert!(!request.stream);
        assert_eq!(request.sampling.temperature, Some(0.3));
        assert_eq!(request.sampling.top_p, Some(0.9));
        assert_eq!(request.sampling.presence_penalty, None);

        let chat = request.into_chat_request();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1], ChatMessage::user("q"));
        assert_eq!(chat.sampling.temperature, Some(0.3));
    }

    #[test]
    fn test_parse_request_rejects_unknown_role() {
        let result = ChatCompletionRequest::from_json(
            r#"{"messages":[{"role":"wizard","content":"hi"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_reasoning() {
        let encoder = ChunkEncoder::new("deepclaude");
        let value = payload(encoder.encode(&ClassifiedEvent::reasoning("hmm")));

        assert_eq!(value["object"], "chat.completion.chunk");
        assert_eq!(value["model"], "deepclaude");
        assert_eq!(value["id"], encoder.id());
        assert_eq!(
            value["choices"][0]["delta"],
            json!({"role": "assistant", "reasoning_content": "hmm", "content": ""})
        );
    }

    #[test]
    fn test_encode_content_and_boundary() {
        let encoder = ChunkEncoder::new("m");

        let content = payload(encoder.encode(&ClassifiedEvent::content("42")));
        assert_eq!(
            content["choices"][0]["delta"],
            json!({"role": "assistant", "content": "42"})
        );

        let boundary = payload(encoder.encode(&ClassifiedEvent::phase_boundary()));
        assert_eq!(
            boundary["choices"][0]["delta"],
            json!({"role": "assistant", "content": ""})
        );
    }

    #[test]
    fn test_frames_share_id() {
        let encoder = ChunkEncoder::new("m");
        let a = payload(encoder.encode(&ClassifiedEvent::reasoning("a")));
        let b = payload(encoder.encode(&ClassifiedEvent::content("b")));
        assert_eq!(a["id"], b["id"]);
        assert_eq!(a["created"], b["created"]);
        assert!(encoder.id().starts_with("chatcmpl-"));
    }

    #[test]
    fn test_error_and_done() {
        let encoder = ChunkEncoder::new("m");
        let value = payload(encoder.error("reasoner failed: boom"));

        assert_eq!(
            value["error"],
            json!({
                "message": "reasoner failed: boom",
                "type": "api_error",
                "code": "invalid_request_error"
            })
        );
        assert_eq!(encoder.done(), "data: [DONE]\n\n");
    }

    #[test]
    fn test_every_frame_is_complete_sse() {
        let encoder = ChunkEncoder::new("m");
        for frame in [
            encoder.encode(&ClassifiedEvent::passthrough("<think>x</think>")).unwrap(),
            encoder.error("responder failed: \"quoted\"\nline").unwrap(),
        ] {
            assert!(frame.starts_with("data: {"));
            assert!(frame.ends_with("}\n\n"));
            assert_eq!(frame.matches("\n\n").count(), 1);
        }
    }

    #[test]
    fn test_completion_object() {
        let encoder = ChunkEncoder::new("m");
        let value = encoder
            .completion(&ComposedResponse {
                reasoning: "because".to_string(),
                content: "42".to_string(),
            })
            .unwrap();

        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(
            value["choices"][0]["message"],
            json!({"role": "assistant", "content": "42", "reasoning_content": "because"})
        );
    }
}
