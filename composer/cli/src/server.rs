//! OpenAI-Compatible HTTP Endpoint
//!
//! - `POST /v1/chat/completions`: `chat.completion.chunk` SSE frames, or a
//!   single `chat.completion` object when the request sets `stream: false`
//! - `GET /v1/models`: the model name clients ask for
//!
//! A client that disconnects drops its response body, which drops the
//! composed stream and any upstream call it still has open.

use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use tracing::{error, info};

use composer_core::wire::DEFAULT_MODEL_NAME;
use composer_core::{ChatCompletionRequest, ChunkEncoder, ComposeError, Composer};

/// Routes served by the composer
pub fn build_router(composer: Composer) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .with_state(composer)
}

/// Serve until Ctrl+C
pub async fn serve(composer: Composer, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "Composer listening");

    axum::serve(listener, build_router(composer))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down");
        })
        .await
        .context("HTTP server failed")
}

async fn list_models() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{
            "id": DEFAULT_MODEL_NAME,
            "object": "model",
            "owned_by": "reasoning-composer",
        }],
    }))
}

async fn chat_completions(State(composer): State<Composer>, body: String) -> Response {
    let request = match ChatCompletionRequest::from_json(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Rejected request body");
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid request body: {e}"));
        }
    };

    let encoder = ChunkEncoder::new(request.model_name());
    if request.stream {
        info!(id = %encoder.id(), "Streaming response");
        return sse_response(sse_frames(composer, request, encoder));
    }

    info!(id = %encoder.id(), "Composing response");
    match composer.compose(request.into_chat_request()).await {
        Ok(response) => match encoder.completion(&response) {
            Ok(completion) => Json(completion).into_response(),
            Err(e) => {
                error!(error = %e, "Failed to encode completion");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
        },
        Err(e) => {
            error!(error = %e, "Composition failed");
            error_response(status_for(&e), &e.to_string())
        }
    }
}

/// Encode the composed events, then `[DONE]`
///
/// A failure becomes one error frame and ends the stream.
fn sse_frames(
    composer: Composer,
    request: ChatCompletionRequest,
    encoder: ChunkEncoder,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut events = composer.compose_stream(request.into_chat_request());
        while let Some(item) = events.next().await {
            let (frame, terminal) = match item {
                Ok(event) => (encoder.encode(&event), false),
                Err(e) => {
                    error!(error = %e, "Composition failed");
                    (encoder.error(&e.to_string()), true)
                }
            };
            match frame {
                Ok(frame) => yield Ok::<Bytes, Infallible>(Bytes::from(frame)),
                Err(e) => {
                    error!(error = %e, "Failed to encode chunk");
                    break;
                }
            }
            if terminal {
                break;
            }
        }
        yield Ok::<Bytes, Infallible>(Bytes::from(encoder.done()));
    }
}

fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}

fn status_for(err: &ComposeError) -> StatusCode {
    match err {
        ComposeError::Composition(_) => StatusCode::BAD_REQUEST,
        ComposeError::Reasoner(_) | ComposeError::Responder(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "error": {
            "message": message,
            "type": "api_error",
            "code": "invalid_request_error",
        }
    });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::Request;
    use composer_core::{
        ByteStream, Dialect, ProviderConfig, Transport, TransportError, UpstreamCall,
    };
    use tower::ServiceExt;

    /// Answers each provider with canned SSE text; unknown providers refuse
    struct Canned(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl Transport for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn open(&self, call: UpstreamCall) -> Result<ByteStream, TransportError> {
            match self.0.get(call.provider.as_str()) {
                Some(text) => {
                    let chunk: Result<Bytes, TransportError> = Ok(Bytes::from_static(text.as_bytes()));
                    Ok(futures::stream::iter(vec![chunk]).boxed())
                }
                None => Err(TransportError::Connect {
                    provider: call.provider,
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    const REASONER: &str = "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"six sevens\"}}]}\n\n\
                            data: {\"choices\":[{\"delta\":{\"content\":\"42\"}}]}\n\n\
                            data: [DONE]\n\n";

    const RESPONDER: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"42\"}}]}\n\n\
                             data: [DONE]\n\n";

    fn router(providers: &[(&'static str, &'static str)]) -> Router {
        let transport: Arc<dyn Transport> = Arc::new(Canned(providers.iter().copied().collect()));
        let mut reasoner = ProviderConfig::default_reasoner();
        reasoner.api_key = "k".to_string();
        let mut responder = ProviderConfig::default_responder();
        responder.api_key = "k".to_string();
        responder.dialect = Dialect::OpenAi;
        build_router(Composer::new(transport, reasoner, responder))
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_list_models() {
        let resp = router(&[])
            .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["object"], "list");
        assert_eq!(json["data"][0]["id"], DEFAULT_MODEL_NAME);
    }

    #[tokio::test]
    async fn test_streaming_chat() {
        let app = router(&[("deepseek", REASONER), ("claude", RESPONDER)]);
        let resp = app
            .oneshot(post_chat(r#"{"messages":[{"role":"user","content":"6 x 7?"}]}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");

        let text = body_text(resp).await;
        let frames: Vec<&str> = text.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 4);
        assert!(frames[0].contains("\"reasoning_content\":\"six sevens\""));
        assert!(frames[2].contains("\"content\":\"42\""));
        assert_eq!(frames[3], "data: [DONE]");
    }

    #[tokio::test]
    async fn test_streaming_failure_ends_with_error_frame() {
        let app = router(&[("claude", RESPONDER)]);
        let resp = app
            .oneshot(post_chat(r#"{"messages":[{"role":"user","content":"q"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let text = body_text(resp).await;
        let frames: Vec<&str> = text.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"error\""));
        assert!(frames[0].contains("connection refused"));
        assert_eq!(frames[1], "data: [DONE]");
    }

    #[tokio::test]
    async fn test_non_streaming_chat() {
        let app = router(&[("deepseek", REASONER), ("claude", RESPONDER)]);
        let resp = app
            .oneshot(post_chat(
                r#"{"model":"mine","stream":false,"messages":[{"role":"user","content":"q"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["model"], "mine");
        assert_eq!(json["choices"][0]["message"]["reasoning_content"], "six sevens");
        assert_eq!(json["choices"][0]["message"]["content"], "42");
    }

    #[tokio::test]
    async fn test_non_streaming_upstream_failure() {
        let app = router(&[("deepseek", REASONER)]);
        let resp = app
            .oneshot(post_chat(r#"{"stream":false,"messages":[{"role":"user","content":"q"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        let message = json["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("responder failed"), "{message}");
    }

    #[tokio::test]
    async fn test_bad_body_rejected() {
        let resp = router(&[])
            .oneshot(post_chat("{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid request body"));
    }

    #[tokio::test]
    async fn test_empty_conversation_is_bad_request() {
        let resp = router(&[])
            .oneshot(post_chat(r#"{"stream":false,"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
