//! Stream Adapter
//!
//! Owns one upstream connection. Opens it through a [`Transport`] on first
//! poll, feeds each delivery through the [`LineDecoder`] and the
//! [`DeltaClassifier`], and yields the resulting events in arrival order.
//!
//! The returned stream is lazy, single-pass and finite. It ends on the
//! `[DONE]` sentinel, the dialect's stop event or connection close, and
//! yields one terminal `Err` on connection or protocol failure. Dropping it
//! drops the connection.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

use super::classifier::{DeltaClassifier, LineOutcome, UpstreamProtocolError};
use super::decoder::LineDecoder;
use super::types::{ClassifiedEvent, ClassifierMode, ReasoningPolicy};
use crate::backend::{ProviderEndpoint, Transport, TransportError, UpstreamCall, UpstreamRequest};

/// Errors that end an adapter stream
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The connection failed or broke
    #[error(transparent)]
    Connection(#[from] TransportError),

    /// The upstream sent an error payload
    #[error("{provider}: {source}")]
    Protocol {
        /// Provider name
        provider: String,
        /// Upstream error
        #[source]
        source: UpstreamProtocolError,
    },
}

/// Ordered events from one upstream call
pub type EventStream = BoxStream<'static, Result<ClassifiedEvent, AdapterError>>;

/// One upstream call's decode/classify pipeline
pub struct StreamAdapter {
    transport: Arc<dyn Transport>,
    endpoint: ProviderEndpoint,
    policy: ReasoningPolicy,
}

impl StreamAdapter {
    /// Create an adapter for `endpoint` with a fixed reasoning policy
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: ProviderEndpoint,
        policy: ReasoningPolicy,
    ) -> Self {
        Self {
            transport,
            endpoint,
            policy,
        }
    }

    /// Classification mode of this adapter
    #[must_use]
    pub fn mode(&self) -> ClassifierMode {
        self.policy.mode()
    }

    /// Provider endpoint
    #[must_use]
    pub fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    /// Build the outbound call, applying the token budget
    #[must_use]
    pub fn prepare(&self, mut request: UpstreamRequest) -> UpstreamCall {
        if let Some(budget) = self.policy.max_tokens() {
            let bounded = request
                .max_tokens_override
                .map_or(budget, |existing| existing.min(budget));
            tracing::info!(
                provider = %self.endpoint.name,
                max_tokens = bounded,
                "Token budget applied"
            );
            request.max_tokens_override = Some(bounded);
        }
        self.endpoint.build_call(&request)
    }

    /// Consume the adapter and return its event stream
    ///
    /// Nothing is sent until the stream is first polled.
    #[must_use]
    pub fn into_stream(self, request: UpstreamRequest) -> EventStream {
        let call = self.prepare(request);
        let mut classifier = DeltaClassifier::new(self.endpoint.dialect, self.policy.mode());
        let provider = self.endpoint.name;
        let transport = self.transport;

        let stream = async_stream::stream! {
            tracing::debug!(provider = %provider, transport = transport.name(), url = %call.url, "Opening upstream stream");
            let mut body = match transport.open(call).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(provider = %provider, error = %e, "Failed to open upstream stream");
                    yield Err(AdapterError::from(e));
                    return;
                }
            };

            let mut decoder = LineDecoder::new();
            let mut closed = false;
            while !closed {
                let lines = match body.next().await {
                    Some(Ok(chunk)) => decoder.decode(&chunk),
                    Some(Err(e)) => {
                        tracing::error!(provider = %provider, error = %e, "Upstream stream broke");
                        yield Err(AdapterError::from(e));
                        return;
                    }
                    None => {
                        closed = true;
                        decoder.finish()
                    }
                };

                for line in lines {
                    match classifier.classify_line(line) {
                        LineOutcome::Emit(events) => {
                            for event in events {
                                yield Ok(event);
                            }
                        }
                        LineOutcome::Skip => {}
                        LineOutcome::Done => {
                            tracing::debug!(provider = %provider, "Upstream stream finished");
                            for event in classifier.finish() {
                                yield Ok(event);
                            }
                            return;
                        }
                        LineOutcome::Fatal(source) => {
                            yield Err(AdapterError::Protocol {
                                provider: provider.clone(),
                                source,
                            });
                            return;
                        }
                    }
                }
            }

            tracing::debug!(provider = %provider, "Upstream closed without end sentinel");
            for event in classifier.finish() {
                yield Ok(event);
            }
        };

        stream.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ByteStream, ChatMessage, Dialect};
    use crate::stream::types::Phase;
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays fixed deliveries and records the calls it receives
    struct Replay {
        deliveries: Vec<Result<&'static str, &'static str>>,
        opened: AtomicUsize,
        last_call: Mutex<Option<UpstreamCall>>,
    }

    impl Replay {
        fn new(deliveries: Vec<Result<&'static str, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                deliveries,
                opened: AtomicUsize::new(0),
                last_call: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Transport for Replay {
        fn name(&self) -> &str {
            "replay"
        }

        async fn open(&self, call: UpstreamCall) -> Result<ByteStream, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let provider = call.provider.clone();
            *self.last_call.lock().unwrap() = Some(call);
            let items: Vec<Result<Bytes, TransportError>> = self
                .deliveries
                .iter()
                .map(|d| match d {
                    Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
                    Err(message) => Err(TransportError::Interrupted {
                        provider: provider.clone(),
                        message: (*message).to_string(),
                    }),
                })
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }
    }

    fn endpoint() -> ProviderEndpoint {
        ProviderEndpoint::new("deepseek", Dialect::OpenAi, "http://upstream", "k")
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest::new(vec![ChatMessage::user("q")], "deepseek-reasoner")
    }

    async fn collect(stream: EventStream) -> Vec<Result<ClassifiedEvent, AdapterError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_native_scenario() {
        let transport = Replay::new(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"because\"}}]}\n\n"),
            Ok("data: {\"choices\":[{\"delta\":{\"reasoning_content\":null,\"content\":\"42\"}}]}\n\n"),
            Ok("data: [DONE]\n\n"),
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n"),
        ]);
        let adapter = StreamAdapter::new(transport.clone(), endpoint(), ReasoningPolicy::default());

        let events: Vec<_> = collect(adapter.into_stream(request()))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                ClassifiedEvent::reasoning("because"),
                ClassifiedEvent::content("42"),
            ]
        );
    }

    #[tokio::test]
    async fn test_lines_split_across_deliveries() {
        let transport = Replay::new(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"con"),
            Ok("tent\":\"<think>\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"),
            Ok("\ndata: {\"choices\":[{\"delta\":{\"content\":\"</think>\"}}]}\n\n"),
        ]);
        let policy = ReasoningPolicy {
            native_reasoning: false,
            ..Default::default()
        };
        let adapter = StreamAdapter::new(transport, endpoint(), policy);

        let phases: Vec<_> = collect(adapter.into_stream(request()))
            .await
            .into_iter()
            .map(|e| {
                let e = e.unwrap();
                (e.phase, e.text, e.is_phase_boundary)
            })
            .collect();

        assert_eq!(
            phases,
            vec![
                (Phase::Reasoning, "<think>".to_string(), false),
                (Phase::Reasoning, "x".to_string(), false),
                (Phase::Reasoning, "</think>".to_string(), false),
                (Phase::Content, String::new(), true),
            ]
        );
    }

    fn tag_policy() -> ReasoningPolicy {
        ReasoningPolicy {
            native_reasoning: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_done_ends_tagged_stream_and_flushes_held_text() {
        let transport = Replay::new(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"answer <\"}}]}\n\n"),
            Ok("data: [DONE]\n\n"),
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n"),
        ]);
        let adapter = StreamAdapter::new(transport, endpoint(), tag_policy());

        let events: Vec<_> = collect(adapter.into_stream(request()))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                ClassifiedEvent::content("answer "),
                ClassifiedEvent::content("<"),
            ]
        );
    }

    #[tokio::test]
    async fn test_close_flushes_held_marker_prefix() {
        let transport = Replay::new(vec![Ok(
            "data: {\"choices\":[{\"delta\":{\"content\":\"<th\"}}]}\n\n",
        )]);
        let adapter = StreamAdapter::new(transport, endpoint(), tag_policy());

        let items = collect(adapter.into_stream(request())).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), &ClassifiedEvent::content("<th"));
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let transport = Replay::new(vec![Ok("data: [DONE]\n")]);
        let adapter = StreamAdapter::new(transport.clone(), endpoint(), ReasoningPolicy::default());

        let stream = adapter.into_stream(request());
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);

        assert!(collect(stream).await.is_empty());
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_error_is_terminal() {
        let transport = Replay::new(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"a\"}}]}\n"),
            Err("reset by peer"),
            Ok("data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"b\"}}]}\n"),
        ]);
        let adapter = StreamAdapter::new(transport, endpoint(), ReasoningPolicy::default());

        let items = collect(adapter.into_stream(request())).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &ClassifiedEvent::reasoning("a"));
        assert!(matches!(
            items[1],
            Err(AdapterError::Connection(TransportError::Interrupted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_protocol_error_is_terminal() {
        let transport = Replay::new(vec![Ok(
            "data: {\"error\":{\"message\":\"rate limited\"}}\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
        )]);
        let adapter = StreamAdapter::new(transport, endpoint(), ReasoningPolicy::default());

        let items = collect(adapter.into_stream(request())).await;
        assert_eq!(items.len(), 1);
        match &items[0] {
            Err(err @ AdapterError::Protocol { .. }) => {
                assert_eq!(
                    err.to_string(),
                    "deepseek: upstream reported an error: rate limited"
                );
            }
            other => panic!("Expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unterminated_final_line_is_flushed() {
        let transport = Replay::new(vec![Ok(
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}",
        )]);
        let adapter = StreamAdapter::new(transport, endpoint(), ReasoningPolicy::default());

        let items = collect(adapter.into_stream(request())).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), &ClassifiedEvent::content("tail"));
    }

    #[test]
    fn test_prepare_applies_budget_in_native_mode() {
        let policy = ReasoningPolicy {
            native_reasoning: true,
            token_budget_enabled: true,
            token_budget_max: 5,
        };
        let adapter = StreamAdapter::new(Replay::new(vec![]), endpoint(), policy);
        let call = adapter.prepare(request());
        assert_eq!(call.body["max_tokens"], serde_json::json!(5));

        let call = adapter.prepare(request().with_max_tokens(3));
        assert_eq!(call.body["max_tokens"], serde_json::json!(3));
    }

    #[test]
    fn test_prepare_skips_budget_in_tag_mode() {
        let policy = ReasoningPolicy {
            native_reasoning: false,
            token_budget_enabled: true,
            token_budget_max: 5,
        };
        let adapter = StreamAdapter::new(Replay::new(vec![]), endpoint(), policy);
        assert_eq!(adapter.mode(), ClassifierMode::TagInference);
        assert!(adapter.prepare(request()).body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_prepared_call_reaches_transport() {
        let transport = Replay::new(vec![]);
        let adapter = StreamAdapter::new(transport.clone(), endpoint(), ReasoningPolicy::default());
        let _ = collect(adapter.into_stream(request())).await;

        let call = transport.last_call.lock().unwrap().clone().unwrap();
        assert_eq!(call.provider, "deepseek");
        assert_eq!(call.body["model"], serde_json::json!("deepseek-reasoner"));
    }
}
