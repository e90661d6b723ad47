//! HTTP Transport
//!
//! reqwest-backed [`Transport`]. Posts the prepared JSON body and returns the
//! response body as a stream of byte deliveries. Non-success statuses are
//! read in full and turned into [`TransportError::Status`] before any
//! streaming starts.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{truncate_body, ByteStream, Transport, TransportError, UpstreamCall};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default idle timeout between two body deliveries
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP transport client
#[derive(Clone)]
pub struct HttpTransport {
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given idle timeout and optional proxy URL
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the TLS backend cannot
    /// be initialised.
    pub fn new(read_timeout: Duration, proxy: Option<&str>) -> Result<Self, TransportError> {
        let setup_error = |e: reqwest::Error| TransportError::Connect {
            provider: "http".to_string(),
            message: e.to_string(),
        };

        let mut builder = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .read_timeout(read_timeout);

        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(setup_error)?);
            tracing::info!(proxy = %proxy, "Using upstream proxy");
        }

        Ok(Self {
            http_client: builder.build().map_err(setup_error)?,
        })
    }

    /// Create a transport from an existing client
    #[must_use]
    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

fn classify_error(provider: &str, e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        TransportError::Connect {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, call: UpstreamCall) -> Result<ByteStream, TransportError> {
        let mut request = self.http_client.post(&call.url).json(&call.body);
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!(provider = %call.provider, url = %call.url, "Opening upstream stream");

        let response = request
            .send()
            .await
            .map_err(|e| classify_error(&call.provider, &e))?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = %call.provider, status, "Upstream rejected request");
            return Err(TransportError::Status {
                provider: call.provider,
                status,
                body: truncate_body(&body),
            });
        }

        let provider = call.provider;
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        provider: provider.clone(),
                    }
                } else {
                    TransportError::Interrupted {
                        provider: provider.clone(),
                        message: e.to_string(),
                    }
                }
            })
        });

        Ok(stream.boxed())
    }
}
