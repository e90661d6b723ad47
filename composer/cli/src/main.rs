//! Reasoning Composer CLI
//!
//! Reads one OpenAI-style `chat/completions` request body, composes the
//! answer from the reasoning and answer providers, and writes the response
//! to stdout: server-sent `chat.completion.chunk` frames when the request
//! streams, a single `chat.completion` JSON object otherwise. With
//! `--listen` it serves the same responses over HTTP instead.
//!
//! # Usage
//!
//! ```bash
//! # Request body from a file
//! composer --input request.json
//!
//! # Request body from stdin
//! echo '{"messages":[{"role":"user","content":"1+1?"}]}' | composer
//!
//! # Quick question, no JSON needed
//! composer --prompt "Why is the sky blue?"
//!
//! # Serve POST /v1/chat/completions and GET /v1/models
//! composer --listen 127.0.0.1:8000
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=debug composer --input request.json
//! ```
//!
//! # Environment Variables
//!
//! - `DEEPSEEK_API_KEY`, `DEEPSEEK_API_URL`, `DEEPSEEK_MODEL`: reasoning provider
//! - `CLAUDE_API_KEY`, `CLAUDE_API_URL`, `CLAUDE_MODEL`, `CLAUDE_PROVIDER`: answer provider
//! - `IS_ORIGIN_REASONING`: reasoning provider returns a structured reasoning field
//! - `SAVE_DEEPSEEK_TOKENS`, `SAVE_DEEPSEEK_TOKENS_MAX_TOKENS`: token budget
//! - `COMPOSER_TIMEOUT_SECS`, `COMPOSER_PROXY`: transport settings
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - `SIGINT`: Stop the current response; open upstream calls are dropped.
//!   With `--listen`, stop accepting and shut the server down.

mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt, Stdout};
use tracing::{error, info, warn};

use composer_core::{
    load_config_from_path, ChatCompletionRequest, ChatMessage, ChunkEncoder, ComposeError,
    Composer, ComposerConfig, ConfigOverrides, HttpTransport,
};

/// Reasoning Composer - stream a reasoning model and an answer model as one response
#[derive(Parser, Debug)]
#[command(name = "composer")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "COMPOSER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Request body file (reads stdin when neither this nor --prompt is given)
    #[arg(short = 'i', long, value_name = "FILE", conflicts_with = "prompt")]
    input: Option<PathBuf>,

    /// Ask a single question instead of passing a request body
    #[arg(short = 'p', long, value_name = "TEXT")]
    prompt: Option<String>,

    /// Serve the OpenAI-compatible HTTP API on this address
    #[arg(short = 'l', long, value_name = "ADDR", conflicts_with_all = ["input", "prompt", "no_stream"])]
    listen: Option<SocketAddr>,

    /// Return one JSON object instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Reasoning model override
    #[arg(long, value_name = "MODEL")]
    reasoner_model: Option<String>,

    /// Answer model override
    #[arg(long, value_name = "MODEL")]
    responder_model: Option<String>,

    /// Infer reasoning from <think> tags instead of a structured field
    #[arg(long)]
    tag_reasoning: bool,

    /// Idle timeout between upstream deliveries, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Proxy URL for upstream calls
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref model) = self.reasoner_model {
            overrides = overrides.with_reasoner_model(model.clone());
        }
        if let Some(ref model) = self.responder_model {
            overrides = overrides.with_responder_model(model.clone());
        }
        if self.tag_reasoning {
            overrides = overrides.with_native_reasoning(false);
        }
        if let Some(secs) = self.timeout {
            overrides = overrides.with_read_timeout_secs(secs);
        }
        if let Some(ref proxy) = self.proxy {
            overrides = overrides.with_proxy(proxy.clone());
        }
        overrides
    }
}

/// Resolve configuration: file, then environment, then CLI flags
fn resolve_config(args: &Args) -> Result<ComposerConfig> {
    let path = args
        .config
        .clone()
        .or_else(composer_core::default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Configuration is incomplete")?;

    info!(
        source = %config.source(),
        reasoner = %config.reasoner.name,
        reasoner_model = %config.reasoner.model,
        responder = %config.responder.name,
        responder_model = %config.responder.model,
        native_reasoning = config.reasoner.policy.native_reasoning,
        "Configuration resolved"
    );
    Ok(config)
}

/// Read the request body from the prompt flag, a file or stdin
async fn read_request(args: &Args) -> Result<ChatCompletionRequest> {
    if let Some(ref prompt) = args.prompt {
        return Ok(ChatCompletionRequest {
            model: None,
            messages: vec![ChatMessage::user(prompt.clone())],
            stream: !args.no_stream,
            sampling: Default::default(),
        });
    }

    let body = match args.input {
        Some(ref path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read request body: {path:?}"))?,
        None => {
            let mut body = String::new();
            tokio::io::stdin()
                .read_to_string(&mut body)
                .await
                .context("Failed to read request body from stdin")?;
            body
        }
    };

    let mut request =
        ChatCompletionRequest::from_json(&body).context("Request body is not a valid chat request")?;
    if args.no_stream {
        request.stream = false;
    }
    Ok(request)
}

/// Write one frame; `false` once the reader has gone away
async fn write_frame(out: &mut Stdout, frame: &str) -> bool {
    if let Err(e) = out.write_all(frame.as_bytes()).await {
        warn!(error = %e, "Client went away, stopping response");
        return false;
    }
    if let Err(e) = out.flush().await {
        warn!(error = %e, "Client went away, stopping response");
        return false;
    }
    true
}

/// Stream the composed answer as SSE frames
async fn run_stream(composer: &Composer, request: ChatCompletionRequest) -> Result<()> {
    let encoder = ChunkEncoder::new(request.model_name());
    let mut events = composer.compose_stream(request.into_chat_request());
    let mut out = tokio::io::stdout();

    info!(id = %encoder.id(), "Streaming response");

    loop {
        let next = tokio::select! {
            next = events.next() => next,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping response");
                return Ok(());
            }
        };

        match next {
            Some(Ok(event)) => {
                let frame = encoder.encode(&event).context("Failed to encode chunk")?;
                if !write_frame(&mut out, &frame).await {
                    return Ok(());
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "Composition failed");
                match encoder.error(&e.to_string()) {
                    Ok(frame) => {
                        let _ = write_frame(&mut out, &frame).await;
                    }
                    Err(encode_error) => {
                        error!(error = %encode_error, "Failed to encode error chunk");
                    }
                }
                let _ = write_frame(&mut out, &encoder.done()).await;
                return Err(e.into());
            }
            None => break,
        }
    }

    write_frame(&mut out, &encoder.done()).await;
    info!(id = %encoder.id(), "Response complete");
    Ok(())
}

/// Compose the whole answer and print it as one JSON object
async fn run_once(composer: &Composer, request: ChatCompletionRequest) -> Result<()> {
    let encoder = ChunkEncoder::new(request.model_name());

    let response = tokio::select! {
        response = composer.compose(request.into_chat_request()) => response,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, abandoning response");
            return Ok(());
        }
    };

    let response = response.map_err(|e: ComposeError| {
        error!(error = %e, "Composition failed");
        e
    })?;

    let completion = encoder
        .completion(&response)
        .context("Failed to encode completion")?;
    let body = serde_json::to_string_pretty(&completion)?;
    let mut out = tokio::io::stdout();
    out.write_all(body.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stdout carries the response)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("composer_cli=info".parse()?)
                .add_directive("composer_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = resolve_config(&args)?;

    let transport = HttpTransport::new(config.read_timeout, config.proxy.as_deref())
        .context("Failed to build HTTP transport")?;
    let composer = Composer::from_config(Arc::new(transport), &config);

    if let Some(addr) = args.listen {
        return server::serve(composer, addr).await;
    }

    let request = read_request(&args).await?;
    if request.stream {
        run_stream(&composer, request).await
    } else {
        run_once(&composer, request).await
    }
}
