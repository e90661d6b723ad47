//! Composition Orchestrator
//!
//! ```text
//!  ChatRequest ──▶ reasoner adapter ──Reasoning──▶ caller
//!                        │ first Content event ends phase one
//!                        ▼
//!                  phase boundary ─────────────────▶ caller
//!                        │
//!                        ▼
//!               responder adapter ──Content──▶ caller
//! ```

mod orchestrator;
mod prompt;

pub use orchestrator::{
    ChatRequest, ComposeError, ComposedResponse, ComposedStream, Composer, CompositionContext,
};
pub use prompt::{reasoning_context, responder_messages};
