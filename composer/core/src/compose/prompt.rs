//! Answer-phase prompt construction
//!
//! The responder sees the original conversation with the reasoner's output
//! folded into the last user turn.

use crate::backend::{ChatMessage, Role};

/// Build the auxiliary context block that carries the reasoning
#[must_use]
pub fn reasoning_context(reasoning: &str) -> String {
    format!(
        "Here's my another model's reasoning process:\n{reasoning}\n\n\
         Based on this reasoning, provide your response directly to me:"
    )
}

/// Conversation for the answer phase
///
/// The last user message is rewritten to quote the original input followed
/// by the reasoning context. Without a trailing user message the context is
/// appended as a new user turn.
#[must_use]
pub fn responder_messages(messages: &[ChatMessage], reasoning: &str) -> Vec<ChatMessage> {
    let mut out = messages.to_vec();
    let context = reasoning_context(reasoning);

    match out.last_mut() {
        Some(last) if last.role == Role::User => {
            last.content = format!("Here's my original input:\n{}\n\n{context}", last.content);
        }
        _ => out.push(ChatMessage::user(context)),
    }

    out
}
