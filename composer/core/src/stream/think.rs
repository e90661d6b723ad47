//! Think-Tag Inference
//!
//! Some providers return reasoning inline in the content text, wrapped in
//! `<think>` … `</think>`. [`ThinkTagMachine`] classifies each content
//! fragment as it arrives:
//!
//! ```text
//!            "<think>" seen                 "</think>" seen
//!  outside ─────────────────▶ inside ───────────────────────▶ outside
//!  (Content)                  (Reasoning)   emits Reasoning + boundary marker
//! ```
//!
//! Outside a think block, a fragment tail that could still grow into
//! `<think>` is held back and prepended to the next fragment, so a split
//! opening marker never leaks out as content. Inside a block, the closing
//! marker is searched in the accumulated buffer over a look-back window of
//! `marker length - 1` bytes. No text is dropped or reordered: the
//! concatenation of emitted text equals the concatenation of the input once
//! [`ThinkTagMachine::finish`] has flushed the held tail.

use super::types::ClassifiedEvent;

/// Opening think marker
pub const THINK_OPEN: &str = "<think>";

/// Closing think marker
pub const THINK_CLOSE: &str = "</think>";

/// Bytes of earlier text kept for split-marker detection
const LOOKBACK: usize = THINK_CLOSE.len() - 1;

/// Stateful think-tag classifier for one stream
#[derive(Debug, Default)]
pub struct ThinkTagMachine {
    /// Tail of the reasoning seen since the block opened
    accumulated: String,
    /// Outside text that may be the start of an opening marker
    held: String,
    /// Between an opening and a closing marker
    inside_think: bool,
}

impl ThinkTagMachine {
    /// Create a machine in the outside state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a think block is open
    #[must_use]
    pub fn is_inside(&self) -> bool {
        self.inside_think
    }

    /// Look-back text currently retained
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.accumulated
    }

    /// Text held back as a possible partial opening marker
    #[must_use]
    pub fn held(&self) -> &str {
        &self.held
    }

    /// Classify one content fragment
    pub fn push(&mut self, fragment: &str) -> Vec<ClassifiedEvent> {
        if fragment.is_empty() {
            return Vec::new();
        }

        let mut text = std::mem::take(&mut self.held);
        text.push_str(fragment);

        if self.inside_think {
            return self.push_inside(text);
        }

        if text.contains(THINK_OPEN) && text.contains(THINK_CLOSE) {
            tracing::debug!(len = text.len(), "Complete think block in one fragment");
            self.accumulated.clear();
            return vec![ClassifiedEvent::passthrough(text)];
        }

        if let Some(open_at) = text.find(THINK_OPEN) {
            tracing::debug!("Think block opened");
            self.inside_think = true;
            self.accumulated = text[open_at + THINK_OPEN.len()..].to_string();
            self.trim();
            return vec![ClassifiedEvent::reasoning(text)];
        }

        let keep = partial_open_len(&text);
        if keep > 0 {
            self.held = text.split_off(text.len() - keep);
            tracing::trace!(held = %self.held, "Holding possible opening marker");
        }
        if text.is_empty() {
            Vec::new()
        } else {
            vec![ClassifiedEvent::content(text)]
        }
    }

    /// Flush text still held at end of stream
    pub fn finish(&mut self) -> Vec<ClassifiedEvent> {
        if self.held.is_empty() {
            Vec::new()
        } else {
            vec![ClassifiedEvent::content(std::mem::take(&mut self.held))]
        }
    }

    fn push_inside(&mut self, text: String) -> Vec<ClassifiedEvent> {
        let scan_from = self.accumulated.len();
        self.accumulated.push_str(&text);

        if find_from(&self.accumulated, THINK_CLOSE, scan_from).is_some() {
            tracing::debug!("Think block closed");
            self.inside_think = false;
            self.accumulated.clear();
            return vec![
                ClassifiedEvent::reasoning(text),
                ClassifiedEvent::phase_boundary(),
            ];
        }

        self.trim();
        vec![ClassifiedEvent::reasoning(text)]
    }

    /// Drop everything older than the look-back window
    fn trim(&mut self) {
        if self.accumulated.len() > LOOKBACK {
            let cut = floor_char_boundary(&self.accumulated, self.accumulated.len() - LOOKBACK);
            self.accumulated.drain(..cut);
        }
    }
}

/// Length of the longest tail of `text` that is a proper prefix of `<think>`
fn partial_open_len(text: &str) -> usize {
    (1..THINK_OPEN.len())
        .rev()
        .find(|&n| text.ends_with(&THINK_OPEN[..n]))
        .unwrap_or(0)
}

/// Find `needle` in `haystack`, ignoring matches that end before `from`
fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let start = floor_char_boundary(haystack, from.saturating_sub(needle.len() - 1));
    haystack[start..].find(needle).map(|i| start + i)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
