//! Stream Types
//!
//! Events produced by the delta classifier and the per-call policy that
//! selects how an adapter classifies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which half of a compound answer a piece of text belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Intermediate "thinking" text
    Reasoning,
    /// Final answer text
    Content,
    /// A fragment carrying a complete think block, forwarded unclassified
    Passthrough,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reasoning => write!(f, "reasoning"),
            Self::Content => write!(f, "content"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// One classified piece of upstream output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedEvent {
    /// Phase the text belongs to
    pub phase: Phase,
    /// Text, verbatim from upstream
    pub text: String,
    /// Set only on the synthetic empty-text reasoning→content marker
    pub is_phase_boundary: bool,
}

impl ClassifiedEvent {
    /// Reasoning-phase text
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            phase: Phase::Reasoning,
            text: text.into(),
            is_phase_boundary: false,
        }
    }

    /// Content-phase text
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            phase: Phase::Content,
            text: text.into(),
            is_phase_boundary: false,
        }
    }

    /// Unclassified pass-through text
    pub fn passthrough(text: impl Into<String>) -> Self {
        Self {
            phase: Phase::Passthrough,
            text: text.into(),
            is_phase_boundary: false,
        }
    }

    /// The synthetic reasoning→content marker
    #[must_use]
    pub fn phase_boundary() -> Self {
        Self {
            phase: Phase::Content,
            text: String::new(),
            is_phase_boundary: true,
        }
    }

    /// Whether this is content-phase text or the phase marker
    #[must_use]
    pub fn is_content(&self) -> bool {
        self.phase == Phase::Content
    }
}

/// How an adapter separates reasoning from content
///
/// Fixed for the lifetime of one adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// The upstream exposes a structured reasoning field
    #[default]
    Native,
    /// The upstream exposes flat text; reasoning is inferred from think tags
    TagInference,
}

/// Per-call reasoning configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningPolicy {
    /// Upstream supports a structured reasoning field
    pub native_reasoning: bool,
    /// Bound generated tokens (native mode only)
    pub token_budget_enabled: bool,
    /// Token bound used when the budget is enabled
    pub token_budget_max: u32,
}

impl Default for ReasoningPolicy {
    fn default() -> Self {
        Self {
            native_reasoning: true,
            token_budget_enabled: false,
            token_budget_max: 5,
        }
    }
}

impl ReasoningPolicy {
    /// Classifier mode implied by this policy
    #[must_use]
    pub fn mode(&self) -> ClassifierMode {
        if self.native_reasoning {
            ClassifierMode::Native
        } else {
            ClassifierMode::TagInference
        }
    }

    /// Token bound to inject into the outbound request, if any
    #[must_use]
    pub fn max_tokens(&self) -> Option<u32> {
        (self.native_reasoning && self.token_budget_enabled).then_some(self.token_budget_max)
    }
}
