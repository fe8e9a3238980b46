//! Provider profiles
//!
//! One parser serves every backend. What differs between wire formats is
//! captured here: the line prefix, whether a completion sentinel exists, and
//! where the text delta lives inside each decoded JSON object.

use serde::{Deserialize, Serialize};

/// Wire format family of a streaming backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `data: {...}` lines terminated by `data: [DONE]`
    Sse,
    /// Bare newline-delimited JSON objects, terminated by transport close
    LineDelimited,
}

impl ProviderKind {
    /// The parsing profile for this wire format
    #[must_use]
    pub fn profile(self) -> ProviderProfile {
        match self {
            Self::Sse => ProviderProfile::sse(),
            Self::LineDelimited => ProviderProfile::line_delimited(),
        }
    }
}

/// One step when walking a decoded JSON value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn key(name: &str) -> Self {
        Self::Key(name.to_string())
    }
}

/// Everything the line parser needs to know about a provider's stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Literal prefix every event line carries; `None` means bare JSON lines
    pub line_prefix: Option<String>,

    /// Payload (after the prefix) that marks the end of the stream
    pub done_sentinel: Option<String>,

    /// Location of the text delta within each event object
    pub delta_path: Vec<PathSegment>,
}

impl ProviderProfile {
    /// OpenAI-compatible chat completions (`choices[0].delta.content`)
    #[must_use]
    pub fn sse() -> Self {
        Self {
            line_prefix: Some("data: ".to_string()),
            done_sentinel: Some("[DONE]".to_string()),
            delta_path: vec![
                PathSegment::key("choices"),
                PathSegment::Index(0),
                PathSegment::key("delta"),
                PathSegment::key("content"),
            ],
        }
    }

    /// Ollama-style generate endpoint (top-level `response`)
    #[must_use]
    pub fn line_delimited() -> Self {
        Self {
            line_prefix: None,
            done_sentinel: None,
            delta_path: vec![PathSegment::key("response")],
        }
    }

    #[must_use]
    pub const fn has_done_sentinel(&self) -> bool {
        self.done_sentinel.is_some()
    }
}
