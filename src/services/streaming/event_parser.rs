//! Stream line classification
//!
//! Turns one complete line from a streaming response into a [`StreamEvent`].
//! Handles both `data: {...}` event streams and bare JSON-per-line streams,
//! driven by a [`ProviderProfile`].

use serde_json::Value;
use tracing::warn;

use super::{delta::extract_delta, profile::ProviderProfile};

/// Result of classifying one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text; may be empty
    Delta(String),

    /// Completion sentinel (`data: [DONE]`)
    Done,

    /// Line that should have carried JSON but did not decode
    Malformed(String),

    /// Keep-alives, comments, other fields, and events without text
    Ignorable,
}

impl StreamEvent {
    /// Check if this is the completion sentinel
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Line parser for a single provider profile
#[derive(Debug, Clone)]
pub struct EventLineParser {
    profile: ProviderProfile,
}

impl EventLineParser {
    /// Create a parser for the given profile
    pub fn new(profile: ProviderProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// Classify one line (without its terminating `\n`)
    pub fn classify(&self, line: &str) -> StreamEvent {
        let line = line.strip_suffix('\r').unwrap_or(line);

        let payload = match &self.profile.line_prefix {
            Some(prefix) => match line.strip_prefix(prefix.as_str()) {
                Some(payload) => payload,
                None => return StreamEvent::Ignorable,
            },
            None => {
                if line.trim().is_empty() {
                    return StreamEvent::Ignorable;
                }
                line
            }
        };

        if self.profile.done_sentinel.as_deref() == Some(payload) {
            return StreamEvent::Done;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => match extract_delta(&value, &self.profile) {
                Some(text) => StreamEvent::Delta(text.to_string()),
                None => StreamEvent::Ignorable,
            },
            Err(e) => {
                warn!(error = %e, line, "skipping malformed stream line");
                StreamEvent::Malformed(line.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::streaming::ProviderKind;

    fn sse() -> EventLineParser {
        EventLineParser::new(ProviderKind::Sse.profile())
    }

    fn lines() -> EventLineParser {
        EventLineParser::new(ProviderKind::LineDelimited.profile())
    }

    #[test]
    fn test_parse_sse_delta() {
        let event = sse().classify(r#"data: {"choices":[{"delta":{"content":"hello"}}]}"#);
        assert_eq!(event, StreamEvent::Delta("hello".into()));
    }

    #[test]
    fn test_parse_done_marker() {
        assert!(sse().classify("data: [DONE]").is_done());
        assert!(sse().classify("data: [DONE]\r").is_done());
    }

    #[test]
    fn test_sse_non_data_lines_are_ignorable() {
        for line in ["", ": keep-alive", "event: message", "id: 7", "data:{}", "[DONE]"] {
            assert_eq!(sse().classify(line), StreamEvent::Ignorable, "{line:?}");
        }
    }

    #[test]
    fn test_sse_malformed_json() {
        assert_eq!(
            sse().classify("data: {not json}"),
            StreamEvent::Malformed("data: {not json}".into())
        );
    }

    #[test]
    fn test_sse_event_without_content_is_ignorable() {
        let event = sse().classify(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert_eq!(event, StreamEvent::Ignorable);
    }

    #[test]
    fn test_parse_line_delimited() {
        assert_eq!(
            lines().classify(r#"{"response":"Hi","done":false}"#),
            StreamEvent::Delta("Hi".into())
        );
        assert_eq!(lines().classify(""), StreamEvent::Ignorable);
        assert_eq!(lines().classify("  \r"), StreamEvent::Ignorable);
        assert!(matches!(lines().classify("{\"resp"), StreamEvent::Malformed(_)));
    }

    #[test]
    fn test_line_delimited_has_no_sentinel() {
        assert!(matches!(
            lines().classify("[DONE]"),
            StreamEvent::Malformed(_)
        ));
        assert_eq!(
            lines().classify(r#"{"response":"","done":true}"#),
            StreamEvent::Delta(String::new())
        );
    }
}
