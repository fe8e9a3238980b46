//! Text delta extraction from decoded stream events

use serde_json::Value;

use super::profile::{PathSegment, ProviderProfile};

/// Pull the incremental text out of one decoded event
///
/// Walks the profile's `delta_path`. A missing key, an out-of-range index,
/// a `null`, or a non-string leaf all mean "no delta" rather than an error.
/// An empty string is a real delta and is returned as `Some("")`.
#[must_use]
pub fn extract_delta<'a>(value: &'a Value, profile: &ProviderProfile) -> Option<&'a str> {
    let mut current = value;
    for segment in &profile.delta_path {
        current = match segment {
            PathSegment::Key(key) => current.get(key.as_str())?,
            PathSegment::Index(index) => current.get(*index)?,
        };
    }
    current.as_str()
}
