//! Ollama generate backend
//!
//! Ollama's `/api/generate` takes a single prompt string and streams one
//! JSON object per line with the next piece of text in `response`. The
//! conversation is flattened into a role-tagged transcript.

use serde::{Deserialize, Serialize};

use crate::{
    config::models::ModelProfile,
    error::Result,
    messages::{ChatTurn, Role},
};

use super::{require_base_url, streaming::ProviderKind, ChatBackend, ChatRequest, CompletionOptions};

/// Backend for a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    model: String,
    base_url: String,
}

impl OllamaBackend {
    /// Create a new backend
    ///
    /// # Errors
    ///
    /// Returns a validation error if the profile has no base URL
    pub fn new(profile: &ModelProfile) -> Result<Self> {
        Ok(Self {
            model: profile.model_name.clone(),
            base_url: require_base_url(profile)?,
        })
    }

    /// Flatten the system prompt and turns into a single prompt
    fn build_prompt(system_prompt: &str, turns: &[ChatTurn]) -> String {
        let system = (!system_prompt.is_empty()).then(|| ChatTurn::system(system_prompt));

        system
            .iter()
            .chain(turns)
            .map(|turn| match turn.role() {
                Role::System => format!("System: {}", turn.content()),
                Role::Assistant => format!("Assistant: {}", turn.content()),
                Role::User => format!("Human: {}", turn.content()),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ChatBackend for OllamaBackend {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LineDelimited
    }

    fn build_request(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        options: &CompletionOptions,
    ) -> Result<ChatRequest> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: Self::build_prompt(system_prompt, turns),
            stream: true,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        Ok(ChatRequest {
            url: format!("{}/api/generate", self.base_url),
            bearer_token: None,
            body: serde_json::to_value(request)?,
        })
    }
}

// Ollama API types

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::ProviderType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn backend() -> OllamaBackend {
        let profile = ModelProfile::new("local", ProviderType::Ollama, "deepseek-r1:32b");
        OllamaBackend::new(&profile).unwrap()
    }

    #[test]
    fn test_build_prompt() {
        let turns = vec![ChatTurn::user("你好"), ChatTurn::assistant("你好呀"), ChatTurn::user("唱首歌")];
        assert_eq!(
            OllamaBackend::build_prompt("Be kind", &turns),
            "System: Be kind\nHuman: 你好\nAssistant: 你好呀\nHuman: 唱首歌"
        );
        assert_eq!(
            OllamaBackend::build_prompt("", &turns[..1]),
            "Human: 你好"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let options = CompletionOptions {
            temperature: Some(0.5),
            max_tokens: None,
        };
        let request = backend()
            .build_request("Be kind", &[ChatTurn::user("hi")], &options)
            .unwrap();

        assert_eq!(request.url, "http://localhost:11434/api/generate");
        assert!(request.bearer_token.is_none());
        assert_eq!(
            request.body,
            json!({
                "model": "deepseek-r1:32b",
                "prompt": "System: Be kind\nHuman: hi",
                "stream": true,
                "options": {"temperature": 0.5},
            })
        );
    }
}
