//! OpenAI-compatible chat completions backend
//!
//! Supports:
//! - Alibaba Cloud DashScope compatible mode (qwen-max and friends)
//! - OpenAI official API
//! - Any other OpenAI-compatible endpoint

use serde::{Deserialize, Serialize};

use crate::{
    config::models::ModelProfile,
    error::{DuoError, Result},
    messages::ChatTurn,
};

use super::{require_base_url, streaming::ProviderKind, ChatBackend, ChatRequest, CompletionOptions};

/// Backend for `/chat/completions` servers streaming `data:` events
#[derive(Debug, Clone)]
pub struct OpenAiCompatBackend {
    provider: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatBackend {
    /// Create a new backend
    ///
    /// # Errors
    ///
    /// Returns [`DuoError::MissingApiKey`] if neither the profile nor the
    /// environment provides a key, or a validation error without a base URL
    pub fn new(profile: &ModelProfile) -> Result<Self> {
        let api_key = profile.resolved_api_key();
        if api_key.is_none() && profile.provider.requires_api_key() {
            return Err(DuoError::MissingApiKey {
                provider: profile.provider.to_string(),
            });
        }

        Ok(Self {
            provider: profile.provider.to_string(),
            model: profile.model_name.clone(),
            base_url: require_base_url(profile)?,
            api_key,
        })
    }

    fn convert_turns(system_prompt: &str, turns: &[ChatTurn]) -> Vec<OpenAIMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);

        if !system_prompt.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            });
        }

        messages.extend(turns.iter().map(|turn| OpenAIMessage {
            role: turn.role().as_str().to_string(),
            content: turn.content().to_string(),
        }));

        messages
    }
}

impl ChatBackend for OpenAiCompatBackend {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Sse
    }

    fn build_request(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        options: &CompletionOptions,
    ) -> Result<ChatRequest> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: Self::convert_turns(system_prompt, turns),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
        };

        Ok(ChatRequest {
            url: format!("{}/chat/completions", self.base_url),
            bearer_token: self.api_key.clone(),
            body: serde_json::to_value(request)?,
        })
    }
}

// OpenAI API types

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}
