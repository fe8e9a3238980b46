//! Service layer: model backends, streaming, and the app's collaborators
//!
//! Backends supported:
//! - OpenAI-compatible chat completions (DashScope, OpenAI, self-hosted)
//! - Ollama `/api/generate`

pub mod app_launch;
pub mod chat;
pub mod conversation_log;
pub mod history;
pub mod ollama;
pub mod openai;
pub mod speech;
pub mod stars;
pub mod streaming;
pub mod transport;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::models::{ModelProfile, ProviderType},
    error::{DuoError, Result},
    messages::ChatTurn,
};

pub use self::{
    chat::ChatService,
    history::ConversationHistory,
    streaming::{ProviderKind, ProviderProfile, SessionState, StreamSession},
    transport::{ByteStream, ChatRequest, HttpTransport, Transport},
};

/// Sampling options for model requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: Some(800),
        }
    }
}

/// Builds provider-specific streaming requests
///
/// Backends only know how to shape a request for their server and which
/// wire format the reply uses; opening the connection is the
/// [`Transport`]'s job.
pub trait ChatBackend: Send + Sync {
    /// Get the provider name (e.g., "dashscope", "ollama")
    fn provider(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Wire format of the streamed reply
    fn kind(&self) -> ProviderKind;

    /// Build the streaming request for a system prompt plus history turns
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized
    fn build_request(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        options: &CompletionOptions,
    ) -> Result<ChatRequest>;
}

/// Factory for creating chat backends
pub struct ChatBackendFactory;

impl ChatBackendFactory {
    /// Create a backend from a model profile
    ///
    /// # Errors
    ///
    /// Returns an error if the profile has no usable endpoint or lacks a
    /// required API key
    pub fn create(profile: &ModelProfile) -> Result<Box<dyn ChatBackend>> {
        debug!(
            profile = %profile.name,
            provider = %profile.provider,
            kind = ?profile.provider.kind(),
            "creating chat backend"
        );
        match profile.provider {
            ProviderType::DashScope | ProviderType::OpenAI | ProviderType::CustomOpenAI => {
                Ok(Box::new(openai::OpenAiCompatBackend::new(profile)?))
            }
            ProviderType::Ollama => Ok(Box::new(ollama::OllamaBackend::new(profile)?)),
        }
    }
}

pub(crate) fn require_base_url(profile: &ModelProfile) -> Result<String> {
    profile
        .effective_base_url()
        .map(|url| url.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            DuoError::ConfigValidation(format!("profile '{}' needs a base_url", profile.name))
        })
}
