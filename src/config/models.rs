//! Model configuration and profiles

use serde::{Deserialize, Serialize};

use crate::services::streaming::ProviderKind;

/// Model server types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Alibaba Cloud DashScope, OpenAI-compatible mode
    DashScope,
    OpenAI,
    /// Ollama `/api/generate`
    Ollama,
    #[serde(rename = "custom-openai")]
    CustomOpenAI,
}

impl ProviderType {
    /// Get the default base URL for this provider
    #[must_use]
    pub const fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::DashScope => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Self::OpenAI => Some("https://api.openai.com/v1"),
            Self::Ollama => Some("http://localhost:11434"),
            Self::CustomOpenAI => None, // Custom requires user-specified endpoint
        }
    }

    /// Check if this provider requires an API key
    #[must_use]
    pub const fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Streaming wire format spoken by this provider
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Ollama => ProviderKind::LineDelimited,
            Self::DashScope | Self::OpenAI | Self::CustomOpenAI => ProviderKind::Sse,
        }
    }

    /// Environment variable consulted when the profile has no key
    #[must_use]
    pub const fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::DashScope => Some("DASHSCOPE_API_KEY"),
            Self::OpenAI | Self::CustomOpenAI => Some("OPENAI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DashScope => write!(f, "dashscope"),
            Self::OpenAI => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
            Self::CustomOpenAI => write!(f, "custom-openai"),
        }
    }
}

/// Model profile configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// User-friendly name for the profile
    pub name: String,

    /// Provider type
    pub provider: ProviderType,

    /// Actual model identifier
    pub model_name: String,

    /// Custom API endpoint (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
}

impl ModelProfile {
    /// Create a new model profile
    #[must_use]
    pub fn new(name: impl Into<String>, provider: ProviderType, model_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            model_name: model_name.into(),
            base_url: provider.default_base_url().map(String::from),
            api_key: String::new(),
        }
    }

    /// Get the effective base URL (custom or default)
    #[must_use]
    pub fn effective_base_url(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| self.provider.default_base_url().map(String::from))
    }

    /// API key from the profile, falling back to the provider's env var
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        self.provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}
