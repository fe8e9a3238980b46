//! Global settings (stored in the user config directory)

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ModelProfile, ProviderType};
use crate::error::{DuoError, Result};

/// Persona the assistant keeps for every conversation
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
你是一个专为5岁小女孩设计的AI助手。请遵循以下原则：

1. 使用简单、友好的语言，就像在和小朋友说话一样
2. 回答要简单易懂。用户跟你说中文时用中文回答，用户说英文时用英文回答（注意英语对话尽量简单，词汇量控制在500常用词以内）
3. 使用生动有趣的表达方式，可以适当加入拟声词，但不要返回表情
4. 能够讲简单的儿童故事，故事要短小精悍，有教育意义
5. 支持非常基础的英语对话，词汇量控制在500个常用词以内
6. 英语对话时，语速要慢，句子要短，并在括号中提供中文翻译
7. 避免使用复杂的词汇和概念，用小朋友能理解的方式解释事物
8. 回答要积极正面，传递正确的价值观
9. 如果被问到不适合儿童的问题，温和地引导到适合的话题
10. 可以假装扮演小朋友喜欢的卡通角色进行对话

记住，你是在和一个5岁的小女孩交流，她叫朵朵，所以要特别有耐心和爱心。";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Verbose logging enabled
    #[serde(default)]
    pub verbose: bool,

    /// Model profiles
    #[serde(default = "default_profiles")]
    pub model_profiles: Vec<ModelProfile>,

    /// Default model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model_name: Option<String>,

    /// System prompt prepended to every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Turns retained for prompt construction
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none", default = "default_temperature")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none", default = "default_max_tokens")]
    pub max_tokens: Option<u32>,

    /// Star counter file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stars_path: Option<PathBuf>,

    /// Conversation upload service base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_log_url: Option<String>,
}

fn default_profiles() -> Vec<ModelProfile> {
    vec![
        ModelProfile::new("qwen-max", ProviderType::DashScope, "qwen-max"),
        ModelProfile::new("local", ProviderType::Ollama, "deepseek-r1:32b"),
    ]
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_history_turns() -> usize {
    crate::services::history::DEFAULT_MAX_TURNS
}

#[allow(clippy::unnecessary_wraps)]
fn default_temperature() -> Option<f32> {
    Some(0.7)
}

#[allow(clippy::unnecessary_wraps)]
fn default_max_tokens() -> Option<u32> {
    Some(800)
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            model_profiles: default_profiles(),
            default_model_name: Some("qwen-max".to_string()),
            system_prompt: default_system_prompt(),
            max_history_turns: default_max_history_turns(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stars_path: None,
            conversation_log_url: None,
        }
    }
}

impl GlobalConfig {
    /// Load global configuration from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let path = super::Config::global_config_path();
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| DuoError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| DuoError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration to `path` unless a file is already
    /// there. Returns whether a file was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn init_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to_path(path)?;
        info!(path = %path.display(), "wrote default configuration");
        Ok(true)
    }

    /// Save configuration to a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check invariants serde cannot express
    ///
    /// # Errors
    ///
    /// Returns [`DuoError::ConfigValidation`] on the first violation
    pub fn validate(&self) -> Result<()> {
        if self.max_history_turns == 0 {
            return Err(DuoError::ConfigValidation(
                "max_history_turns must be at least 1".to_string(),
            ));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(DuoError::ConfigValidation(format!(
                    "temperature {temperature} is outside 0.0..=2.0"
                )));
            }
        }
        if let Some(name) = &self.default_model_name {
            if !self.model_profiles.iter().any(|p| &p.name == name) {
                return Err(DuoError::ConfigValidation(format!(
                    "default model '{name}' has no profile"
                )));
            }
        }
        for profile in &self.model_profiles {
            if profile.effective_base_url().is_none() {
                return Err(DuoError::ConfigValidation(format!(
                    "profile '{}' needs a base_url",
                    profile.name
                )));
            }
        }
        Ok(())
    }
}
