//! Configuration management for duoHome
//!
//! Resolution order:
//! 1. Global config (`<config dir>/duohome/config.json`)
//! 2. Environment variables (API keys, `.env` included)
//! 3. CLI parameters (highest priority)

pub mod models;
pub mod settings;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use self::{
    models::{ModelProfile, ProviderType},
    settings::{GlobalConfig, DEFAULT_SYSTEM_PROMPT},
};
use crate::{
    error::{DuoError, Result},
    services::CompletionOptions,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub global: GlobalConfig,
}

impl Config {
    /// Load configuration from files and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let global = GlobalConfig::load()?;
        Ok(Self { global })
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("duohome")
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Star counter file, configured or next to the config file
    #[must_use]
    pub fn stars_path(&self) -> PathBuf {
        self.global
            .stars_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("stars.json"))
    }

    /// Get a model profile by name
    #[must_use]
    pub fn get_model(&self, name: &str) -> Option<&ModelProfile> {
        self.global
            .model_profiles
            .iter()
            .find(|profile| profile.name == name)
    }

    /// Get the default model profile, or the first configured one
    #[must_use]
    pub fn default_model(&self) -> Option<&ModelProfile> {
        self.global
            .default_model_name
            .as_ref()
            .and_then(|name| self.get_model(name))
            .or_else(|| self.global.model_profiles.first())
    }

    /// Resolve the profile to use, honouring an explicit CLI choice
    ///
    /// # Errors
    ///
    /// Returns [`DuoError::ModelNotFound`] if no matching profile exists
    pub fn select_model(&self, name: Option<&str>) -> Result<&ModelProfile> {
        match name {
            Some(name) => self
                .get_model(name)
                .ok_or_else(|| DuoError::ModelNotFound(name.to_string())),
            None => self
                .default_model()
                .ok_or_else(|| DuoError::ModelNotFound("<default>".to_string())),
        }
    }

    /// Sampling options for chat requests
    #[must_use]
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.global.temperature,
            max_tokens: self.global.max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let global_path = Config::global_config_path();
        assert!(global_path.ends_with("duohome/config.json"));
    }

    #[test]
    fn test_select_model() {
        let config = Config::default();
        assert_eq!(config.select_model(None).unwrap().name, "qwen-max");
        assert_eq!(
            config.select_model(Some("local")).unwrap().provider,
            ProviderType::Ollama
        );
        assert!(matches!(
            config.select_model(Some("gpt-9")),
            Err(DuoError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_default_model_falls_back_to_first_profile() {
        let mut config = Config::default();
        config.global.default_model_name = None;
        assert_eq!(config.default_model().unwrap().name, "qwen-max");
    }
}
