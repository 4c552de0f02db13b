//! Configuration loading and management for refine.
//!
//! Loads settings from `refine.toml` with environment variable overrides for sensitive data.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key: {0}")]
    MissingApiKey(String),
}

/// Coaching model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Gemini model identifier
    pub model: String,
    /// Base URL of the Generative Language API
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Authentication provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL of the Identity Toolkit API
    pub base_url: String,
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub gemini_key: Option<String>,
    #[serde(default)]
    pub firebase_key: Option<String>,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from the default location (refine.toml in cwd or home).
    ///
    /// Falls back to built-in defaults when no config file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::parse(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse configuration text without consulting the environment
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override API keys from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("API_KEY")) {
            self.api.gemini_key = Some(key);
        }
        if let Ok(key) = std::env::var("FIREBASE_API_KEY") {
            self.api.firebase_key = Some(key);
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from("refine.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?
            .join(".config")
            .join("refine")
            .join("refine.toml");
        home_config.exists().then_some(home_config)
    }

    pub fn gemini_key(&self) -> Result<&str, ConfigError> {
        self.api
            .gemini_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey("gemini".to_string()))
    }

    pub fn firebase_key(&self) -> Result<&str, ConfigError> {
        self.api
            .firebase_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey("firebase".to_string()))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-3-flash-preview".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://identitytoolkit.googleapis.com".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.agent.model, "gemini-3-flash-preview");
        assert_eq!(config.agent.timeout_secs, 60);
        assert!(config.auth.base_url.starts_with("https://identitytoolkit"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [agent]
            model = "gemini-2.5-flash"

            [api]
            gemini_key = "g-key"
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.model, "gemini-2.5-flash");
        assert_eq!(config.agent.timeout_secs, 60);
        assert_eq!(config.gemini_key().unwrap(), "g-key");
    }

    #[test]
    fn missing_keys_are_reported() {
        let config = Config::parse("[api]\nfirebase_key = \"\"\n").unwrap();
        assert!(matches!(
            config.gemini_key(),
            Err(ConfigError::MissingApiKey(provider)) if provider == "gemini"
        ));
        assert!(config.firebase_key().is_err());
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(
            Config::parse("[agent\nmodel ="),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\ntimeout_secs = 5").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.agent.timeout_secs, 5);
    }

    #[test]
    fn load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
