//! Configuration management for the Kiln server
//!
//! Configuration is an explicit value: it is loaded once (from a TOML file or
//! the environment), validated, and then threaded into the server state and
//! every engine call. Nothing here mutates the process environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

use crate::workspace::WorkspaceConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (default: "127.0.0.1"; use "0.0.0.0" to listen on all interfaces)
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Emit permissive CORS headers on every response
    pub enable_cors: bool,
    /// Wrap the router in a request tracing layer
    pub enable_tracing: bool,
    /// Maximum size of a request body in bytes
    pub max_body_bytes: usize,
    /// Default LLM backend; requests may still override it per call
    pub llm: Option<LlmConfig>,
    /// Repository to provision as the engine's working directory at startup
    pub workspace: Option<WorkspaceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            enable_cors: true,
            enable_tracing: true,
            max_body_bytes: 1_048_576, // 1 MB
            llm: None,
            workspace: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(host) = env::var("KILN_HOST") {
            config.bind_address = host;
        }

        if let Ok(port) = env::var("KILN_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "KILN_PORT".to_string(),
                reason: "Invalid port number".to_string(),
            })?;
        }

        if let Ok(cors) = env::var("KILN_CORS") {
            config.enable_cors = parse_bool("KILN_CORS", &cors)?;
        }

        if let Ok(limit) = env::var("KILN_MAX_BODY_BYTES") {
            config.max_body_bytes = limit.parse().map_err(|_| ConfigError::InvalidValue {
                key: "KILN_MAX_BODY_BYTES".to_string(),
                reason: "Expected a byte count".to_string(),
            })?;
        }

        config.llm = LlmConfig::from_env();
        config.workspace = WorkspaceConfig::from_env();

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "port".to_string(),
                reason: "Port cannot be 0".to_string(),
            });
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_body_bytes".to_string(),
                reason: "Body limit must be positive".to_string(),
            });
        }

        if let Some(llm) = &self.llm {
            llm.validate()?;
        }

        if let Some(workspace) = &self.workspace {
            if workspace.repo_path.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: "workspace.repo_path".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("Expected a boolean, got '{}'", other),
        }),
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenRouter,
    OpenAI,
    /// Keyless OpenAI-compatible server (llama.cpp, vLLM, Ollama, ...)
    Local,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenRouter => write!(f, "OpenRouter"),
            LlmProvider::OpenAI => write!(f, "OpenAI"),
            LlmProvider::Local => write!(f, "Local"),
        }
    }
}

/// Default backend for the OpenAI-compatible engine
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.3
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl LlmConfig {
    /// Auto-detect the LLM provider from environment variables.
    ///
    /// Checks in order:
    /// 1. `OPENROUTER_API_KEY` → OpenRouter (model from `OPENROUTER_MODEL`)
    /// 2. `OPENAI_API_KEY` → OpenAI (model from `CHAT_MODEL`)
    /// 3. `KILN_LLM_BASE_URL` → local server (model from `KILN_LLM_MODEL`)
    ///
    /// Returns `None` if none of them is set.
    pub fn from_env() -> Option<Self> {
        if let Ok(api_key) = env::var("OPENROUTER_API_KEY") {
            return Some(Self {
                provider: LlmProvider::OpenRouter,
                api_key: Some(api_key),
                base_url: env::var("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
                model: env::var("OPENROUTER_MODEL")
                    .unwrap_or_else(|_| "anthropic/claude-sonnet-4".to_string()),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
            });
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            return Some(Self {
                provider: LlmProvider::OpenAI,
                api_key: Some(api_key),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
            });
        }

        if let Ok(base_url) = env::var("KILN_LLM_BASE_URL") {
            return Some(Self {
                provider: LlmProvider::Local,
                api_key: None,
                base_url,
                model: env::var("KILN_LLM_MODEL").unwrap_or_else(|_| "default".to_string()),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
            });
        }

        None
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "llm.base_url".to_string(),
            reason: e.to_string(),
        })?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "llm.model".to_string(),
            });
        }

        Ok(())
    }
}
