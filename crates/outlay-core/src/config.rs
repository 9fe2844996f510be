//! Application configuration
//!
//! Configuration is resolved in this order:
//! 1. Explicit `--config` path (must exist)
//! 2. Override in data dir (~/.local/share/outlay/config.toml)
//! 3. Embedded default (config/outlay.toml)
//!
//! Environment variables are applied on top of whichever file was loaded.
//! The resulting `Config` is passed into constructors explicitly.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("../../../config/outlay.toml");

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "OUTLAY_DB_KEY";

/// Default upload limit (10 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ai: AiConfig,
    pub payments: PaymentsConfig,
    pub email: EmailConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// MCP server port; unset leaves MCP off
    pub mcp_port: Option<u16>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            mcp_port: None,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "outlay.db".to_string(),
            uploads_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Language model settings
///
/// `backend` is one of `anthropic`, `openai_compatible`, `mock`, `none`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub backend: String,
    pub host: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            backend: "anthropic".to_string(),
            host: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_key: None,
            max_tokens: 1024,
            timeout_secs: 45,
        }
    }
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub currency: String,
    /// Recorded on each payment row
    pub payment_method: String,
    pub timeout_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            currency: "USDC".to_string(),
            payment_method: "usdc".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            from: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound for a whole upload or chat request
    pub request_timeout_secs: u64,
    /// Document text sent to the model is cut to this many characters
    pub max_text_chars: usize,
    /// PDFs yielding less trimmed text than this are treated as image-based
    pub min_pdf_text_chars: usize,
    /// Chat turns included as context for general questions
    pub chat_history_turns: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            max_text_chars: 5000,
            min_pdf_text_chars: 50,
            chat_history_turns: 10,
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("outlay").join("config.toml"))
}

impl Config {
    /// Load configuration from a file (or the defaults) plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a file only, ignoring the environment
    pub fn load_file(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(default_path) => {
                    debug!(path = %default_path.display(), "Loading config override");
                    fs::read_to_string(&default_path)
                        .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
                }
                None => DEFAULT_CONFIG.to_string(),
            },
        };

        Self::parse(&content)
    }

    /// Parse config from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OUTLAY_HOST") {
            self.server.host = v;
        }
        if let Some(port) = get("OUTLAY_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(port) = get("OUTLAY_MCP_PORT").and_then(|v| v.parse().ok()) {
            self.server.mcp_port = Some(port);
        }
        if let Some(v) = get("OUTLAY_DB") {
            self.storage.db_path = v;
        }
        if let Some(v) = get("OUTLAY_UPLOADS_DIR") {
            self.storage.uploads_dir = PathBuf::from(v);
        }
        if let Some(secs) = get("OUTLAY_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.pipeline.request_timeout_secs = secs;
        }

        if let Some(v) = get("AI_BACKEND") {
            self.ai.backend = v.to_lowercase();
        }
        match self.ai.backend.as_str() {
            "anthropic" => {
                if let Some(v) = get("ANTHROPIC_API_KEY") {
                    self.ai.api_key = Some(v);
                }
                if let Some(v) = get("ANTHROPIC_HOST") {
                    self.ai.host = v;
                }
                if let Some(v) = get("ANTHROPIC_MODEL") {
                    self.ai.model = v;
                }
            }
            "openai_compatible" | "openai" => {
                if let Some(v) = get("OPENAI_COMPATIBLE_API_KEY") {
                    self.ai.api_key = Some(v);
                }
                if let Some(v) = get("OPENAI_COMPATIBLE_HOST") {
                    self.ai.host = v;
                }
                if let Some(v) = get("OPENAI_COMPATIBLE_MODEL") {
                    self.ai.model = v;
                }
            }
            _ => {}
        }

        if let Some(v) = get("PAYMENT_API_URL") {
            self.payments.base_url = Some(v);
        }
        if let Some(v) = get("PAYMENT_API_KEY") {
            self.payments.api_key = Some(v);
        }
        if let Some(v) = get("EMAIL_API_URL") {
            self.email.base_url = Some(v);
        }
        if let Some(v) = get("EMAIL_API_KEY") {
            self.email.api_key = Some(v);
        }
        if let Some(v) = get("EMAIL_FROM") {
            self.email.from = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_embedded_default_parses() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.pipeline.request_timeout_secs, 60);
        assert_eq!(config.pipeline.max_text_chars, 5000);
        assert!(config.payments.base_url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("[pipeline]\nrequest_timeout_secs = 5\n").unwrap();
        assert_eq!(config.pipeline.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.pipeline.min_pdf_text_chars, 50);
        assert_eq!(config.ai.backend, "anthropic");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::parse("[server\nport = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("AI_BACKEND", "OpenAI_Compatible"),
            ("OPENAI_COMPATIBLE_HOST", "http://localhost:8080"),
            ("OPENAI_COMPATIBLE_MODEL", "qwen2.5-vl"),
            ("ANTHROPIC_API_KEY", "ignored"),
            ("PAYMENT_API_URL", "https://pay.example.com"),
            ("OUTLAY_PORT", "not-a-port"),
            ("EMAIL_FROM", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.ai.backend, "openai_compatible");
        assert_eq!(config.ai.host, "http://localhost:8080");
        assert_eq!(config.ai.model, "qwen2.5-vl");
        assert!(config.ai.api_key.is_none());
        assert_eq!(
            config.payments.base_url.as_deref(),
            Some("https://pay.example.com")
        );
        assert_eq!(config.server.port, 3000);
        assert!(config.email.from.is_none());
    }

    #[test]
    fn test_missing_explicit_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_file(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
