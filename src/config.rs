//! Configuration management for the Kintsugi client
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{KintsugiError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure for the Kintsugi client
///
/// Holds everything the client needs: where the server is, which model new
/// chats use, and how the streaming pipeline is tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server connection configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat behavior configuration
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the Kintsugi backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Total timeout for non-streaming REST requests (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Chat behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model used when creating new chats
    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt sent with every message (none by default)
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Maximum wait for the next stream chunk before the exchange is
    /// treated as a transport failure (seconds)
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_seconds: u64,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_chunk_timeout() -> u64 {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: None,
            chunk_timeout_seconds: default_chunk_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// Resolution order for the file itself: the explicit `path` if it
    /// exists, otherwise the per-user config dir
    /// (`<config_dir>/kintsugi/config.yaml`), otherwise built-in defaults.
    /// Environment variables (`KINTSUGI_SERVER_URL`, `KINTSUGI_MODEL`) and
    /// the CLI `--server` flag are applied on top.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if an existing file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                Self::from_file(&user_path.to_string_lossy())?
            } else {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        } else {
            tracing::debug!("No config file found, using defaults");
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Per-user config file location, if the platform exposes one
    fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("ai", "kintsugi", "kintsugi")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| KintsugiError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| KintsugiError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("KINTSUGI_SERVER_URL") {
            if !base_url.is_empty() {
                self.server.base_url = base_url;
            }
        }

        if let Ok(model) = std::env::var("KINTSUGI_MODEL") {
            if !model.is_empty() {
                self.chat.model = model;
            }
        }

        if let Ok(timeout) = std::env::var("KINTSUGI_CHUNK_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.chat.chunk_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid KINTSUGI_CHUNK_TIMEOUT_SECONDS: {}", timeout);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(server) = &cli.server {
            self.server.base_url = server.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range or unparseable
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.server.base_url).map_err(|e| {
            KintsugiError::Config(format!(
                "Invalid server.base_url '{}': {}",
                self.server.base_url, e
            ))
        })?;

        if self.server.request_timeout_seconds == 0 {
            return Err(KintsugiError::Config(
                "server.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.chunk_timeout_seconds == 0 {
            return Err(KintsugiError::Config(
                "chat.chunk_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.model.is_empty() {
            return Err(KintsugiError::Config("chat.model cannot be empty".to_string()).into());
        }

        Ok(())
    }

    /// Parsed server base URL
    ///
    /// Call after [`validate`](Self::validate); an unparseable URL is a
    /// config error, not a panic.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.server.base_url).map_err(|e| {
            KintsugiError::Config(format!(
                "Invalid server.base_url '{}': {}",
                self.server.base_url, e
            ))
            .into()
        })
    }

    /// REST request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Per-chunk stream timeout as a [`Duration`]
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.chunk_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.base_url, "http://localhost:8080");
        assert_eq!(config.server.request_timeout_seconds, 30);
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.chat.chunk_timeout_seconds, 30);
        assert!(config.chat.system_prompt.is_none());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
server:
  base_url: https://api.kintsugi.example
  request_timeout_seconds: 10
chat:
  model: claude-3-opus
  system_prompt: "be concise"
  chunk_timeout_seconds: 60
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.base_url, "https://api.kintsugi.example");
        assert_eq!(config.server.request_timeout_seconds, 10);
        assert_eq!(config.chat.model, "claude-3-opus");
        assert_eq!(config.chat.system_prompt.as_deref(), Some("be concise"));
        assert_eq!(config.chat.chunk_timeout_seconds, 60);
    }

    #[test]
    fn test_parse_partial_yaml_fills_defaults() {
        let yaml = "chat:\n  model: o3-mini\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.chat.model, "o3-mini");
        assert_eq!(config.server.base_url, "http://localhost:8080");
        assert_eq!(config.chat.chunk_timeout_seconds, 30);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.server.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.server.request_timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chat.chunk_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut config = Config::default();
        config.chat.model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_parses() {
        let config = Config::default();
        let url = config.base_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.chunk_timeout(), Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_load_from_file_with_cli_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  base_url: http://from-file:1234").unwrap();

        let cli = Cli {
            server: Some("http://from-cli:9999".to_string()),
            ..Cli::default()
        };
        let config = Config::load(&file.path().to_string_lossy(), &cli).unwrap();

        // CLI wins over the file.
        assert_eq!(config.server.base_url, "http://from-cli:9999");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("KINTSUGI_SERVER_URL", "http://from-env:8081");
        std::env::set_var("KINTSUGI_MODEL", "o1");

        let cli = Cli::default();
        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();

        assert_eq!(config.server.base_url, "http://from-env:8081");
        assert_eq!(config.chat.model, "o1");

        std::env::remove_var("KINTSUGI_SERVER_URL");
        std::env::remove_var("KINTSUGI_MODEL");
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        std::env::remove_var("KINTSUGI_SERVER_URL");
        std::env::remove_var("KINTSUGI_MODEL");
        let cli = Cli::default();
        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();
        assert_eq!(config.chat.model, "gpt-4o");
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [not, a, mapping").unwrap();

        let cli = Cli::default();
        let result = Config::load(&file.path().to_string_lossy(), &cli);
        assert!(result.is_err());
    }
}
