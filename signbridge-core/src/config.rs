//! Configuration management
//!
//! Typed configuration for the Signbridge client, loaded from TOML.

use crate::error::{ErrorContext, SignbridgeError, SignbridgeResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level Signbridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignbridgeConfig {
    /// Remote CMS backend settings
    pub backend: BackendConfig,
    /// Operator credential settings
    pub auth: AuthConfig,
    /// HTTP client tuning
    pub http: HttpConfig,
    /// Local storage settings
    pub storage: StorageConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Remote backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the CMS backend, e.g. "https://cms.example.com"
    pub base_url: String,
    /// OAuth2 client identifier (application-level credential)
    pub client_id: Option<String>,
    /// OAuth2 client secret (application-level credential)
    pub client_secret: Option<String>,
}

/// Operator credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Operator username for password-grant and form login
    pub username: Option<String>,
    /// Operator password for password-grant and form login
    pub password: Option<String>,
    /// Environment variable holding the store passphrase
    pub passphrase_env: String,
    /// Safety margin applied to token expiry checks, in seconds
    pub expiry_margin_secs: u64,
    /// Validity window for form-login sessions, in hours
    pub session_hours: u64,
}

/// HTTP client timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for liveness/identity probes, in seconds
    pub probe_timeout_secs: u64,
    /// Timeout for credential exchanges (token grants, form login), in seconds
    pub exchange_timeout_secs: u64,
    /// Timeout for regular catalog requests, in seconds
    pub request_timeout_secs: u64,
}

/// Local storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding persisted credential records
    pub data_dir: String,
}

impl Default for SignbridgeConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://localhost:8080".to_string(),
                client_id: None,
                client_secret: None,
            },
            auth: AuthConfig {
                username: None,
                password: None,
                passphrase_env: "SIGNBRIDGE_PASSPHRASE".to_string(),
                expiry_margin_secs: 300,
                session_hours: 8,
            },
            http: HttpConfig {
                probe_timeout_secs: 5,
                exchange_timeout_secs: 30,
                request_timeout_secs: 30,
            },
            storage: StorageConfig {
                data_dir: "~/.signbridge".to_string(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl SignbridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SignbridgeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SignbridgeError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: SignbridgeConfig =
            toml::from_str(&content).map_err(|e| SignbridgeError::Config {
                message: format!("Failed to parse config: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("parse_toml")
                    .with_suggestion("Check TOML syntax in config file"),
            })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SignbridgeResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SignbridgeError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| SignbridgeError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> SignbridgeResult<()> {
        if url::Url::parse(&self.backend.base_url).is_err() {
            return Err(SignbridgeError::Config {
                message: format!("Invalid backend base URL: {}", self.backend.base_url),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set backend.base_url to a full http(s) URL"),
            });
        }

        let has_client = self.backend.client_id.is_some() && self.backend.client_secret.is_some();
        let has_user = self.auth.username.is_some() && self.auth.password.is_some();
        if !has_client && !has_user {
            return Err(SignbridgeError::Config {
                message: "No usable credentials: set client_id/client_secret or username/password"
                    .to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set backend.client_id and backend.client_secret")
                    .with_suggestion("Or set auth.username and auth.password"),
            });
        }

        if self.auth.expiry_margin_secs == 0 {
            return Err(SignbridgeError::Config {
                message: "auth.expiry_margin_secs must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Use the default of 300 seconds"),
            });
        }

        Ok(())
    }

    /// Resolve the data directory, expanding a leading `~`
    pub fn resolved_data_dir(&self) -> PathBuf {
        let raw = &self.storage.data_dir;
        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(raw)
    }
}

/// Default location of the config file under the user's home directory
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".signbridge")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validates_with_user_creds() {
        let mut config = SignbridgeConfig::default();
        assert!(config.validate().is_err()); // no credentials at all

        config.auth.username = Some("alice".into());
        config.auth.password = Some("secret".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_base_url() {
        let mut config = SignbridgeConfig::default();
        config.auth.username = Some("alice".into());
        config.auth.password = Some("secret".into());
        config.backend.base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = SignbridgeConfig::default();
        config.backend.base_url = "https://cms.example.com".into();
        config.backend.client_id = Some("app".into());
        config.backend.client_secret = Some("hunter2".into());
        config.save_to_file(&path).unwrap();

        let loaded = SignbridgeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.backend.base_url, "https://cms.example.com");
        assert_eq!(loaded.auth.expiry_margin_secs, 300);
        assert!(loaded.validate().is_ok());
    }
}
