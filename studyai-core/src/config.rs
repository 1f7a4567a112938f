//! Client configuration.
//!
//! Loaded from `config.toml` in the platform configuration directory, or from
//! an explicit path. Every field has a default, so a missing file is not an
//! error. `STUDYAI_API_BASE` overrides the configured base URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const API_BASE_ENV: &str = "STUDYAI_API_BASE";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ClientConfig`].
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The base URL cannot be used to build request URLs.
    #[error("invalid base URL {url:?}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    /// A field has an unusable value.
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Which backend holds the durable lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurableBackend {
    /// JSON file at [`ClientConfig::session_file`].
    #[default]
    File,

    /// OS keyring.
    Keyring,

    /// No durable persistence at all.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the remote API.
    pub base_url: String,

    pub login_path: String,
    pub register_path: String,
    pub refresh_path: String,

    /// Timeout applied to every ordinary request.
    pub request_timeout_secs: u64,

    /// Timeout applied to the refresh exchange; bounds how long queued
    /// requests can stay suspended.
    pub refresh_timeout_secs: u64,

    pub durable_backend: DurableBackend,

    /// Backing file when `durable_backend = "file"`.
    pub session_file: PathBuf,

    /// Logging level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let session_file = project_dirs()
            .map(|d| d.data_dir().join("session.json"))
            .unwrap_or_else(|| PathBuf::from(".studyai-session.json"));

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: "/auth/login".to_string(),
            register_path: "/auth/register".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            request_timeout_secs: 30,
            refresh_timeout_secs: 10,
            durable_backend: DurableBackend::default(),
            session_file,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at the given base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Default location of `config.toml`.
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("studyai.toml"))
    }

    /// Load from the default location, applying the environment override.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&Self::default_path())
    }

    /// Load from a specific path, applying the environment override.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            ClientConfig::default()
        };

        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                config.base_url = base;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url()?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.refresh_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        for (field, value) in [
            ("login_path", &self.login_path),
            ("register_path", &self.register_path),
            ("refresh_path", &self.refresh_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("{:?} must start with '/'", value),
                });
            }
        }
        Ok(())
    }

    /// Parse the base URL.
    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                message: "cannot be used as a base".to_string(),
            });
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "studyai")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert_eq!(config.durable_backend, DurableBackend::File);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "base_url = \"https://api.example.com\"\ndurable_backend = \"keyring\"\n",
        )
        .unwrap();

        let config = ClientConfig::load_from_path(&path).unwrap();
        if std::env::var(API_BASE_ENV).is_err() {
            assert_eq!(config.base_url, "https://api.example.com");
        }
        assert_eq!(config.durable_backend, DurableBackend::Keyring);
        assert_eq!(config.refresh_timeout_secs, 10);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "request_timeout_secs = \"soon\"").unwrap();

        let result = ClientConfig::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ClientConfig {
            refresh_timeout_secs: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "refresh_timeout_secs", .. })
        ));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let config = ClientConfig::with_base_url("not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }
}
