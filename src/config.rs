use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_COUNTRY, DEFAULT_CUSTOM_FIELD_SLOT, DEFAULT_NOTES, DEFAULT_PASSWORD_LENGTH,
    DEFAULT_THROTTLE_MS, MIN_PASSWORD_LENGTH,
};
use crate::error::{ImportError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "importer.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub api: ApiConfig,
    pub import: ImportSettings,
}

/// How the tax ID is sent in the create call. Exactly one encoding is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldEncoding {
    /// `customfield1=<digits>`
    #[default]
    Flat,
    /// `customfield[1]=<digits>`
    Indexed,
}

/// Bounded retry for transport failures on read-only actions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 0, backoff_ms: 1000 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), growing linearly.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(attempt as u64))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub identifier: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub skip_remote_validation: bool,
    pub custom_field_encoding: CustomFieldEncoding,
    pub custom_field_slot: u32,
    pub password_length: usize,
    pub retry: RetryPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            identifier: String::new(),
            secret: String::new(),
            timeout_secs: 30,
            accept_invalid_certs: false,
            skip_remote_validation: true,
            custom_field_encoding: CustomFieldEncoding::default(),
            custom_field_slot: DEFAULT_CUSTOM_FIELD_SLOT,
            password_length: DEFAULT_PASSWORD_LENGTH,
            retry: RetryPolicy::default(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ImportError::Config("api.url is not set".into()));
        }
        if self.identifier.trim().is_empty() || self.secret.trim().is_empty() {
            return Err(ImportError::Config("api.identifier and api.secret are required".into()));
        }
        if self.password_length < MIN_PASSWORD_LENGTH {
            return Err(ImportError::Config(format!(
                "api.password_length must be at least {}",
                MIN_PASSWORD_LENGTH
            )));
        }
        if self.custom_field_slot == 0 {
            return Err(ImportError::Config("api.custom_field_slot starts at 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub throttle_ms: u64,
    pub log_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub default_country: Option<String>,
    pub default_notes: Option<String>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            throttle_ms: DEFAULT_THROTTLE_MS,
            log_dir: PathBuf::from("logs"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            default_country: Some(DEFAULT_COUNTRY.to_string()),
            default_notes: Some(DEFAULT_NOTES.to_string()),
        }
    }
}

impl ImportSettings {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ImportError::Config("import.batch_size must be greater than zero".into()));
        }
        Ok(())
    }
}

impl ImporterConfig {
    /// Loads the TOML file (when present) and applies environment overrides.
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| {
                ImportError::Config(format!("Failed to read config file '{}': {}", config_path.display(), e))
            })?;
            debug!("Loaded configuration from {}", config_path.display());
            Self::from_toml(&content)?
        } else if required {
            return Err(ImportError::Config(format!(
                "config file '{}' not found",
                config_path.display()
            )));
        } else {
            Self::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("IMPORTER_API_URL") {
            self.api.url = url;
        }
        if let Ok(identifier) = env::var("IMPORTER_API_IDENTIFIER") {
            self.api.identifier = identifier;
        }
        if let Ok(secret) = env::var("IMPORTER_API_SECRET") {
            self.api.secret = secret;
        }
        if let Ok(size) = env::var("IMPORTER_BATCH_SIZE") {
            self.import.batch_size = size
                .parse()
                .map_err(|e| ImportError::Config(format!("Invalid IMPORTER_BATCH_SIZE: {}", e)))?;
        }
        if let Ok(ms) = env::var("IMPORTER_THROTTLE_MS") {
            self.import.throttle_ms = ms
                .parse()
                .map_err(|e| ImportError::Config(format!("Invalid IMPORTER_THROTTLE_MS: {}", e)))?;
        }
        Ok(())
    }
}
