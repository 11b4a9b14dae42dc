//! Client configuration and store credentials.
//!
//! Values are taken, in order of priority, from what the caller passes
//! explicitly, from the environment, and from a TOML file:
//!
//! ```toml
//! [store]
//! server_url = "https://store.example.org"
//! access_key = "dXNlckBleGFtcGxlLm9yZzpzM2NyM3Q="
//! client_name = "annotate-core"
//! ```
//!
//! The access key is the base64 encoding of `username:password`.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

pub const ENV_SERVER_URL: &str = "ANNOTATE_SERVER_URL";
pub const ENV_ACCESS_KEY: &str = "ANNOTATE_ACCESS_KEY";
pub const ENV_CLIENT_NAME: &str = "ANNOTATE_CLIENT_NAME";

const DEFAULT_CLIENT_NAME: &str = "annotate-core";

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    Parse(String),

    #[error("Missing required value: {0}")]
    Missing(&'static str),

    #[error("Invalid access key: {0}")]
    InvalidAccessKey(String),
}

/// Username and password for a store account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Decode a base64 `username:password` access key.
    pub fn from_access_key(key: &str) -> Result<Self, ConfigError> {
        let bytes = STANDARD
            .decode(key.trim())
            .map_err(|e| ConfigError::InvalidAccessKey(e.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::InvalidAccessKey("not valid UTF-8".into()))?;
        let (username, password) = text
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidAccessKey("expected username:password".into()))?;
        if username.is_empty() {
            return Err(ConfigError::InvalidAccessKey("empty username".into()));
        }
        Ok(Self::new(username, password))
    }

    pub fn to_access_key(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    store: TomlStore,
}

#[derive(Debug, Deserialize, Default)]
struct TomlStore {
    server_url: Option<String>,
    access_key: Option<String>,
    client_name: Option<String>,
}

/// Settings needed to reach a store and log in.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: Option<String>,
    pub access_key: Option<String>,
    pub client_name: Option<String>,
}

impl ClientConfig {
    /// Standard config file: `<config dir>/annotate/config.toml`.
    pub fn standard_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("annotate").join("config.toml"))
    }

    /// Load from the standard file (if present) overlaid with the environment.
    pub fn load_standard() -> Result<Self, ConfigError> {
        let mut config = match Self::standard_path() {
            Some(path) if path.exists() => Self::load_from_toml(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let toml: TomlConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self {
            server_url: toml.store.server_url,
            access_key: toml.store.access_key,
            client_name: toml.store.client_name,
        })
    }

    /// Override with any variables `lookup` finds.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.server_url = Some(url);
        }
        if let Some(key) = lookup(ENV_ACCESS_KEY) {
            self.access_key = Some(key);
        }
        if let Some(name) = lookup(ENV_CLIENT_NAME) {
            self.client_name = Some(name);
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    pub fn server_url(&self) -> Result<&str, ConfigError> {
        self.server_url.as_deref().ok_or(ConfigError::Missing("server_url"))
    }

    pub fn client_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or(DEFAULT_CLIENT_NAME)
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let key = self
            .access_key
            .as_deref()
            .ok_or(ConfigError::Missing("access_key"))?;
        Credentials::from_access_key(key)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("client_name", &self.client_name)
            .finish()
    }
}
