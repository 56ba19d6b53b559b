//! Configuration file parser for ~/.config/gdata/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the
//! file contains potential typos.
use crate::auth::{
    AuthSub, Authenticator, ClientLogin, Credentials, NoAuth, OAuth2, OAuth2Parameters,
};
use crate::transport::RequestSettings;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Overrides `developer_key`.
pub const DEVELOPER_KEY_ENV: &str = "GDATA_DEVELOPER_KEY";
/// Overrides `auth.token` (`auth.access_token` for OAuth 2.0).
pub const AUTH_TOKEN_ENV: &str = "GDATA_AUTH_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// The selected auth kind needs a key that is not set.
    #[error("Missing config key `{0}` for the selected auth kind")]
    MissingField(&'static str),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    #[default]
    None,
    ClientLogin,
    AuthSub,
    #[serde(rename = "oauth2")]
    OAuth2,
}

/// `[auth]` table.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub kind: AuthKind,
    pub username: Option<String>,
    pub password: Option<String>,
    pub account_type: Option<String>,
    /// ClientLogin or AuthSub token issued earlier.
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub token_type: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("kind", &self.kind)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("account_type", &self.account_type)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sent as the ClientLogin `source` and in the `User-Agent`.
    pub application_name: String,

    /// GData service code used for ClientLogin (e.g. `cp`, `cl`).
    pub service: String,

    pub protocol_major: u32,
    pub protocol_minor: u32,

    /// Retries for HTTP 500 responses.
    pub retries: u32,

    pub method_override: bool,
    pub strict_redirect: bool,

    /// Per-request timeout in seconds. 0 = no timeout.
    pub timeout_secs: u64,

    pub developer_key: Option<String>,

    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_name: env!("CARGO_PKG_NAME").to_string(),
            service: String::new(),
            protocol_major: 1,
            protocol_minor: 0,
            retries: 3,
            method_override: false,
            strict_redirect: false,
            timeout_secs: 30,
            developer_key: None,
            auth: AuthConfig::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("application_name", &self.application_name)
            .field("service", &self.service)
            .field("protocol_major", &self.protocol_major)
            .field("protocol_minor", &self.protocol_minor)
            .field("retries", &self.retries)
            .field("method_override", &self.method_override)
            .field("strict_redirect", &self.strict_redirect)
            .field("timeout_secs", &self.timeout_secs)
            .field(
                "developer_key",
                &self.developer_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("auth", &self.auth)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "application_name",
        "service",
        "protocol_major",
        "protocol_minor",
        "retries",
        "method_override",
        "strict_redirect",
        "timeout_secs",
        "developer_key",
        "auth",
    ];

    /// `~/.config/gdata/config.toml`, or `None` when `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("gdata")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            application = %config.application_name,
            auth = ?config.auth.kind,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Applies `GDATA_DEVELOPER_KEY` and `GDATA_AUTH_TOKEN` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup(DEVELOPER_KEY_ENV) {
            tracing::debug!(var = DEVELOPER_KEY_ENV, "Developer key taken from environment");
            self.developer_key = Some(key);
        }
        if let Some(token) = lookup(AUTH_TOKEN_ENV) {
            tracing::debug!(var = AUTH_TOKEN_ENV, "Auth token taken from environment");
            match self.auth.kind {
                AuthKind::OAuth2 => self.auth.access_token = Some(token),
                _ => self.auth.token = Some(token),
            }
        }
    }

    pub fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            application_name: self.application_name.clone(),
            protocol_major: self.protocol_major,
            protocol_minor: self.protocol_minor,
            retries: self.retries,
            method_override: self.method_override,
            strict_redirect: self.strict_redirect,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            developer_key: self
                .developer_key
                .as_ref()
                .map(|k| SecretString::from(k.clone())),
        }
    }

    /// Builds the authenticator selected by `[auth] kind`.
    pub fn authenticator(&self) -> Result<Arc<dyn Authenticator>, ConfigError> {
        let auth = &self.auth;
        let secret = |value: &Option<String>| value.as_ref().map(|v| SecretString::from(v.clone()));

        match auth.kind {
            AuthKind::None => Ok(Arc::new(NoAuth)),
            AuthKind::AuthSub => {
                let token = secret(&auth.token).ok_or(ConfigError::MissingField("auth.token"))?;
                Ok(Arc::new(AuthSub::new(token)))
            }
            AuthKind::ClientLogin => {
                let username = auth
                    .username
                    .clone()
                    .ok_or(ConfigError::MissingField("auth.username"))?;
                let token = secret(&auth.token);
                let password = match (secret(&auth.password), &token) {
                    (Some(password), _) => password,
                    // A seeded token needs no password until the server rejects it
                    (None, Some(_)) => SecretString::from(String::new()),
                    (None, None) => return Err(ConfigError::MissingField("auth.password")),
                };
                let mut credentials = Credentials::new(username, password);
                if let Some(account_type) = &auth.account_type {
                    credentials = credentials.with_account_type(account_type.clone());
                }
                let mut login =
                    ClientLogin::new(credentials, self.service.clone(), self.application_name.clone())?;
                if let Some(token) = token {
                    login = login.with_token(token);
                }
                Ok(Arc::new(login))
            }
            AuthKind::OAuth2 => {
                let access_token = secret(&auth.access_token)
                    .ok_or(ConfigError::MissingField("auth.access_token"))?;
                let token_type = auth.token_type.clone().unwrap_or_else(|| "Bearer".to_string());
                let params = OAuth2Parameters::from_access_token(access_token, token_type)?;
                Ok(Arc::new(OAuth2::new(params)))
            }
        }
    }
}
