//! TOML-based application configuration.
//!
//! Stores the settings read by the gating pipeline:
//! - Monitored site patterns
//! - Admin allow-list mode
//! - Remote authority URL and subscriber email
//! - Intervention prompt, redirect target, local override and lockout
//! - Fatigue alert threshold and ledger retention
//!
//! Configuration is stored at `~/.config/guardian/config.toml`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::data_dir;
use crate::display::{DEFAULT_PROMPT, DEFAULT_REDIRECT_URL};
use crate::error::{ConfigError, CoreError, ValidationError};
use crate::fatigue::DEFAULT_THRESHOLD;
use crate::gating::GatingContext;
use crate::identity::AuthorizationConfig;
use crate::ledger::DEFAULT_RETENTION_DAYS;
use crate::matcher::{MonitoredSiteSet, DEFAULT_MONITORED_SITES};

/// Monitored-site configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitesConfig {
    #[serde(default = "default_monitored_sites")]
    pub monitored: Vec<String>,
}

/// Admin allow-list configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

/// Remote authority configuration. Leaving `url` or `user_email` empty
/// selects soft-degrade gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Prompt and local-override configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionConfig {
    #[serde(default)]
    pub override_enabled: bool,
    #[serde(default = "default_prompt_text")]
    pub prompt_text: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Epoch milliseconds until which prompts are replaced by a lockout notice.
    #[serde(default)]
    pub lockout_until: Option<i64>,
}

/// Fatigue scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatigueConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Days of ledger history to keep; 0 keeps everything.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/guardian/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sites: SitesConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub intervention: InterventionConfig,
    #[serde(default)]
    pub fatigue: FatigueConfig,
}

// Default functions
fn default_monitored_sites() -> Vec<String> {
    DEFAULT_MONITORED_SITES.iter().map(|s| s.to_string()).collect()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_prompt_text() -> String {
    DEFAULT_PROMPT.into()
}
fn default_redirect_url() -> String {
    DEFAULT_REDIRECT_URL.into()
}
fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            monitored: default_monitored_sites(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user_email: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            override_enabled: false,
            prompt_text: default_prompt_text(),
            redirect_url: default_redirect_url(),
            lockout_until: None,
        }
    }
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            retention_days: default_retention_days(),
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn parse_leaf(
        existing: &serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<serde_json::Value, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        if value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("null") {
            return Ok(serde_json::Value::Null);
        }

        let parsed = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
            ),
            serde_json::Value::Number(_) => {
                if let Ok(n) = value.parse::<i64>() {
                    serde_json::Value::Number(n.into())
                } else if let Ok(n) = value.parse::<f64>() {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                } else {
                    return Err(invalid(format!("cannot parse '{value}' as number")));
                }
            }
            serde_json::Value::Array(_) if !value.trim_start().starts_with('[') => {
                // Comma-separated shorthand: "a.com, b.com"
                serde_json::Value::Array(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| serde_json::Value::String(s.to_string()))
                        .collect(),
                )
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            // Unset optional values take whatever the text parses as.
            serde_json::Value::Null => {
                if let Ok(b) = value.parse::<bool>() {
                    serde_json::Value::Bool(b)
                } else if let Ok(n) = value.parse::<i64>() {
                    serde_json::Value::Number(n.into())
                } else {
                    serde_json::Value::String(value.into())
                }
            }
            serde_json::Value::String(_) => serde_json::Value::String(value.into()),
        };
        Ok(parsed)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;
                let new_value = Self::parse_leaf(existing, key, value)?;
                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), CoreError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// key's type.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check values that the type system cannot: the server URL must be an
    /// http(s) URL and the email must look like one. Empty means unset.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(server) = self.server_url() {
            let ok = Url::parse(&server)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
                .unwrap_or(false);
            if !ok {
                return Err(ValidationError::InvalidValue {
                    field: "server.url".into(),
                    message: format!("'{server}' is not an http(s) URL"),
                });
            }
        }
        if let Some(email) = self.user_email() {
            if !email.contains('@') {
                return Err(ValidationError::InvalidValue {
                    field: "server.user_email".into(),
                    message: format!("'{email}' is not an email address"),
                });
            }
        }
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        self.apply(key, value)?;
        self.save()
    }

    pub fn monitored_sites(&self) -> MonitoredSiteSet {
        MonitoredSiteSet::from_patterns(&self.sites.monitored)
    }

    pub fn auth_config(&self) -> AuthorizationConfig {
        AuthorizationConfig {
            admin_mode_enabled: self.admin.enabled,
            admin_device_ids: self
                .admin
                .device_ids
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    pub fn server_url(&self) -> Option<String> {
        non_blank(&self.server.url)
    }

    pub fn user_email(&self) -> Option<String> {
        non_blank(&self.server.user_email)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs.max(1))
    }

    pub fn prompt_text(&self) -> String {
        non_blank(&self.intervention.prompt_text).unwrap_or_else(default_prompt_text)
    }

    /// Build the context for one navigation to `url`.
    pub fn gating_context(&self, url: &str) -> GatingContext {
        GatingContext {
            url: url.to_string(),
            auth_config: self.auth_config(),
            monitored_sites: self.monitored_sites(),
            server_url: self.server_url(),
            user_email: self.user_email(),
            local_override_enabled: self.intervention.override_enabled,
            lockout_until: self
                .intervention
                .lockout_until
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            prompt_text: self.prompt_text(),
        }
    }
}
