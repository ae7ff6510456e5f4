//! Client configuration.
//!
//! Settings come from a TOML document, optionally narrowed to one named
//! table, and are then overridden from environment variables sharing a
//! prefix:
//!
//! ```toml
//! [production]
//! base_url = "https://example.cloud:19999"
//! api_version = "4.0"
//! verify_ssl = true
//! timeout = 120
//! client_id = "abc"
//! client_secret = "xyz"
//!
//! [production.headers]
//! x-request-source = "nightly-sync"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::session::DEFAULT_API_VERSION;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ENV_PREFIX: &str = "RESTBRIDGE";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no table named `{0}` in settings")]
    MissingSection(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub base_url: String,
    pub api_version: String,
    pub verify_ssl: bool,
    /// Whole-request timeout in seconds.
    pub timeout: u64,
    /// Sent as `User-Agent` when set.
    pub agent_tag: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            verify_ssl: true,
            timeout: DEFAULT_TIMEOUT_SECS,
            agent_tag: None,
            headers: BTreeMap::new(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl std::fmt::Debug for BridgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSettings")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("verify_ssl", &self.verify_ssl)
            .field("timeout", &self.timeout)
            .field("agent_tag", &self.agent_tag)
            .field("headers", &self.headers)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BridgeSettings {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    /// Parse a TOML document. With `section`, read that table; without it,
    /// use the root when it carries `base_url`, else the first table.
    pub fn from_toml_str(contents: &str, section: Option<&str>) -> Result<Self, SettingsError> {
        let root: toml::Table = toml::from_str(contents)?;
        let table = match section {
            Some(name) => match root.get(name) {
                Some(toml::Value::Table(t)) => t.clone(),
                _ => return Err(SettingsError::MissingSection(name.to_string())),
            },
            None if root.contains_key("base_url") => root,
            None => root
                .values()
                .find_map(|v| v.as_table().cloned())
                .unwrap_or_default(),
        };
        Ok(toml::Value::Table(table).try_into()?)
    }

    pub fn from_file(path: impl AsRef<Path>, section: Option<&str>) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents, section)
    }

    /// Override fields from `{prefix}_BASE_URL`, `{prefix}_API_VERSION`,
    /// `{prefix}_VERIFY_SSL`, `{prefix}_TIMEOUT`, `{prefix}_CLIENT_ID` and
    /// `{prefix}_CLIENT_SECRET`.
    pub fn apply_env(self, prefix: &str) -> Result<Self, SettingsError> {
        self.apply_overrides(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_overrides(
        mut self,
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let get = |name: &str| {
            let key = format!("{prefix}_{name}");
            lookup(&key).map(|v| (key, unquote(&v).to_string()))
        };

        if let Some((_, v)) = get("BASE_URL") {
            self.base_url = v;
        }
        if let Some((_, v)) = get("API_VERSION") {
            self.api_version = v;
        }
        if let Some((key, v)) = get("VERIFY_SSL") {
            self.verify_ssl = parse_bool(&v).ok_or(SettingsError::InvalidValue { key, value: v })?;
        }
        if let Some((key, v)) = get("TIMEOUT") {
            self.timeout = v
                .parse()
                .map_err(|_| SettingsError::InvalidValue { key, value: v })?;
        }
        if let Some((_, v)) = get("CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some((_, v)) = get("CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        Ok(self)
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_version.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
