//! Connection settings and their fallback rules.
//!
//! # Design
//! Process-wide defaults are an explicit `ClientDefaults` value rather than
//! shared state. A `ConnectionConfig` names only the fields a connection
//! overrides; `resolve` fills the rest from the defaults and yields an
//! immutable `Settings` that every request reads.

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5984;

const ENV_HOST: &str = "COUCHDB_HOST";
const ENV_PORT: &str = "COUCHDB_PORT";
const ENV_USER: &str = "COUCHDB_USER";
const ENV_PASSWORD: &str = "COUCHDB_PASSWORD";
const ENV_NO_COUCH_RELATED: &str = "COUCHDB_NO_COUCH_RELATED";

/// Fallback values for every connection field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDefaults {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Hide databases whose names start with `_` from `list_databases`.
    pub no_couch_related: bool,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            no_couch_related: false,
        }
    }
}

impl ClientDefaults {
    /// Built-in defaults overlaid with `COUCHDB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut defaults = Self::default();
        if let Some(host) = lookup(ENV_HOST) {
            defaults.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            defaults.port = port.trim().parse().map_err(|_| ConfigError::InvalidPort {
                variable: ENV_PORT,
                value: port.clone(),
            })?;
        }
        if let Some(username) = lookup(ENV_USER) {
            defaults.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            defaults.password = password;
        }
        if let Some(flag) = lookup(ENV_NO_COUCH_RELATED) {
            defaults.no_couch_related = parse_flag(&flag).ok_or(ConfigError::InvalidFlag {
                variable: ENV_NO_COUCH_RELATED,
                value: flag.clone(),
            })?;
        }
        Ok(defaults)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Per-connection overrides. Unset fields fall back to [`ClientDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub no_couch_related: Option<bool>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn no_couch_related(mut self, hide: bool) -> Self {
        self.no_couch_related = Some(hide);
        self
    }

    pub fn resolve(self, defaults: &ClientDefaults) -> Settings {
        Settings {
            host: self.host.unwrap_or_else(|| defaults.host.clone()),
            port: self.port.unwrap_or(defaults.port),
            username: self.username.unwrap_or_else(|| defaults.username.clone()),
            password: self.password.unwrap_or_else(|| defaults.password.clone()),
            no_couch_related: self.no_couch_related.unwrap_or(defaults.no_couch_related),
        }
    }
}

/// Resolved, read-only connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub no_couch_related: bool,
}

impl Default for Settings {
    fn default() -> Self {
        ConnectionConfig::default().resolve(&ClientDefaults::default())
    }
}

impl Settings {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }
}
