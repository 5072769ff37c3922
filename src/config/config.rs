use super::{
    CacheConfig, ClinicSeed, LoggingConfig, NetworkConfig, PacsConfig, ProxyConfig, QueueConfig,
    SecurityConfig,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub pacs: PacsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub clinics: HashMap<String, ClinicSeed>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Proxy id must not be empty")]
    InvalidProxyID,
    #[error("Mount path '{0}' must start with '/' and must not end with '/'")]
    InvalidMountPath(String),
    #[error("Invalid PACS url '{url}': {reason}")]
    InvalidPacsUrl { url: String, reason: String },
    #[error("Invalid clinic '{name}': {reason}")]
    InvalidClinic { name: String, reason: String },
    #[error("Cache capacity must be greater than zero")]
    InvalidCacheCapacity,
    #[error("Queue tick interval must be greater than zero")]
    InvalidTickInterval,
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Entry point used by the binary: `--config <path>`.
    pub fn from_args() -> Result<Self, ConfigError> {
        let cli = super::Cli::from_args();
        Self::load(&cli.config_path)
    }

    /// Overlay secrets and deployment knobs that are usually injected by the
    /// environment rather than committed to the config file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PACS_URL") {
            self.pacs.url = url;
        }
        if let Some(username) = lookup("PACS_USERNAME") {
            self.pacs.username = username;
        }
        if let Some(password) = lookup("PACS_PASSWORD") {
            self.pacs.password = password;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.security.jwt_secret = secret;
        }
        if let Some(key) = lookup("ENCRYPTION_KEY") {
            self.security.encryption_key = key;
        }
        if let Some(port) = lookup("GATEWAY_BIND_PORT").and_then(|p| p.parse().ok()) {
            self.network.http.bind_port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.id.trim().is_empty() {
            return Err(ConfigError::InvalidProxyID);
        }

        let mount = &self.proxy.mount_path;
        if !mount.is_empty() && (!mount.starts_with('/') || mount.ends_with('/')) {
            return Err(ConfigError::InvalidMountPath(mount.clone()));
        }

        validate_upstream_url(&self.pacs.url).map_err(|reason| ConfigError::InvalidPacsUrl {
            url: self.pacs.url.clone(),
            reason,
        })?;

        for (name, clinic) in &self.clinics {
            validate_upstream_url(&clinic.url).map_err(|reason| ConfigError::InvalidClinic {
                name: name.clone(),
                reason,
            })?;
        }
        if self.clinics.values().filter(|c| c.default).count() > 1 {
            return Err(ConfigError::InvalidClinic {
                name: "*".to_string(),
                reason: "at most one clinic may be marked default".to_string(),
            });
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidCacheCapacity);
        }
        if self.queue.tick_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::MissingSetting("security.jwt_secret"));
        }
        if self.security.encryption_key.is_empty() {
            return Err(ConfigError::MissingSetting("security.encryption_key"));
        }
        Ok(())
    }
}

fn validate_upstream_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| e.to_string())?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}
