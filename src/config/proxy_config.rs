use serde::Deserialize;

/// Represents the configuration for the proxy
#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    pub id: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Public path prefix the proxy routes are mounted under. Rewritten viewer
    /// assets point back at this prefix.
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            id: "pacs-gateway".to_string(),
            log_level: default_log_level(),
            mount_path: default_mount_path(),
            store_path: default_store_path(),
        }
    }
}

/// Default log level for the proxy configuration
fn default_log_level() -> String {
    "info".to_string()
}

fn default_mount_path() -> String {
    "/api/pacs".to_string()
}

/// Default redb file, resolved relative to the working directory
fn default_store_path() -> String {
    "./tmp/gateway.redb".to_string()
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct NetworkConfig {
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8080
}
