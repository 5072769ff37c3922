use serde::Deserialize;

/// Process-wide upstream defaults, used whenever a request carries no clinic
/// override (or the override cannot be resolved).
#[derive(Debug, Deserialize, Clone)]
pub struct PacsConfig {
    #[serde(default = "default_pacs_url")]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_archive_timeout_secs")]
    pub archive_timeout_secs: u64,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for PacsConfig {
    fn default() -> Self {
        Self {
            url: default_pacs_url(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
            archive_timeout_secs: default_archive_timeout_secs(),
            max_idle_per_host: default_max_idle_per_host(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            accept_invalid_certs: false,
        }
    }
}

fn default_pacs_url() -> String {
    "http://localhost:8042".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_archive_timeout_secs() -> u64 {
    300
}

// A viewer opens 6-10 parallel frame requests per study.
fn default_max_idle_per_host() -> usize {
    64
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_max_entries() -> usize {
    500
}

fn default_max_entry_bytes() -> usize {
    8 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tick_ms: default_tick_ms(),
            list_limit: default_list_limit(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_tick_ms() -> u64 {
    2000
}

fn default_list_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SecurityConfig {
    /// HS256 secret used to verify access tokens issued by the application.
    #[serde(default)]
    pub jwt_secret: String,
    /// Passphrase for the secret codec protecting stored PACS passwords.
    #[serde(default)]
    pub encryption_key: String,
}

/// Clinic record declared in the config file and written to the clinic store
/// at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ClinicSeed {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub default: bool,
}
