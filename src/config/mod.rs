mod logging_config;
mod pacs_config;
mod proxy_config;
pub mod config;

pub use config::{Config, ConfigError};
pub use logging_config::LoggingConfig;
pub use pacs_config::{CacheConfig, ClinicSeed, PacsConfig, QueueConfig, SecurityConfig};
pub use proxy_config::{HttpConfig, NetworkConfig, ProxyConfig};

use clap::Parser;

/// Structure representing application startup arguments.
#[derive(Parser, Debug)]
#[command(name = "pacs-gateway", version, about = "DICOMweb/Orthanc gateway with a send queue")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long = "config", default_value = "config.toml")]
    pub config_path: String,
}

impl Cli {
    /// Parse the process arguments, exiting with usage on error.
    pub fn from_args() -> Self {
        Self::parse()
    }
}
