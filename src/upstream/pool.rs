use super::PacsError;
use crate::config::PacsConfig;
use std::time::Duration;

/// Two long-lived keep-alive clients shared by every outbound PACS call.
///
/// Sized for a browser issuing 6-10 parallel frame requests per viewer, across
/// several concurrent viewers.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    plain: reqwest::Client,
    tls: reqwest::Client,
}

impl ConnectionPool {
    pub fn new(config: &PacsConfig) -> Result<Self, PacsError> {
        let plain = Self::base_builder(config)
            .build()
            .map_err(|e| PacsError::Setup(e.to_string()))?;

        let tls = Self::base_builder(config)
            .use_rustls_tls()
            .https_only(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| PacsError::Setup(e.to_string()))?;

        tracing::debug!(
            "Connection pool ready (max idle per host: {}, timeout: {}s)",
            config.max_idle_per_host,
            config.timeout_secs
        );
        Ok(Self { plain, tls })
    }

    fn base_builder(config: &PacsConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(concat!("pacs-gateway/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Client matching the scheme of `base_url`.
    pub fn client_for(&self, base_url: &str) -> reqwest::Client {
        if base_url.trim_start().to_ascii_lowercase().starts_with("https://") {
            self.tls.clone()
        } else {
            self.plain.clone()
        }
    }
}
