use crate::cache::MetadataCache;
use crate::config::Config;
use crate::security::{SecretCodec, TokenVerifier};
use crate::storage::{QueueStore, RedbStore};
use crate::upstream::{
    ConfigResolver, ConnectionPool, OrthancClient, PacsClient, PacsError, RetryingFetcher,
};
use std::sync::Arc;
use std::time::Duration;

/// Services shared by every HTTP handler, built once at startup.
pub struct AppState {
    pub proxy_id: String,
    /// Public prefix the gateway is reachable under; empty when served at root.
    pub mount_path: String,
    pub resolver: Arc<ConfigResolver>,
    pub fetcher: RetryingFetcher,
    pub cache: Arc<MetadataCache>,
    pub tokens: TokenVerifier,
    pub codec: Arc<SecretCodec>,
    pub pacs: Arc<dyn PacsClient>,
    pub queue: Arc<dyn QueueStore>,
    pub archive_timeout: Duration,
    pub queue_list_limit: usize,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<RedbStore>) -> Result<Self, PacsError> {
        let pool = ConnectionPool::new(&config.pacs)?;
        let codec = Arc::new(SecretCodec::new(&config.security.encryption_key));
        let resolver = Arc::new(ConfigResolver::new(
            config.pacs.clone(),
            store.clone(),
            codec.clone(),
            pool,
        ));
        let fetcher = RetryingFetcher::new(
            config.pacs.retry_attempts,
            Duration::from_millis(config.pacs.retry_backoff_ms),
        );

        Ok(Self {
            proxy_id: config.proxy.id.clone(),
            mount_path: config.proxy.mount_path.clone(),
            resolver,
            fetcher: fetcher.clone(),
            cache: Arc::new(MetadataCache::new(
                Duration::from_secs(config.cache.ttl_secs),
                config.cache.max_entries,
                config.cache.max_entry_bytes,
            )),
            tokens: TokenVerifier::new(&config.security.jwt_secret),
            codec,
            pacs: Arc::new(OrthancClient::new(fetcher)),
            queue: store,
            archive_timeout: Duration::from_secs(config.pacs.archive_timeout_secs),
            queue_list_limit: config.queue.list_limit,
        })
    }
}
