pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod queue;
pub mod security;
pub mod state;
pub mod storage;
pub mod upstream;

use crate::adapters::http::HttpAdapter;
use crate::config::Config;
use crate::models::ClinicConfig;
use crate::queue::{QueueDispatcher, SystemClock};
use crate::security::SecretCodec;
use crate::state::AppState;
use crate::storage::ClinicStore;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{prelude::*, EnvFilter};

pub async fn run(config: Config) -> anyhow::Result<()> {
    init_logging(&config)?;

    tracing::info!("🔧 Starting PACS gateway '{}'", config.proxy.id);

    let store = storage::open_store(&config.proxy.store_path)
        .with_context(|| format!("Failed to open store at '{}'", config.proxy.store_path))?;
    tracing::info!("🗄️ Store opened at {}", config.proxy.store_path);

    let state = Arc::new(AppState::new(&config, store.clone())?);
    seed_clinics(&config, store.as_ref(), &state.codec).await;

    let dispatcher = if config.queue.enabled {
        let dispatcher = Arc::new(QueueDispatcher::new(
            state.queue.clone(),
            state.pacs.clone(),
            state.resolver.clone(),
            Arc::new(SystemClock),
            Duration::from_millis(config.queue.tick_ms),
        ));
        dispatcher.start();
        Some(dispatcher)
    } else {
        tracing::info!("Queue dispatcher disabled");
        None
    };

    let addr: SocketAddr = format!(
        "{}:{}",
        config.network.http.bind_address, config.network.http.bind_port
    )
    .parse()
    .context("Invalid bind address or port")?;

    let shutdown = CancellationToken::new();
    let sweeper = state.cache.spawn_sweeper(shutdown.child_token());
    let adapter = HttpAdapter::new(addr);
    tracing::debug!("Starting {}", adapter.summary());
    let server = adapter.start(state, shutdown.clone()).await?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server.await?;
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("Cache sweeper ended abnormally: {}", e);
    }
    if let Some(dispatcher) = dispatcher {
        dispatcher.stop().await;
    }
    tracing::info!("👋 PACS gateway '{}' stopped", config.proxy.id);
    Ok(())
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.proxy.log_level))
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter());

    if config.logging.log_to_file {
        let file = std::fs::File::create(&config.logging.log_file_path).with_context(|| {
            format!("Failed to create log file '{}'", config.logging.log_file_path)
        })?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(filter());

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry().with(stdout_layer).try_init()?;
    }
    Ok(())
}

/// Write the clinics declared in the config file to the clinic store,
/// encrypting plaintext passwords on the way in.
async fn seed_clinics(config: &Config, store: &dyn ClinicStore, codec: &SecretCodec) {
    for (id, seed) in &config.clinics {
        let encrypted_password = if seed.password.is_empty() || SecretCodec::is_encrypted(&seed.password) {
            seed.password.clone()
        } else {
            match codec.encrypt(&seed.password) {
                Some(encrypted) => encrypted,
                None => {
                    tracing::error!(clinic_id = %id, "Could not encrypt clinic password, skipping");
                    continue;
                }
            }
        };

        let clinic = ClinicConfig {
            id: id.clone(),
            url: seed.url.clone(),
            username: seed.username.clone(),
            encrypted_password,
            is_default: seed.default,
        };
        match store.upsert_clinic(&clinic).await {
            Ok(()) => tracing::info!(clinic_id = %id, url = %clinic.url, "Clinic registered"),
            Err(e) => tracing::error!(clinic_id = %id, "Failed to store clinic: {}", e),
        }
    }
}
