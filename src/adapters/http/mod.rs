use crate::state::AppState;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod router;

pub use router::build_router;

/// HTTP listener for the gateway.
///
/// Binds eagerly so startup fails loudly on a taken port, then serves until
/// the shutdown token is cancelled.
pub struct HttpAdapter {
    pub bind_addr: SocketAddr,
}

impl HttpAdapter {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }

    pub async fn start(
        &self,
        state: Arc<AppState>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<JoinHandle<()>> {
        let app: Router = build_router(state);
        let listener = TcpListener::bind(self.bind_addr).await?;
        let bind_addr = listener.local_addr()?;

        tracing::info!("🚀 HTTP server listening on {}", bind_addr);

        Ok(tokio::spawn(async move {
            let graceful_shutdown = async move {
                shutdown.cancelled().await;
            };

            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful_shutdown)
                .await
            {
                tracing::error!("HTTP server on {} encountered error: {}", bind_addr, e);
            }

            tracing::info!("HTTP server on {} shut down", bind_addr);
        }))
    }

    pub fn summary(&self) -> String {
        format!("HttpAdapter(bind={})", self.bind_addr)
    }
}
