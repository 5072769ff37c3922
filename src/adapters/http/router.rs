use crate::state::AppState;
use crate::{proxy, queue};
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Build the gateway router: proxy and queue routes under the configured
/// mount path, plus an unauthenticated health check at the root.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = proxy::routes().merge(queue::routes());
    let app = if state.mount_path.is_empty() {
        api
    } else {
        Router::new().nest(&state.mount_path, api)
    };

    app.route("/health", get(health))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "id": state.proxy_id }))
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), elapsed_ms, "Request failed");
    } else {
        tracing::debug!(%method, %path, status = status.as_u16(), elapsed_ms, "Request served");
    }
    response
}
