//! Orthanc's native REST surface, forwarded verbatim for older clients.

use super::forward::{strip_proxy_params, stream_response, tenant_from, upstream_path, UpstreamRequest};
use crate::error::ProxyError;
use crate::state::AppState;
use axum::body::to_bytes;
use axum::extract::{Path, Request, State};
use axum::response::Response;
use std::sync::Arc;

const MAX_FORWARDED_BODY: usize = 512 * 1024 * 1024;

pub async fn orthanc_proxy(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let query = parts.uri.query();
    let tenant = tenant_from(&parts.headers, query);
    let forwarded_query = strip_proxy_params(query);
    let target = state.resolver.resolve(tenant.as_deref()).await;

    let body = to_bytes(body, MAX_FORWARDED_BODY)
        .await
        .map_err(|e| ProxyError::BadRequest(format!("Unreadable request body: {}", e)))?;

    let response = UpstreamRequest::new(
        &target,
        parts.method.clone(),
        upstream_path("/", &path, forwarded_query.as_deref()),
    )
    .with_client_headers(&parts.headers)
    .with_body(body)
    .send(&state.fetcher)
    .await?;

    Ok(stream_response(response, None))
}
