use super::forward::{
    buffer_response, buffered_response, strip_proxy_params, stream_response, tenant_from,
    upstream_path, UpstreamRequest, IMMUTABLE, NO_STORE,
};
use super::rewriter::{needs_rewrite, rewrite_viewer_content};
use crate::error::ProxyError;
use crate::state::AppState;
use axum::extract::{Path, RawQuery, State};
use axum::response::Response;
use bytes::Bytes;
use http::{header, HeaderMap, Method};
use std::sync::Arc;

/// Rewritten assets depend on the tenant, so the browser must revalidate.
const NO_CACHE: &str = "no-cache";

const REWRITABLE_EXTENSIONS: [&str; 4] = ["html", "js", "mjs", "json"];

/// `GET /ohif` and `GET /ohif/`: the viewer's index page.
pub async fn ohif_index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    serve_asset(&state, "", &headers, query.as_deref()).await
}

/// `GET /ohif/{*path}`: viewer static assets and client-side routes.
pub async fn ohif_asset(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    serve_asset(&state, &path, &headers, query.as_deref()).await
}

async fn serve_asset(
    state: &AppState,
    path: &str,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response, ProxyError> {
    if path.ends_with(".map") {
        return Err(ProxyError::NotFound("Source maps are not served".to_string()));
    }

    let entry_point = is_entry_point(path);
    if entry_point {
        let user = state.tokens.authenticate(headers, query)?;
        tracing::debug!(user_id = %user.id, path, "Viewer entry point requested");
    }

    let tenant = tenant_from(headers, query);
    let forwarded_query = strip_proxy_params(query);
    let target = state.resolver.resolve(tenant.as_deref()).await;

    let response = UpstreamRequest::new(
        &target,
        Method::GET,
        upstream_path("/ohif", path, forwarded_query.as_deref()),
    )
    .with_client_headers(headers)
    .send(&state.fetcher)
    .await?;

    if !response.status().is_success() {
        return Ok(stream_response(response, None));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !entry_point && !is_rewritable(path, &content_type) {
        return Ok(stream_response(response, Some(IMMUTABLE)));
    }

    let mut buffered = buffer_response(response).await?;
    let text = match std::str::from_utf8(&buffered.body) {
        Ok(text) if needs_rewrite(text) => {
            Some(rewrite_viewer_content(text, &state.mount_path, tenant.as_deref()))
        }
        _ => None,
    };

    let policy = match (&text, entry_point) {
        (_, true) => NO_STORE,
        (Some(_), false) => NO_CACHE,
        (None, false) => IMMUTABLE,
    };
    if let Some(text) = text {
        buffered.body = Bytes::from(text);
        buffered
            .headers
            .retain(|(name, _)| name != header::ETAG && name != header::LAST_MODIFIED);
    }
    Ok(buffered_response(buffered, policy, None))
}

/// HTML documents and extension-less client routes such as `viewer`.
fn is_entry_point(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    last.is_empty() || last.ends_with(".html") || !last.contains('.')
}

fn is_rewritable(path: &str, content_type: &str) -> bool {
    let by_extension = path
        .rsplit_once('.')
        .map(|(_, ext)| REWRITABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    by_extension
        || content_type.contains("html")
        || content_type.contains("javascript")
        || content_type.contains("json")
}
