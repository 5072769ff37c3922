//! DICOMweb pass-through, the hot path of the viewer.

use super::forward::{
    buffer_response, buffered_response, strip_proxy_params, stream_response, tenant_from,
    upstream_path, UpstreamRequest, IMMUTABLE, REVALIDATE,
};
use crate::cache::cache_key;
use crate::error::ProxyError;
use crate::state::AppState;
use axum::body::to_bytes;
use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use http::{header, HeaderValue, Method, StatusCode};
use std::sync::Arc;

/// Largest request body forwarded on STOW and other writes.
const MAX_FORWARDED_BODY: usize = 512 * 1024 * 1024;

/// Path segments whose responses are pixel data or other binary payloads.
/// These are left to the browser cache and never held server-side.
const BINARY_MARKERS: [&str; 4] = ["/frames/", "/rendered", "/thumbnail", "/bulkdata/"];

pub fn is_binary_path(path: &str) -> bool {
    let path = format!("/{}", path.trim_start_matches('/'));
    BINARY_MARKERS.iter().any(|marker| {
        path.contains(marker) || (marker.ends_with('/') && path.ends_with(&marker[..marker.len() - 1]))
    })
}

pub async fn dicomweb_proxy(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    if parts.method == Method::OPTIONS {
        return Ok(preflight());
    }

    let query = parts.uri.query();
    let tenant = tenant_from(&parts.headers, query);
    let forwarded_query = strip_proxy_params(query);
    let target = state.resolver.resolve(tenant.as_deref()).await;
    let upstream = UpstreamRequest::new(
        &target,
        parts.method.clone(),
        upstream_path("/dicom-web", &path, forwarded_query.as_deref()),
    )
    .with_client_headers(&parts.headers);

    if parts.method != Method::GET {
        let body = to_bytes(body, MAX_FORWARDED_BODY)
            .await
            .map_err(|e| ProxyError::BadRequest(format!("Unreadable request body: {}", e)))?;
        let response = upstream.with_body(body).send(&state.fetcher).await?;
        return Ok(stream_response(response, None));
    }

    if is_binary_path(&path) {
        let response = upstream.send(&state.fetcher).await?;
        return Ok(stream_response(response, Some(IMMUTABLE)));
    }

    let key = cache_key(
        target.clinic_id.as_deref(),
        &format!("/dicom-web/{}", path),
        query,
    );
    if let Some(hit) = state.cache.get(&key) {
        tracing::debug!(path = %path, clinic_id = ?target.clinic_id, "Metadata cache hit");
        return Ok(buffered_response(hit, REVALIDATE, Some("HIT")));
    }

    let response = upstream.send(&state.fetcher).await?;
    if !response.status().is_success() {
        return Ok(stream_response(response, None));
    }

    let buffered = buffer_response(response).await?;
    state.cache.insert(key, buffered.clone());
    Ok(buffered_response(buffered, REVALIDATE, Some("MISS")))
}

fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type, Accept, Range, X-Clinic-Id"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}
