//! Request/response plumbing shared by the pass-through routes.

use crate::cache::{CachedResponse, PROXY_PARAMS};
use crate::upstream::{PacsError, ResolvedTarget, RetryingFetcher};
use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use std::time::Duration;

/// Header a browser or API client can use instead of `?clinicId=`.
pub const CLINIC_HEADER: &str = "x-clinic-id";

pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const REVALIDATE: &str = "private, max-age=60, must-revalidate";
pub const NO_STORE: &str = "no-store";

static FORWARDED_REQUEST_HEADERS: [HeaderName; 5] = [
    header::ACCEPT,
    header::CONTENT_TYPE,
    header::RANGE,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
];

static FORWARDED_RESPONSE_HEADERS: [HeaderName; 7] = [
    header::CONTENT_TYPE,
    header::CONTENT_DISPOSITION,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::CONTENT_ENCODING,
    header::ETAG,
    header::LAST_MODIFIED,
];

/// Tenant for this request: `clinicId` query parameter first, then header.
pub fn tenant_from(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_query = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "clinicId")
            .map(|(_, v)| v.trim().to_string())
    });
    from_query
        .or_else(|| {
            headers
                .get(CLINIC_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        })
        .filter(|id| !id.is_empty())
}

/// Drop the gateway's own query parameters, leaving every other pair exactly
/// as the client encoded it.
pub fn strip_proxy_params(query: Option<&str>) -> Option<String> {
    let kept: Vec<&str> = query?
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            let key = urlencoding::decode(key)
                .map(|k| k.into_owned())
                .unwrap_or_else(|_| key.to_string());
            !PROXY_PARAMS.contains(&key.as_str())
        })
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

/// Upstream path and query for `rest` below `prefix`.
pub fn upstream_path(prefix: &str, rest: &str, query: Option<&str>) -> String {
    let mut path = format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        rest.trim_start_matches('/')
    );
    if let Some(q) = query {
        path.push('?');
        path.push_str(q);
    }
    path
}

/// One outbound call on behalf of a client request.
pub struct UpstreamRequest<'a> {
    pub target: &'a ResolvedTarget,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl<'a> UpstreamRequest<'a> {
    pub fn new(target: &'a ResolvedTarget, method: Method, path: String) -> Self {
        Self {
            target,
            method,
            path,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    /// Carry over the client headers that affect what upstream returns.
    pub fn with_client_headers(mut self, client: &HeaderMap) -> Self {
        for name in FORWARDED_REQUEST_HEADERS.iter() {
            for value in client.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn send(&self, fetcher: &RetryingFetcher) -> Result<reqwest::Response, PacsError> {
        let response = fetcher
            .send(|| {
                let mut builder = self
                    .target
                    .request(self.method.clone(), &self.path)
                    .headers(self.headers.clone());
                if !self.body.is_empty() {
                    builder = builder.body(self.body.clone());
                }
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder
            })
            .await?;
        tracing::debug!(
            method = %self.method,
            path = %self.path,
            clinic_id = self.target.clinic_id.as_deref().unwrap_or("default"),
            status = response.status().as_u16(),
            "Upstream responded"
        );
        Ok(response)
    }
}

fn selected_headers(upstream: &HeaderMap, with_length: bool) -> Vec<(HeaderName, HeaderValue)> {
    let mut out = Vec::new();
    for name in FORWARDED_RESPONSE_HEADERS.iter() {
        if let Some(value) = upstream.get(name) {
            out.push((name.clone(), value.clone()));
        }
    }
    if with_length {
        if let Some(value) = upstream.get(header::CONTENT_LENGTH) {
            out.push((header::CONTENT_LENGTH, value.clone()));
        }
    }
    out
}

/// Pipe the upstream body to the client chunk by chunk.
///
/// Once the status line is out, an upstream failure can only abort the
/// connection. A client that goes away simply drops the stream.
pub fn stream_response(upstream: reqwest::Response, cache_control: Option<&'static str>) -> Response {
    let status = upstream.status();
    let headers = selected_headers(upstream.headers(), true);
    let url = upstream.url().path().to_string();

    let stream = upstream.bytes_stream().inspect_err(move |e| {
        tracing::debug!(path = %url, "Upstream stream ended early: {}", e);
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    let out = response.headers_mut();
    for (name, value) in headers {
        out.insert(name, value);
    }
    if let Some(policy) = cache_control {
        if status.is_success() {
            out.insert(header::CACHE_CONTROL, HeaderValue::from_static(policy));
        }
    }
    response
}

/// Read the whole upstream body, keeping the headers worth replaying.
pub async fn buffer_response(upstream: reqwest::Response) -> Result<CachedResponse, PacsError> {
    let status = upstream.status();
    let headers = selected_headers(upstream.headers(), false);
    let body = upstream.bytes().await?;
    Ok(CachedResponse {
        status,
        headers,
        body,
    })
}

/// Build a client response from a buffered upstream response.
pub fn buffered_response(
    buffered: CachedResponse,
    cache_control: &'static str,
    x_cache: Option<&'static str>,
) -> Response {
    let mut response = Response::new(Body::from(buffered.body));
    *response.status_mut() = buffered.status;
    let out = response.headers_mut();
    for (name, value) in buffered.headers {
        out.insert(name, value);
    }
    out.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    if let Some(state) = x_cache {
        out.insert(HeaderName::from_static("x-cache"), HeaderValue::from_static(state));
    }
    response
}
