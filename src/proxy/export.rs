use super::forward::{stream_response, tenant_from, UpstreamRequest};
use crate::error::ProxyError;
use crate::state::AppState;
use axum::extract::{RawQuery, State};
use axum::response::Response;
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method};
use std::sync::Arc;

/// `GET /export-dicom?studyUid=...`: stream the study's ZIP archive from the
/// PACS without holding it in memory.
pub async fn export_study(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    let query = query.as_deref();
    let study_uid = query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "studyUid" || k == "StudyInstanceUID")
                .map(|(_, v)| v.trim().to_string())
        })
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| ProxyError::BadRequest("studyUid is required".to_string()))?;
    let tenant = tenant_from(&headers, query);
    let target = state.resolver.resolve(tenant.as_deref()).await;

    let study_id = state
        .pacs
        .find_study(&target, &study_uid)
        .await?
        .ok_or_else(|| ProxyError::NotFound(format!("Study {} not found", study_uid)))?;

    tracing::info!(
        study_uid = %study_uid,
        clinic_id = ?target.clinic_id,
        "📦 Exporting study archive"
    );

    let upstream = UpstreamRequest::new(
        &target,
        Method::GET,
        format!("/studies/{}/archive", urlencoding::encode(&study_id)),
    )
    .with_timeout(state.archive_timeout)
    .send(&state.fetcher)
    .await?;

    if !upstream.status().is_success() {
        return Ok(stream_response(upstream, None));
    }

    let mut response = stream_response(upstream, None);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    if let Ok(disposition) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}.zip\"",
        archive_name(&study_uid)
    )) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

/// File name safe to embed in a quoted Content-Disposition value.
fn archive_name(study_uid: &str) -> String {
    study_uid
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
