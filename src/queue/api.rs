//! The user-facing queue surface: list, batch enqueue, retry and delete.

use crate::error::ProxyError;
use crate::models::{JobStatus, QueueJob};
use crate::proxy::forward::tenant_from;
use crate::security::AuthUser;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ProxyError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.tokens.authenticate(&parts.headers, parts.uri.query())?)
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/queue", get(list_jobs).post(enqueue).delete(clear_finished))
        .route("/queue/{id}", axum::routing::delete(delete_job))
        .route("/queue/{id}/retry", post(retry_job))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub study_instance_uids: Vec<String>,
    pub target_node: String,
    #[serde(default)]
    pub clinic_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub created: Vec<QueueJob>,
    /// Studies left out because the user already has them waiting or in flight.
    pub skipped: Vec<String>,
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<QueueJob>>, ProxyError> {
    let jobs = state
        .queue
        .jobs_for_user(&user.id, state.queue_list_limit)
        .await?;
    Ok(Json(jobs))
}

async fn enqueue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<Response, ProxyError> {
    let Json(request) = payload.map_err(|e| ProxyError::BadRequest(e.body_text()))?;

    let target_node = request.target_node.trim();
    if target_node.is_empty() {
        return Err(ProxyError::BadRequest("targetNode is required".to_string()));
    }
    let clinic_id = request
        .clinic_id
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .or_else(|| tenant_from(&headers, None));

    let mut seen = HashSet::new();
    let uids: Vec<&str> = request
        .study_instance_uids
        .iter()
        .map(|uid| uid.trim())
        .filter(|uid| !uid.is_empty())
        .collect();
    if uids.is_empty() {
        return Err(ProxyError::BadRequest(
            "studyInstanceUids must contain at least one study".to_string(),
        ));
    }

    let now = Utc::now();
    let mut created = Vec::new();
    let mut skipped = Vec::new();
    for uid in uids {
        if !seen.insert(uid) || state.queue.has_active_job_for_study(&user.id, uid).await? {
            skipped.push(uid.to_string());
            continue;
        }
        let job = QueueJob::new(&user.id, uid, target_node, clinic_id.clone(), now);
        state.queue.insert_job(&job).await?;
        created.push(job);
    }

    tracing::info!(
        user_id = %user.id,
        target_node,
        created = created.len(),
        skipped = skipped.len(),
        "Queued studies for sending"
    );
    Ok((StatusCode::CREATED, Json(EnqueueResponse { created, skipped })).into_response())
}

async fn owned_job(state: &AppState, user: &AuthUser, id: &str) -> Result<QueueJob, ProxyError> {
    match state.queue.get_job(id).await? {
        Some(job) if job.user_id == user.id => Ok(job),
        _ => Err(ProxyError::NotFound(format!("Job {} not found", id))),
    }
}

async fn retry_job(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<QueueJob>, ProxyError> {
    let mut job = owned_job(&state, &user, &id).await?;
    if !job.reset_for_retry() {
        return Err(ProxyError::Conflict(format!(
            "Only failed jobs can be retried (job is {})",
            job.status
        )));
    }
    if !state.queue.update_job_if(&job, JobStatus::Failed).await? {
        return Err(ProxyError::Conflict(format!(
            "Job {} changed while it was being retried",
            id
        )));
    }
    tracing::info!(job_id = %job.id, retries = job.retries, "Send job requeued");
    Ok(Json(job))
}

async fn delete_job(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ProxyError> {
    let job = owned_job(&state, &user, &id).await?;
    state.queue.delete_job(&job.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_finished(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let deleted = state.queue.delete_finished(&user.id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
