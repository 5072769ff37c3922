#[path = "common.rs"]
mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use common::*;
use pacs_gateway::models::{JobStatus, QueueJob};
use pacs_gateway::storage::QueueStore;
use serde_json::json;
use tower::ServiceExt;

async fn enqueue(q: &TestQueue, user: &str, uids: &[&str]) -> serde_json::Value {
    let response = q
        .app
        .clone()
        .oneshot(authed(
            Method::POST,
            "/queue",
            user,
            Some(json!({ "studyInstanceUids": uids, "targetNode": "REMOTE" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn test_queue_requires_token() {
    let q = queue_gateway("http://127.0.0.1:9");
    let response = q
        .app
        .clone()
        .oneshot(Request::builder().uri("/queue").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_resubmitting_active_studies_creates_nothing() {
    let q = queue_gateway("http://127.0.0.1:9");

    let first = enqueue(&q, "alice", &["1.2.1", "1.2.2", "1.2.3"]).await;
    assert_eq!(first["created"].as_array().unwrap().len(), 3);
    assert_eq!(first["created"][0]["status"], "PENDING");
    assert_eq!(first["created"][0]["targetNode"], "REMOTE");

    let second = enqueue(&q, "alice", &["1.2.1", "1.2.2", "1.2.3"]).await;
    assert!(second["created"].as_array().unwrap().is_empty());
    assert_eq!(second["skipped"], json!(["1.2.1", "1.2.2", "1.2.3"]));

    // Another user queues the same studies independently.
    let other = enqueue(&q, "bob", &["1.2.1"]).await;
    assert_eq!(other["created"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicates_inside_one_batch_are_skipped() {
    let q = queue_gateway("http://127.0.0.1:9");
    let body = enqueue(&q, "alice", &["1.2.7", " 1.2.7 ", "1.2.8"]).await;
    assert_eq!(body["created"].as_array().unwrap().len(), 2);
    assert_eq!(body["skipped"], json!(["1.2.7"]));
}

#[tokio::test]
async fn test_enqueue_validates_payload() {
    let q = queue_gateway("http://127.0.0.1:9");
    for payload in [
        json!({ "studyInstanceUids": ["1.2.3"] }),
        json!({ "studyInstanceUids": [], "targetNode": "REMOTE" }),
        json!({ "studyInstanceUids": ["1.2.3"], "targetNode": "  " }),
    ] {
        let response = q
            .app
            .clone()
            .oneshot(authed(Method::POST, "/queue", "alice", Some(payload)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert!(q.store.all_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_finished_study_can_be_queued_again() {
    let q = queue_gateway("http://127.0.0.1:9");
    let created = enqueue(&q, "alice", &["1.2.5"]).await;
    let id = created["created"][0]["id"].as_str().unwrap();

    let mut job = q.store.get_job(id).await.unwrap().unwrap();
    job.mark_completed(Utc::now());
    q.store.update_job(&job).await.unwrap();

    let again = enqueue(&q, "alice", &["1.2.5"]).await;
    assert_eq!(again["created"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_retry_resets_failed_job() {
    let q = queue_gateway("http://127.0.0.1:9");
    let created = enqueue(&q, "alice", &["1.2.9"]).await;
    let id = created["created"][0]["id"].as_str().unwrap().to_string();

    let mut job = q.store.get_job(&id).await.unwrap().unwrap();
    job.mark_processing("job-77".to_string(), Utc::now());
    job.progress = 40;
    job.mark_failed("association rejected", Utc::now());
    q.store.update_job(&job).await.unwrap();

    let response = q
        .app
        .clone()
        .oneshot(authed(Method::POST, &format!("/queue/{}/retry", id), "alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["progress"], 0);
    assert_eq!(body["retries"], 1);
    assert!(body["error"].is_null());
    assert!(body["orthancJobId"].is_null());

    let stored = q.store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.retries, 1);
}

#[tokio::test]
async fn test_retry_rejects_jobs_that_have_not_failed() {
    let q = queue_gateway("http://127.0.0.1:9");
    let created = enqueue(&q, "alice", &["1.2.10"]).await;
    let id = created["created"][0]["id"].as_str().unwrap();

    let response = q
        .app
        .clone()
        .oneshot(authed(Method::POST, &format!("/queue/{}/retry", id), "alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("PENDING"));
}

#[tokio::test]
async fn test_jobs_are_private_to_their_owner() {
    let q = queue_gateway("http://127.0.0.1:9");
    let created = enqueue(&q, "alice", &["1.2.11"]).await;
    let id = created["created"][0]["id"].as_str().unwrap().to_string();

    for (method, uri) in [
        (Method::DELETE, format!("/queue/{}", id)),
        (Method::POST, format!("/queue/{}/retry", id)),
    ] {
        let response = q
            .app
            .clone()
            .oneshot(authed(method, &uri, "mallory", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    assert!(q.store.get_job(&id).await.unwrap().is_some());

    let listed = json_body(
        q.app
            .clone()
            .oneshot(authed(Method::GET, "/queue", "mallory", None))
            .await
            .unwrap(),
    )
    .await;
    assert!(listed.as_array().unwrap().is_empty());

    let response = q
        .app
        .clone()
        .oneshot(authed(Method::DELETE, &format!("/queue/{}", id), "alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(q.store.get_job(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_clear_removes_only_finished_jobs() {
    let q = queue_gateway("http://127.0.0.1:9");
    let now = Utc::now();

    let pending = QueueJob::new("alice", "1.2.20", "REMOTE", None, now);
    let mut processing = QueueJob::new("alice", "1.2.21", "REMOTE", None, now);
    processing.mark_processing("job-21".to_string(), now);
    let mut completed = QueueJob::new("alice", "1.2.22", "REMOTE", None, now);
    completed.mark_completed(now);
    let mut failed = QueueJob::new("alice", "1.2.23", "REMOTE", None, now);
    failed.mark_failed("boom", now);
    let mut foreign = QueueJob::new("bob", "1.2.24", "REMOTE", None, now);
    foreign.mark_completed(now);
    for job in [&pending, &processing, &completed, &failed, &foreign] {
        q.store.insert_job(job).await.unwrap();
    }

    let response = q
        .app
        .clone()
        .oneshot(authed(Method::DELETE, "/queue", "alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["deleted"], 2);

    let mut remaining: Vec<String> = q
        .store
        .all_jobs()
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.study_instance_uid)
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["1.2.20", "1.2.21", "1.2.24"]);
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let q = queue_gateway("http://127.0.0.1:9");
    let base = Utc::now();
    for (offset, uid) in [(0, "1.2.30"), (2, "1.2.32"), (1, "1.2.31")] {
        let job = QueueJob::new("alice", uid, "REMOTE", None, base + Duration::seconds(offset));
        q.store.insert_job(&job).await.unwrap();
    }

    let response = q
        .app
        .clone()
        .oneshot(authed(Method::GET, "/queue", "alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let uids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["studyInstanceUid"].as_str().unwrap())
        .collect();
    assert_eq!(uids, vec!["1.2.32", "1.2.31", "1.2.30"]);
}

#[tokio::test]
async fn test_clinic_header_is_recorded_on_new_jobs() {
    let q = queue_gateway("http://127.0.0.1:9");
    let mut request = authed(
        Method::POST,
        "/queue",
        "alice",
        Some(json!({ "studyInstanceUids": ["1.2.40"], "targetNode": "REMOTE" })),
    );
    request
        .headers_mut()
        .insert("x-clinic-id", "north".parse().unwrap());
    let body = json_body(q.app.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(body["created"][0]["clinicId"], "north");
}
