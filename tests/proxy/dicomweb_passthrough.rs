mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::*;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn metadata_is_served_from_cache_until_ttl() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);
    let uri = format!("{MOUNT}/dicom-web/studies/1.2.3/metadata");

    let first = gw.app.clone().oneshot(get_request(&uri)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");
    let first_body = body_bytes(first).await;

    tokio::time::pause();
    tokio::time::advance(Duration::from_secs(5 * 60)).await;
    tokio::time::resume();

    let second = gw.app.clone().oneshot(get_request(&uri)).await.unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert!(second.headers()[header::CACHE_CONTROL]
        .to_str()
        .unwrap()
        .contains("must-revalidate"));
    assert_eq!(body_bytes(second).await, first_body);
    assert_eq!(pacs.hits_for("/dicom-web/studies/1.2.3/metadata"), 1);

    tokio::time::pause();
    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    tokio::time::resume();

    let third = gw.app.clone().oneshot(get_request(&uri)).await.unwrap();
    assert_eq!(third.headers()["x-cache"], "MISS");
    assert_eq!(pacs.hits_for("/dicom-web/studies/1.2.3/metadata"), 2);
}

#[tokio::test]
async fn frames_are_streamed_and_never_cached() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);
    let uri = format!("{MOUNT}/dicom-web/studies/1/series/2/instances/3/frames/1");

    for _ in 0..2 {
        let response = gw.app.clone().oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=31536000, immutable"
        );
        assert!(response.headers().get("x-cache").is_none());
        assert_eq!(&body_bytes(response).await[..], b"\x00\x01PIXELDATA");
    }

    assert_eq!(pacs.hits_for("/dicom-web/studies/1/series/2/instances/3/frames/1"), 2);
    assert!(gw.state.cache.is_empty());
}

#[tokio::test]
async fn proxy_params_are_stripped_and_pacs_auth_added() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);
    let uri = format!("{MOUNT}/dicom-web/studies?PatientID=P%2001&token=abc&limit=10");

    let response = gw.app.clone().oneshot(get_request(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let hit = pacs.hits().pop().unwrap();
    assert_eq!(hit.path, "/dicom-web/studies");
    assert_eq!(hit.query.as_deref(), Some("PatientID=P%2001&limit=10"));
    assert_eq!(hit.authorization.as_deref(), Some("Basic b3J0aGFuYzpvcnRoYW5j"));
}

#[tokio::test]
async fn cache_entries_are_scoped_per_tenant() {
    let default_pacs = spawn_mock_pacs("default").await;
    let north_pacs = spawn_mock_pacs("north").await;
    let gw = gateway(&default_pacs.url);
    gw.add_clinic("north", &north_pacs.url, "north-pw").await;

    let path = format!("{MOUNT}/dicom-web/studies");

    let north = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{path}?clinicId=north")))
        .await
        .unwrap();
    assert!(body_text(north).await.contains("\"pacs\":\"north\""));

    let default = gw.app.clone().oneshot(get_request(&path)).await.unwrap();
    assert_eq!(default.headers()["x-cache"], "MISS");
    assert!(body_text(default).await.contains("\"pacs\":\"default\""));

    // An unknown tenant is served by the default PACS but never shares its entries.
    let ghost = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{path}?clinicId=ghost")))
        .await
        .unwrap();
    assert_eq!(ghost.headers()["x-cache"], "MISS");

    assert_eq!(north_pacs.hits_for("/dicom-web/studies"), 1);
    assert_eq!(default_pacs.hits_for("/dicom-web/studies"), 2);

    let north_hit = north_pacs.hits().pop().unwrap();
    assert_eq!(north_hit.query, None);
}

#[tokio::test]
async fn clinic_header_selects_tenant() {
    let default_pacs = spawn_mock_pacs("default").await;
    let north_pacs = spawn_mock_pacs("north").await;
    let gw = gateway(&default_pacs.url);
    gw.add_clinic("north", &north_pacs.url, "north-pw").await;

    let request = Request::builder()
        .uri(format!("{MOUNT}/dicom-web/studies"))
        .header("x-clinic-id", "north")
        .body(Body::empty())
        .unwrap();
    let response = gw.app.clone().oneshot(request).await.unwrap();
    assert!(body_text(response).await.contains("north"));
}

#[tokio::test]
async fn upstream_errors_are_forwarded_and_not_cached() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);
    let uri = format!("{MOUNT}/dicom-web/studies/missing/metadata");

    for _ in 0..2 {
        let response = gw.app.clone().oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(pacs.hits_for("/dicom-web/studies/missing/metadata"), 2);
    assert!(gw.state.cache.is_empty());
}

#[tokio::test]
async fn writes_are_forwarded_with_body_and_never_cached() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("{MOUNT}/dicom-web/studies"))
        .header(header::CONTENT_TYPE, "application/dicom")
        .body(Body::from(vec![7u8; 64]))
        .unwrap();
    let response = gw.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("\"stored\":64"));
    assert!(gw.state.cache.is_empty());
    assert_eq!(pacs.hits().pop().unwrap().method, "POST");
}

#[tokio::test]
async fn preflight_is_answered_locally() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri(format!("{MOUNT}/dicom-web/studies"))
        .body(Body::empty())
        .unwrap();
    let response = gw.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(pacs.hits().is_empty());
}

#[tokio::test]
async fn unreachable_pacs_is_a_json_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let gw = gateway(&format!("http://{}", addr));

    let response = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{MOUNT}/dicom-web/studies")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "PACS unavailable");
}

#[tokio::test]
async fn orthanc_rest_is_passed_through() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let response = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{MOUNT}/orthanc/system?token=t")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("\"sawAuth\":true"));
    let hit = pacs.hits().pop().unwrap();
    assert_eq!(hit.path, "/system");
    assert_eq!(hit.query, None);
}

#[tokio::test]
async fn health_is_served_at_root() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let response = gw.app.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("gateway-test"));
}
