mod common;

use axum::http::{header, StatusCode};
use common::*;
use tower::ServiceExt;

#[tokio::test]
async fn viewer_page_embeds_ohif_with_token_and_tenant() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let response = gw
        .app
        .clone()
        .oneshot(get_request(&format!(
            "{MOUNT}/viewer?StudyInstanceUIDs=1.2.3&token=tok&clinicId=north"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let html = body_text(response).await;
    assert!(html.contains(
        "src=\"/api/pacs/ohif/viewer?StudyInstanceUIDs=1.2.3&amp;token=tok&amp;clinicId=north\""
    ));
    assert!(html.contains("setTimeout(reveal"));
    assert!(pacs.hits().is_empty());
}

#[tokio::test]
async fn viewer_page_without_study_explains_itself() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let response = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{MOUNT}/viewer")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("No study selected"));
}

#[tokio::test]
async fn export_streams_the_archive() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let response = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{MOUNT}/export-dicom?studyUid=1.2.3")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"1.2.3.zip\""
    );
    assert_eq!(&body_bytes(response).await[..], b"PK\x03\x04fake-zip-payload");

    let paths: Vec<String> = pacs.hits().into_iter().map(|h| h.path).collect();
    assert_eq!(paths, vec!["/tools/lookup", "/studies/orthanc-study-1/archive"]);
}

#[tokio::test]
async fn export_of_unknown_study_is_404() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let response = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{MOUNT}/export-dicom?studyUid=9.9.9")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "Study 9.9.9 not found");
}

#[tokio::test]
async fn export_requires_study_uid() {
    let pacs = spawn_mock_pacs("default").await;
    let gw = gateway(&pacs.url);

    let response = gw
        .app
        .clone()
        .oneshot(get_request(&format!("{MOUNT}/export-dicom")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
