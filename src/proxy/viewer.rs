use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

/// Seconds before the viewer frame is revealed even if it never signals load.
const REVEAL_FALLBACK_SECS: u32 = 15;

#[derive(Debug, Deserialize)]
pub struct ViewerParams {
    #[serde(rename = "StudyInstanceUIDs")]
    pub study_instance_uids: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "clinicId")]
    pub clinic_id: Option<String>,
}

/// `GET /viewer`: tiny bootstrap page that hosts OHIF in an iframe served by
/// the `/ohif` route, so the browser never talks to the PACS directly.
pub async fn viewer_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewerParams>,
) -> Response {
    let study = params
        .study_instance_uids
        .as_deref()
        .map(str::trim)
        .filter(|uid| !uid.is_empty());
    let Some(study) = study else {
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page("No study selected. Open the viewer from a study in the worklist.")),
        )
            .into_response();
    };

    let src = viewer_src(
        &state.mount_path,
        study,
        params.token.as_deref(),
        params.clinic_id.as_deref(),
    );
    Html(bootstrap_page(&src)).into_response()
}

fn viewer_src(mount_path: &str, study: &str, token: Option<&str>, clinic_id: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("StudyInstanceUIDs", study);
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        query.append_pair("token", token);
    }
    if let Some(clinic_id) = clinic_id.filter(|c| !c.is_empty()) {
        query.append_pair("clinicId", clinic_id);
    }
    format!("{}/ohif/viewer?{}", mount_path, query.finish())
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const BOOTSTRAP_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Image Viewer</title>
<style>
  html, body { margin: 0; height: 100%; background: #000; overflow: hidden; }
  #viewer { border: 0; width: 100%; height: 100%; visibility: hidden; }
  #loading { position: absolute; inset: 0; display: flex; flex-direction: column;
             align-items: center; justify-content: center; color: #9ccef9;
             font-family: sans-serif; }
  .spinner { width: 48px; height: 48px; border: 4px solid #1f3b57;
             border-top-color: #9ccef9; border-radius: 50%;
             animation: spin 1s linear infinite; margin-bottom: 16px; }
  @keyframes spin { to { transform: rotate(360deg); } }
</style>
</head>
<body>
<div id="loading"><div class="spinner"></div><div>Loading study&hellip;</div></div>
<iframe id="viewer" src="{{VIEWER_SRC}}" allow="fullscreen"></iframe>
<script>
  (function () {
    var frame = document.getElementById('viewer');
    var loading = document.getElementById('loading');
    var shown = false;
    function reveal() {
      if (shown) { return; }
      shown = true;
      frame.style.visibility = 'visible';
      loading.style.display = 'none';
    }
    frame.addEventListener('load', reveal);
    setTimeout(reveal, {{REVEAL_MS}});
  })();
</script>
</body>
</html>
"#;

fn bootstrap_page(src: &str) -> String {
    BOOTSTRAP_TEMPLATE
        .replace("{{VIEWER_SRC}}", &escape_html(src))
        .replace("{{REVEAL_MS}}", &(REVEAL_FALLBACK_SECS * 1000).to_string())
}

fn error_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>Image Viewer</title></head>\
         <body style=\"font-family:sans-serif;background:#000;color:#f88;padding:2em\"><p>{}</p></body></html>",
        escape_html(message)
    )
}
