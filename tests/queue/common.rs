#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use jsonwebtoken::{encode, EncodingKey, Header};
use pacs_gateway::adapters::http::build_router;
use pacs_gateway::config::{Config, ConfigError};
use pacs_gateway::queue::{QueueDispatcher, SystemClock};
use pacs_gateway::state::AppState;
use pacs_gateway::storage::{open_store, RedbStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const JWT_SECRET: &str = "queue-test-secret";

/// Orthanc stand-in for the send workflow: every study UID starting with
/// `1.2.` exists, stores start an async job, and job states are scripted.
#[derive(Clone, Default)]
pub struct MockOrthanc {
    pub url: String,
    jobs: Arc<Mutex<HashMap<String, Value>>>,
    stores: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockOrthanc {
    pub fn set_job(&self, id: &str, state: &str, progress: u8) {
        self.jobs.lock().unwrap().insert(
            id.to_string(),
            json!({ "ID": id, "State": state, "Progress": progress }),
        );
    }

    pub fn fail_job(&self, id: &str, description: &str) {
        self.jobs.lock().unwrap().insert(
            id.to_string(),
            json!({ "ID": id, "State": "Failure", "Progress": 0, "ErrorDescription": description }),
        );
    }

    pub fn forget_job(&self, id: &str) {
        self.jobs.lock().unwrap().remove(id);
    }

    /// `(modality, orthanc study id)` for every store request received.
    pub fn stores(&self) -> Vec<(String, String)> {
        self.stores.lock().unwrap().clone()
    }
}

async fn lookup(body: String) -> Json<Value> {
    let uid = body.trim();
    if uid.starts_with("1.2.") {
        Json(json!([{ "ID": format!("study-{}", uid), "Type": "Study" }]))
    } else {
        Json(json!([]))
    }
}

async fn store(
    State(mock): State<MockOrthanc>,
    Path(modality): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let study = body["Resources"][0].as_str().unwrap_or_default().to_string();
    mock.stores.lock().unwrap().push((modality.clone(), study.clone()));
    if modality == "OFFLINE" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "C-STORE association refused").into_response();
    }
    let job_id = format!("job-{}", study);
    mock.jobs.lock().unwrap().insert(
        job_id.clone(),
        json!({ "ID": job_id, "State": "Pending", "Progress": 0 }),
    );
    Json(json!({ "ID": job_id, "Path": format!("/jobs/{}", job_id) })).into_response()
}

async fn job(State(mock): State<MockOrthanc>, Path(id): Path<String>) -> Response {
    match mock.jobs.lock().unwrap().get(&id) {
        Some(job) => Json(job.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn spawn_mock_orthanc() -> MockOrthanc {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mock = MockOrthanc {
        url: format!("http://{}", addr),
        ..Default::default()
    };
    let app = Router::new()
        .route("/tools/lookup", post(lookup))
        .route("/modalities/{id}/store", post(store))
        .route("/jobs/{id}", get(job))
        .with_state(mock.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    mock
}

pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml).expect("TOML parse error");
    config.validate()?;
    Ok(config)
}

pub struct TestQueue {
    pub app: Router,
    pub state: Arc<AppState>,
    pub store: Arc<RedbStore>,
    pub dispatcher: Arc<QueueDispatcher>,
    _dir: TempDir,
}

pub fn queue_gateway(pacs_url: &str) -> TestQueue {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("queue.redb");
    let toml = format!(
        r#"
        [proxy]
        id = "queue-test"
        mount_path = ""
        store_path = "{}"

        [pacs]
        url = "{pacs_url}"
        username = "orthanc"
        password = "orthanc"
        retry_attempts = 1

        [queue]
        list_limit = 50

        [security]
        jwt_secret = "{JWT_SECRET}"
        encryption_key = "queue-test-key"
        "#,
        store_path.display()
    );
    let config = load_config_from_str(&toml).expect("valid config");

    let store = open_store(&store_path).unwrap();
    let state = Arc::new(AppState::new(&config, store.clone()).unwrap());
    let dispatcher = Arc::new(QueueDispatcher::new(
        state.queue.clone(),
        state.pacs.clone(),
        state.resolver.clone(),
        Arc::new(SystemClock),
        Duration::from_millis(config.queue.tick_ms),
    ));
    TestQueue {
        app: build_router(state.clone()),
        state,
        store,
        dispatcher,
        _dir: dir,
    }
}

pub fn token_for(user_id: &str) -> String {
    let claims = json!({ "sub": user_id, "exp": chrono::Utc::now().timestamp() + 3600 });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn authed(method: Method, uri: &str, user: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
