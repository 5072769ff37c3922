use super::{PacsError, ResolvedTarget, RetryingFetcher};
use crate::models::UpstreamJob;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

/// The slice of the Orthanc REST API shared by the proxy and the dispatcher.
#[async_trait]
pub trait PacsClient: Send + Sync {
    /// Orthanc's internal study id for a StudyInstanceUID, if the PACS has it.
    async fn find_study(
        &self,
        target: &ResolvedTarget,
        study_instance_uid: &str,
    ) -> Result<Option<String>, PacsError>;

    /// Status of an asynchronous Orthanc job. An unknown job is `PacsError::NotFound`.
    async fn job_status(&self, target: &ResolvedTarget, job_id: &str)
        -> Result<UpstreamJob, PacsError>;

    /// Start a C-STORE of the study to a configured modality. Returns the
    /// upstream job id, or `None` when Orthanc completed the transfer inline.
    async fn send_to_modality(
        &self,
        target: &ResolvedTarget,
        orthanc_study_id: &str,
        modality: &str,
    ) -> Result<Option<String>, PacsError>;
}

/// One entry of `POST /tools/lookup`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LookupEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Type")]
    kind: String,
}

/// Response of `POST /modalities/{id}/store`. Synchronous stores answer with
/// an empty object.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct StoreResponse {
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

pub struct OrthancClient {
    fetcher: RetryingFetcher,
}

impl OrthancClient {
    pub fn new(fetcher: RetryingFetcher) -> Self {
        Self { fetcher }
    }

    async fn call(
        &self,
        target: &ResolvedTarget,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        raw_body: Option<&str>,
    ) -> Result<reqwest::Response, PacsError> {
        let response = self
            .fetcher
            .send(|| {
                let builder = target.request(method.clone(), path);
                match (&body, raw_body) {
                    (Some(json), _) => builder.json(json),
                    (None, Some(text)) => builder
                        .header(http::header::CONTENT_TYPE, "text/plain")
                        .body(text.to_string()),
                    (None, None) => builder,
                }
            })
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PacsError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PacsError::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PacsClient for OrthancClient {
    async fn find_study(
        &self,
        target: &ResolvedTarget,
        study_instance_uid: &str,
    ) -> Result<Option<String>, PacsError> {
        let response = self
            .call(target, Method::POST, "/tools/lookup", None, Some(study_instance_uid))
            .await?;
        let entries: Vec<LookupEntry> = response
            .json()
            .await
            .map_err(|e| PacsError::Decode(e.to_string()))?;

        Ok(entries
            .into_iter()
            .find(|e| e.kind.eq_ignore_ascii_case("study"))
            .map(|e| e.id))
    }

    async fn job_status(
        &self,
        target: &ResolvedTarget,
        job_id: &str,
    ) -> Result<UpstreamJob, PacsError> {
        let path = format!("/jobs/{}", urlencoding::encode(job_id));
        let response = self.call(target, Method::GET, &path, None, None).await?;
        response
            .json()
            .await
            .map_err(|e| PacsError::Decode(e.to_string()))
    }

    async fn send_to_modality(
        &self,
        target: &ResolvedTarget,
        orthanc_study_id: &str,
        modality: &str,
    ) -> Result<Option<String>, PacsError> {
        let path = format!("/modalities/{}/store", urlencoding::encode(modality));
        let body = json!({
            "Resources": [orthanc_study_id],
            "Synchronous": false,
        });
        let response = self.call(target, Method::POST, &path, Some(body), None).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let parsed: StoreResponse =
            serde_json::from_str(&text).map_err(|e| PacsError::Decode(e.to_string()))?;
        Ok(parsed.id.filter(|id| !id.is_empty()))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
