use serde::{Deserialize, Serialize};

/// Subset of Orthanc's `/jobs/{id}` response the dispatcher cares about.
///
/// Ref: <https://orthanc.uclouvain.be/book/users/advanced-rest.html#monitoring-jobs>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct UpstreamJob {
    #[serde(rename = "ID", default)]
    pub id: String,
    pub state: UpstreamJobState,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub error_description: String,
    #[serde(default)]
    pub error_details: String,
}

impl UpstreamJob {
    /// Most specific error text Orthanc reported for a failed job.
    pub fn error_message(&self) -> String {
        match (self.error_details.trim(), self.error_description.trim()) {
            ("", "") => "Upstream job failed".to_string(),
            ("", description) => description.to_string(),
            (details, "") => details.to_string(),
            (details, description) => format!("{}: {}", description, details),
        }
    }
}

/// Orthanc job state.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Hash)]
pub enum UpstreamJobState {
    Pending,
    Running,
    Success,
    Failure,
    Paused,
    Retry,
}
