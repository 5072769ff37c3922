pub mod clinic;
pub mod orthanc_job;
pub mod queue_job;

pub use clinic::ClinicConfig;
pub use orthanc_job::{UpstreamJob, UpstreamJobState};
pub use queue_job::{JobStatus, QueueJob};
