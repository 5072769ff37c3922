use super::StorageResult;
use crate::models::ClinicConfig;
use async_trait::async_trait;

/// Read access to tenant records, plus the upsert used for startup seeding.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn find_clinic(&self, id: &str) -> StorageResult<Option<ClinicConfig>>;

    /// The clinic flagged as default, if any.
    async fn default_clinic(&self) -> StorageResult<Option<ClinicConfig>>;

    /// Insert or replace a clinic. Marking a clinic default clears the flag
    /// on every other record.
    async fn upsert_clinic(&self, clinic: &ClinicConfig) -> StorageResult<()>;
}
