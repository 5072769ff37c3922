use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub mod clinic_store;
pub mod database_manager;
pub mod queue_store;
pub mod redb_store;

pub use clinic_store::ClinicStore;
pub use database_manager::DatabaseManager;
pub use queue_store::QueueStore;
pub use redb_store::RedbStore;

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Open (or reuse) the embedded store at `path`.
pub fn open_store(path: impl AsRef<Path>) -> StorageResult<Arc<RedbStore>> {
    Ok(Arc::new(RedbStore::open(path.as_ref())?))
}
