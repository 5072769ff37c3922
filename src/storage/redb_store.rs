use super::database_manager::{DatabaseManager, DatabaseOperation};
use super::{ClinicStore, QueueStore, StorageResult};
use crate::models::{ClinicConfig, JobStatus, QueueJob};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type JsonTable = TableDefinition<'static, &'static str, &'static str>;

const CLINICS_TABLE: JsonTable = TableDefinition::new("clinics");
const QUEUE_TABLE: JsonTable = TableDefinition::new("queue_jobs");

/// redb-backed clinic and queue store. Records are stored as JSON documents
/// keyed by id.
///
/// redb transactions block (commits fsync), so every operation runs on the
/// blocking thread pool.
pub struct RedbStore {
    path: PathBuf,
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish()
    }
}

impl RedbStore {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let db = DatabaseManager::global().open(path, &[CLINICS_TABLE, QUEUE_TABLE])?;
        Ok(Self {
            path: path.to_path_buf(),
            db,
        })
    }

    async fn blocking<F, R>(&self, operation: F) -> StorageResult<R>
    where
        F: FnOnce(&Database) -> StorageResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || operation(db.as_ref())).await?
    }

    async fn put<T: Serialize>(&self, table: JsonTable, id: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_string(value)?;
        let id = id.to_string();
        self.blocking(move |db| {
            DatabaseOperation::write(db, |txn| {
                let mut t = txn.open_table(table).map_err(|e| e.to_string())?;
                t.insert(id.as_str(), json.as_str()).map_err(|e| e.to_string())?;
                Ok(())
            })
        })
        .await
    }

    async fn fetch<T: DeserializeOwned>(&self, table: JsonTable, id: &str) -> StorageResult<Option<T>> {
        let id = id.to_string();
        let raw = self
            .blocking(move |db| {
                DatabaseOperation::read(db, |txn| {
                    let t = txn.open_table(table).map_err(|e| e.to_string())?;
                    let value = t.get(id.as_str()).map_err(|e| e.to_string())?;
                    Ok(value.map(|v| v.value().to_string()))
                })
            })
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn scan<T: DeserializeOwned>(&self, table: JsonTable) -> StorageResult<Vec<T>> {
        let rows = self
            .blocking(move |db| {
                DatabaseOperation::read(db, |txn| {
                    let t = txn.open_table(table).map_err(|e| e.to_string())?;
                    let mut rows = Vec::new();
                    for entry in t.iter().map_err(|e| e.to_string())? {
                        let (_, v) = entry.map_err(|e| e.to_string())?;
                        rows.push(v.value().to_string());
                    }
                    Ok(rows)
                })
            })
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for json in rows {
            match serde_json::from_str(&json) {
                Ok(item) => out.push(item),
                Err(e) => tracing::warn!("Skipping unreadable record: {}", e),
            }
        }
        Ok(out)
    }

    async fn remove(&self, table: JsonTable, id: &str) -> StorageResult<bool> {
        let id = id.to_string();
        self.blocking(move |db| {
            DatabaseOperation::write(db, |txn| {
                let mut t = txn.open_table(table).map_err(|e| e.to_string())?;
                let removed = t.remove(id.as_str()).map_err(|e| e.to_string())?;
                Ok(removed.is_some())
            })
        })
        .await
    }
}

#[async_trait]
impl ClinicStore for RedbStore {
    async fn find_clinic(&self, id: &str) -> StorageResult<Option<ClinicConfig>> {
        self.fetch(CLINICS_TABLE, id).await
    }

    async fn default_clinic(&self) -> StorageResult<Option<ClinicConfig>> {
        let clinics: Vec<ClinicConfig> = self.scan(CLINICS_TABLE).await?;
        Ok(clinics.into_iter().find(|c| c.is_default))
    }

    async fn upsert_clinic(&self, clinic: &ClinicConfig) -> StorageResult<()> {
        let clinic = clinic.clone();
        let json = serde_json::to_string(&clinic)?;
        self.blocking(move |db| {
            DatabaseOperation::write(db, |txn| {
                let mut t = txn.open_table(CLINICS_TABLE).map_err(|e| e.to_string())?;
                if clinic.is_default {
                    let mut demoted = Vec::new();
                    for entry in t.iter().map_err(|e| e.to_string())? {
                        let (k, v) = entry.map_err(|e| e.to_string())?;
                        if k.value() == clinic.id {
                            continue;
                        }
                        if let Ok(mut other) = serde_json::from_str::<ClinicConfig>(v.value()) {
                            if other.is_default {
                                other.is_default = false;
                                demoted.push(other);
                            }
                        }
                    }
                    for other in demoted {
                        let other_json = serde_json::to_string(&other).map_err(|e| e.to_string())?;
                        t.insert(other.id.as_str(), other_json.as_str())
                            .map_err(|e| e.to_string())?;
                    }
                }
                t.insert(clinic.id.as_str(), json.as_str())
                    .map_err(|e| e.to_string())?;
                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl QueueStore for RedbStore {
    async fn insert_job(&self, job: &QueueJob) -> StorageResult<()> {
        self.put(QUEUE_TABLE, &job.id, job).await
    }

    async fn update_job(&self, job: &QueueJob) -> StorageResult<()> {
        self.put(QUEUE_TABLE, &job.id, job).await
    }

    async fn update_job_if(&self, job: &QueueJob, expected: JobStatus) -> StorageResult<bool> {
        let id = job.id.clone();
        let json = serde_json::to_string(job)?;
        self.blocking(move |db| {
            DatabaseOperation::write(db, |txn| {
                let mut t = txn.open_table(QUEUE_TABLE).map_err(|e| e.to_string())?;
                let current = t
                    .get(id.as_str())
                    .map_err(|e| e.to_string())?
                    .map(|v| serde_json::from_str::<QueueJob>(v.value()))
                    .transpose()
                    .map_err(|e| e.to_string())?;
                match current {
                    Some(stored) if stored.status == expected => {
                        t.insert(id.as_str(), json.as_str())
                            .map_err(|e| e.to_string())?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
        })
        .await
    }

    async fn get_job(&self, id: &str) -> StorageResult<Option<QueueJob>> {
        self.fetch(QUEUE_TABLE, id).await
    }

    async fn delete_job(&self, id: &str) -> StorageResult<bool> {
        self.remove(QUEUE_TABLE, id).await
    }

    async fn all_jobs(&self) -> StorageResult<Vec<QueueJob>> {
        self.scan(QUEUE_TABLE).await
    }
}
