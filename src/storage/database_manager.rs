use once_cell::sync::OnceCell;
use redb::{Database, TableDefinition, TableHandle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{StorageError, StorageResult};

/// redb takes an exclusive file lock, so the clinic and queue stores must
/// share one handle per path.
static GLOBAL_DB_MANAGER: OnceCell<DatabaseManager> = OnceCell::new();

pub struct DatabaseManager {
    databases: Mutex<HashMap<PathBuf, Arc<Database>>>,
}

impl DatabaseManager {
    fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static DatabaseManager {
        GLOBAL_DB_MANAGER.get_or_init(DatabaseManager::new)
    }

    /// Get or create the shared database handle for `db_path`, making sure the
    /// given tables exist.
    pub fn open(
        &self,
        db_path: &Path,
        tables: &[TableDefinition<'static, &'static str, &'static str>],
    ) -> StorageResult<Arc<Database>> {
        let mut map = self
            .databases
            .lock()
            .map_err(|e| StorageError::Database(format!("Failed to lock database map: {}", e)))?;

        if let Some(existing) = map.get(db_path) {
            tracing::debug!("🔄 Reusing database instance for: {}", db_path.display());
            let db = existing.clone();
            drop(map);
            initialize_tables(&db, tables)?;
            return Ok(db);
        }

        let db = create_database(db_path)?;
        initialize_tables(&db, tables)?;
        map.insert(db_path.to_path_buf(), db.clone());
        Ok(db)
    }

    /// Drop the shared handle for `db_path`. Used by tests that reopen a file.
    pub fn close(&self, db_path: &Path) -> StorageResult<bool> {
        let mut map = self
            .databases
            .lock()
            .map_err(|e| StorageError::Database(format!("Failed to lock database map: {}", e)))?;
        let removed = map.remove(db_path).is_some();
        if removed {
            tracing::info!("🗑️  Closed database: {}", db_path.display());
        }
        Ok(removed)
    }
}

fn create_database(db_path: &Path) -> StorageResult<Arc<Database>> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::info!("🗄️  Opening database: {}", db_path.display());
    let db = Database::create(db_path)
        .map_err(|e| StorageError::Database(format!("Failed to create database: {}", e)))?;
    Ok(Arc::new(db))
}

fn initialize_tables(
    db: &Database,
    tables: &[TableDefinition<'static, &'static str, &'static str>],
) -> StorageResult<()> {
    DatabaseOperation::write(db, |txn| {
        for table in tables {
            txn.open_table(*table)
                .map_err(|e| format!("Failed to open table {}: {}", table.name(), e))?;
        }
        Ok(())
    })
}

/// Transaction helpers that flatten redb's error zoo into `StorageError`.
pub struct DatabaseOperation;

impl DatabaseOperation {
    pub fn read<F, R>(db: &Database, operation: F) -> StorageResult<R>
    where
        F: FnOnce(&redb::ReadTransaction) -> Result<R, String>,
    {
        let read_txn = db
            .begin_read()
            .map_err(|e| StorageError::Database(format!("Failed to begin read transaction: {}", e)))?;
        operation(&read_txn).map_err(StorageError::Database)
    }

    pub fn write<F, R>(db: &Database, operation: F) -> StorageResult<R>
    where
        F: FnOnce(&redb::WriteTransaction) -> Result<R, String>,
    {
        let write_txn = db
            .begin_write()
            .map_err(|e| StorageError::Database(format!("Failed to begin write transaction: {}", e)))?;

        let result = operation(&write_txn).map_err(StorageError::Database)?;

        write_txn
            .commit()
            .map_err(|e| StorageError::Database(format!("Failed to commit write transaction: {}", e)))?;
        Ok(result)
    }
}
