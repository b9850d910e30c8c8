//! Shared libsql connection handling for the relational side stores.

use super::DatabaseError;
use libsql::{Builder, Connection, Database};
use std::path::Path;

/// A libsql database plus the single connection all statements go through.
///
/// One connection is kept so `:memory:` databases stay shared between calls.
pub(crate) struct SqliteHandle {
    _db: Database,
    pub(crate) conn: Connection,
}

impl SqliteHandle {
    pub(crate) async fn open(db_path: &Path) -> Result<Self, DatabaseError> {
        let in_memory = db_path.as_os_str() == ":memory:";
        if !in_memory {
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let db = Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path, e))?;
        let conn = db.connect()?;
        Ok(Self { _db: db, conn })
    }

    pub(crate) async fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(sql)
            .await
            .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?;
        Ok(())
    }
}
