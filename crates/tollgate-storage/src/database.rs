// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::sync::Arc;

use tokio_rusqlite::Connection;
use tracing::debug;

use tollgate_config::model::StorageConfig;
use tollgate_core::TollgateError;

use crate::migrations::{migration_error, run_migrations};

/// Shared handle to the Tollgate database. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and applies migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, TollgateError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(TollgateError::storage)?;
            }
        }
        let conn = Connection::open(path).await.map_err(map_open_err)?;
        let db = Self {
            conn: Arc::new(conn),
        };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Opens the database described by the `[storage]` configuration section.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, TollgateError> {
        Self::open(&config.database_path, config.wal_mode).await
    }

    /// Opens a private in-memory database with the full schema.
    pub async fn open_in_memory() -> Result<Self, TollgateError> {
        let conn = Connection::open_in_memory().await.map_err(map_open_err)?;
        let db = Self {
            conn: Arc::new(conn),
        };
        db.prepare(false).await?;
        Ok(db)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), TollgateError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                }
                conn.pragma_update(None, "busy_timeout", 5000)?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| run_migrations(conn))
            .await
            .map_err(migration_error)
    }

    /// Checkpoints the WAL so the main database file is self-contained.
    pub async fn close(&self) -> Result<(), TollgateError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Maps a tokio-rusqlite call error into the storage error variant.
pub(crate) fn map_tr_err(err: tokio_rusqlite::Error<rusqlite::Error>) -> TollgateError {
    TollgateError::Storage {
        source: err.to_string().into(),
    }
}

fn map_open_err(err: impl std::fmt::Display) -> TollgateError {
    TollgateError::Storage {
        source: format!("failed to open database: {err}").into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tollgate.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' \
                     AND name IN ('entitlements', 'redemptions', 'credentials') ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        assert_eq!(tables, vec!["credentials", "entitlements", "redemptions"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_does_not_rerun_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tollgate.db");
        let path = path.to_str().unwrap();
        Database::open(path, true).await.unwrap();
        Database::open(path, true).await.unwrap();
    }
}
