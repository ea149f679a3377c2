// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use cadence_config::model::StorageConfig;
use cadence_core::CadenceError;
use tracing::{debug, info};

/// Handle to the Cadence SQLite database.
///
/// Cheap to clone; every clone talks to the same background connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` with default settings.
    pub async fn open(path: &str) -> Result<Self, CadenceError> {
        Self::open_with(path, true, Duration::from_millis(5000)).await
    }

    /// Open the database described by a `[storage]` config section.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, CadenceError> {
        Self::open_with(
            &config.database_path,
            config.wal_mode,
            Duration::from_millis(config.busy_timeout_ms),
        )
        .await
    }

    /// A private in-memory database, used by tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, CadenceError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| CadenceError::Storage { source: Box::new(e) })?;
        let db = Self { conn };
        db.initialize(false, Duration::ZERO).await?;
        Ok(db)
    }

    async fn open_with(
        path: &str,
        wal_mode: bool,
        busy_timeout: Duration,
    ) -> Result<Self, CadenceError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CadenceError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| CadenceError::Storage { source: Box::new(e) })?;
        let db = Self { conn };
        db.initialize(wal_mode, busy_timeout).await?;
        info!(path, wal_mode, "database opened");
        Ok(db)
    }

    async fn initialize(&self, wal_mode: bool, busy_timeout: Duration) -> Result<(), CadenceError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    let mode: String =
                        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
                conn.busy_timeout(busy_timeout)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| -> Result<(), refinery::Error> {
                crate::migrations::run_migrations(conn)
            })
            .await
            .map_err(|e: tokio_rusqlite::Error<refinery::Error>| CadenceError::Storage {
                source: Box::new(e),
            })
    }

    /// The underlying async connection. Query modules go through `call()`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CadenceError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        self.conn
            .close()
            .await
            .map_err(|e| CadenceError::Storage { source: Box::new(e) })
    }
}

/// Map a tokio-rusqlite call error into the storage variant.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CadenceError {
    CadenceError::Storage {
        source: Box::new(e),
    }
}
