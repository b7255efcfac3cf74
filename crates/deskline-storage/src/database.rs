// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle with PRAGMA setup and migrations.
//!
//! All reads and writes go through tokio-rusqlite's single background thread,
//! so every `call` closure runs atomically with respect to the others.
//! Do NOT open additional connections for writes.

use std::path::Path;

use deskline_core::DesklineError;
use tracing::{debug, info};

use crate::migrations;

/// Converts a tokio-rusqlite error into `DesklineError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> DesklineError {
    DesklineError::storage(e)
}

pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path`, applies migrations,
    /// and starts the writer thread.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, DesklineError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(DesklineError::storage)?;
        }

        let migrate_path = path.to_string();
        let applied = tokio::task::spawn_blocking(move || prepare(&migrate_path, wal_mode))
            .await
            .map_err(|e| DesklineError::Internal(format!("migration task failed: {e}")))??;
        if applied > 0 {
            info!(applied, "database migrations applied");
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(DesklineError::storage)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Flushes the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), DesklineError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

fn prepare(path: &str, wal_mode: bool) -> Result<usize, DesklineError> {
    let mut conn = rusqlite::Connection::open(path).map_err(DesklineError::storage)?;
    if wal_mode {
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(DesklineError::storage)?;
        debug!(mode = %mode, "journal mode set");
    }
    migrations::run_migrations(&mut conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema_and_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deskline.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path, true).await.unwrap();
        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        for expected in ["agents", "instances", "messages", "queues", "tickets"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
        db.checkpoint().await.unwrap();
        drop(db);

        Database::open(path, true).await.unwrap();
    }
}
