//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Confirm the engine answers before handing the connection out.
//!
//! # Invariants
//! - Opening never creates application tables; that is `create_schema`'s job.
//! - Every open attempt emits exactly one terminal `db_open` event.

use super::DbResult;
use crate::config::StoreTarget;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file.
///
/// # Side effects
/// - Creates the file when it does not exist.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_target(&StoreTarget::File(path.as_ref().to_path_buf()))
}

/// Opens a private in-memory SQLite database.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_target(&StoreTarget::Memory)
}

/// Opens the database described by a parsed connection target.
///
/// The target's `mode()` label is attached to every `db_open` event.
pub fn open_target(target: &StoreTarget) -> DbResult<Connection> {
    open_with(target.mode(), || match target {
        StoreTarget::Memory => Connection::open_in_memory(),
        StoreTarget::File(path) => Connection::open(path),
    })
}

fn open_with(
    mode: &'static str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match engine_version(&conn) {
        Ok(version) => {
            info!(
                "event=db_open module=db status=ok mode={mode} engine_version={version} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_version_check_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

fn engine_version(conn: &Connection) -> rusqlite::Result<String> {
    conn.query_row("SELECT sqlite_version();", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::{open_db, open_target};
    use crate::config::StoreTarget;

    #[test]
    fn file_target_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("school.db");
        let target = StoreTarget::File(path.clone());
        assert_eq!(target.mode(), "file");

        open_target(&target).unwrap();
        assert!(path.exists());
        assert!(open_db(&path).is_ok());
    }

    #[test]
    fn memory_target_answers_queries() {
        let target = StoreTarget::Memory;
        assert_eq!(target.mode(), "memory");

        let conn = open_target(&target).unwrap();
        let one: i64 = conn.query_row("SELECT 1;", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }
}
