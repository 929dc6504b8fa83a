//! Student record store.
//!
//! # Responsibility
//! - Own the store connection and the table descriptor it serves.
//! - Create the schema on request and hand out units of work.
//!
//! # Invariants
//! - The `students` descriptor is passed in explicitly; there is no global
//!   schema registration.
//! - At most one `Session` borrows the store at a time.

use crate::config::StoreConfig;
use crate::db::schema::{create_schema, TableSchema, STUDENTS};
use crate::db::{open_target, DbResult};
use crate::session::{EnrolledDefault, Session, SessionResult};
use rusqlite::Connection;

/// Relational store for `Student` records.
pub struct StudentStore {
    conn: Connection,
    schema: TableSchema,
    enrolled_default: EnrolledDefault,
}

impl StudentStore {
    /// Opens the configured database with the `students` descriptor.
    ///
    /// Under `EnrolledDatePolicy::FixedAtOpen` the enrollment default is
    /// captured here, once.
    pub fn open(config: &StoreConfig) -> DbResult<Self> {
        let conn = open_target(&config.target)?;
        Ok(Self::with_connection(conn, STUDENTS, config))
    }

    /// Wraps an already open connection.
    pub fn with_connection(conn: Connection, schema: TableSchema, config: &StoreConfig) -> Self {
        Self {
            conn,
            schema,
            enrolled_default: EnrolledDefault::from_policy(config.enrolled_date),
        }
    }

    /// Creates the table, constraints and index when absent. Idempotent.
    pub fn create_schema(&mut self) -> DbResult<()> {
        create_schema(&mut self.conn, &self.schema)
    }

    /// Begins a unit of work.
    ///
    /// # Errors
    /// - `SessionError::Repo` when the schema has not been created.
    pub fn open_session(&mut self) -> SessionResult<Session<'_>> {
        Session::begin(&mut self.conn, self.enrolled_default)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Direct access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
