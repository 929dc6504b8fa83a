//! Core library for the student record store.
//!
//! Defines the `students` schema, a unit-of-work session over it and a
//! lazy query builder, all on top of SQLite.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;
pub mod store;

pub use config::{EnrolledDatePolicy, LogConfig, StoreConfig, StoreTarget};
pub use db::schema::{ConstraintKind, ConstraintViolation, TableSchema, STUDENTS};
pub use db::{DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::student::{ColumnType, Student, StudentColumn, StudentId};
pub use model::value::{FieldValue, Record};
pub use query::{Aggregate, Columns, Direction, OrderTerm, Predicate, Query, StudentEntity};
pub use repo::student_repo::{RepoError, RepoResult, SqliteStudentRepository, StudentRepository};
pub use session::{CommitSummary, EntityKey, PendingKey, Session, SessionError, SessionResult};
pub use store::StudentStore;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
