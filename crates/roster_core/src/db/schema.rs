//! Explicit table descriptors and schema creation.
//!
//! # Responsibility
//! - Describe persisted tables as plain values handed to the store.
//! - Render and apply idempotent DDL for a descriptor.
//! - Map SQLite constraint failures back to named schema constraints.
//!
//! # Invariants
//! - There is no process-wide registry: callers pass the descriptor in.
//! - `create_schema` is safe to call on an already matching database.
//! - Applied schema version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Schema version written by this binary.
pub const SCHEMA_VERSION: u32 = 1;

/// One persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub not_null: bool,
}

/// Table-level constraint kinds supported by the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintDefKind {
    PrimaryKey(&'static [&'static str]),
    Unique(&'static [&'static str]),
    Check(&'static str),
}

/// Named table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintDef {
    pub name: &'static str,
    pub kind: ConstraintDefKind,
}

/// Secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Complete description of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub constraints: &'static [ConstraintDef],
    pub indexes: &'static [IndexDef],
}

/// The `students` table.
pub const STUDENTS: TableSchema = TableSchema {
    name: "students",
    columns: &[
        ColumnDef {
            name: "id",
            sql_type: "INTEGER",
            not_null: false,
        },
        ColumnDef {
            name: "name",
            sql_type: "VARCHAR",
            not_null: true,
        },
        ColumnDef {
            name: "email",
            sql_type: "VARCHAR(55)",
            not_null: true,
        },
        ColumnDef {
            name: "grade",
            sql_type: "INTEGER",
            not_null: true,
        },
        ColumnDef {
            name: "birthday",
            sql_type: "DATETIME",
            not_null: true,
        },
        ColumnDef {
            name: "enrolled_date",
            sql_type: "DATETIME",
            not_null: true,
        },
    ],
    constraints: &[
        // A single INTEGER primary key makes `id` an alias of the rowid, so
        // SQLite assigns it when omitted from the insert.
        ConstraintDef {
            name: "id_pk",
            kind: ConstraintDefKind::PrimaryKey(&["id"]),
        },
        ConstraintDef {
            name: "unique_email",
            kind: ConstraintDefKind::Unique(&["email"]),
        },
        ConstraintDef {
            name: "grade_between_1_and_12",
            kind: ConstraintDefKind::Check("grade BETWEEN 1 AND 12"),
        },
        ConstraintDef {
            name: "email_at_most_55_chars",
            kind: ConstraintDefKind::Check("length(email) <= 55"),
        },
    ],
    indexes: &[IndexDef {
        name: "index_name",
        columns: &["name"],
    }],
};

impl TableSchema {
    /// Renders idempotent DDL for the table and its indexes.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                if column.not_null {
                    format!("{} {} NOT NULL", column.name, column.sql_type)
                } else {
                    format!("{} {}", column.name, column.sql_type)
                }
            })
            .collect();

        for constraint in self.constraints {
            let body = match constraint.kind {
                ConstraintDefKind::PrimaryKey(columns) => {
                    format!("PRIMARY KEY ({})", columns.join(", "))
                }
                ConstraintDefKind::Unique(columns) => format!("UNIQUE ({})", columns.join(", ")),
                ConstraintDefKind::Check(expr) => format!("CHECK ({expr})"),
            };
            parts.push(format!("CONSTRAINT {} {body}", constraint.name));
        }

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            parts.join(",\n    ")
        );
        for index in self.indexes {
            sql.push_str(&format!(
                "\nCREATE INDEX IF NOT EXISTS {} ON {} ({});",
                index.name,
                self.name,
                index.columns.join(", ")
            ));
        }
        sql
    }

    /// Returns column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|column| column.name)
    }

    /// Classifies a SQLite error as a constraint violation on this table.
    ///
    /// Returns `None` for errors that are not constraint failures.
    pub fn classify_violation(&self, err: &rusqlite::Error) -> Option<ConstraintViolation> {
        let rusqlite::Error::SqliteFailure(failure, message) = err else {
            return None;
        };
        if failure.code != ErrorCode::ConstraintViolation {
            return None;
        }

        let message = message.clone().unwrap_or_else(|| failure.to_string());
        let kind = match failure.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
            rusqlite::ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
            rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
            _ => ConstraintKind::from_message(&message)?,
        };
        let detail = message
            .split_once("constraint failed: ")
            .map(|(_, detail)| detail.trim())
            .unwrap_or_default();

        Some(ConstraintViolation {
            kind,
            constraint: self.constraint_name_for(kind, detail).map(str::to_string),
            message,
        })
    }

    fn constraint_name_for(&self, kind: ConstraintKind, detail: &str) -> Option<&'static str> {
        match kind {
            ConstraintKind::Check => self
                .constraints
                .iter()
                .find(|constraint| constraint.name == detail)
                .map(|constraint| constraint.name),
            ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
                let failed: Vec<&str> = detail
                    .split(',')
                    .map(|qualified| {
                        let qualified = qualified.trim();
                        qualified
                            .strip_prefix(self.name)
                            .and_then(|rest| rest.strip_prefix('.'))
                            .unwrap_or(qualified)
                    })
                    .collect();
                self.constraints
                    .iter()
                    .find(|constraint| match constraint.kind {
                        ConstraintDefKind::PrimaryKey(columns)
                        | ConstraintDefKind::Unique(columns) => columns == failed.as_slice(),
                        ConstraintDefKind::Check(_) => false,
                    })
                    .map(|constraint| constraint.name)
            }
            ConstraintKind::NotNull => None,
        }
    }
}

/// Category of a store-enforced rule that rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
    NotNull,
}

impl ConstraintKind {
    fn from_message(message: &str) -> Option<Self> {
        if message.starts_with("UNIQUE") {
            Some(Self::Unique)
        } else if message.starts_with("CHECK") {
            Some(Self::Check)
        } else if message.starts_with("NOT NULL") {
            Some(Self::NotNull)
        } else {
            None
        }
    }
}

/// A write rejected by a uniqueness, range or primary-key rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    /// Schema constraint name when it can be resolved (`unique_email`, ...).
    pub constraint: Option<String>,
    /// Raw engine message.
    pub message: String,
}

impl Display for ConstraintViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.constraint {
            Some(name) => write!(f, "constraint `{name}` violated: {}", self.message),
            None => write!(f, "constraint violated: {}", self.message),
        }
    }
}

impl Error for ConstraintViolation {}

/// Creates the table, its constraints and indexes when absent.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the database was written by a
///   newer schema version.
/// - `DbError::Sqlite` when DDL fails; nothing is applied in that case.
pub fn create_schema(conn: &mut Connection, schema: &TableSchema) -> DbResult<()> {
    let started_at = Instant::now();
    let current_version = current_user_version(conn)?;

    if current_version > SCHEMA_VERSION {
        error!(
            "event=schema_create module=db status=error table={} error_code=unsupported_version db_version={current_version}",
            schema.name
        );
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: SCHEMA_VERSION,
        });
    }

    let tx = conn.transaction()?;
    tx.execute_batch(&schema.create_sql())?;
    if current_version < SCHEMA_VERSION {
        tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    }
    tx.commit()?;

    info!(
        "event=schema_create module=db status=ok table={} from_version={current_version} to_version={SCHEMA_VERSION} duration_ms={}",
        schema.name,
        started_at.elapsed().as_millis()
    );
    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
