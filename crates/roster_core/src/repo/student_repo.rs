//! Student repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide row-level insert/update/delete/get over `students`.
//! - Keep SQL details inside the persistence boundary.
//! - Translate engine constraint failures into `RepoError::Constraint`.
//!
//! # Invariants
//! - Repositories are only constructed over connections whose schema is
//!   present and current.
//! - Inserts require a resolved `enrolled_date`; defaults are applied by the
//!   session before rows reach this layer.

use crate::db::schema::{current_user_version, ConstraintViolation, SCHEMA_VERSION, STUDENTS};
use crate::db::DbError;
use crate::model::student::{Student, StudentId};
use crate::model::value::format_datetime;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Select list shared by every entity query, in `Student` field order.
pub(crate) const STUDENT_COLUMNS_SQL: &str = "id, name, email, grade, birthday, enrolled_date";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for student persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Constraint(ConstraintViolation),
    NotFound(StudentId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Constraint(violation) => write!(f, "{violation}"),
            Self::NotFound(id) => write!(f, "student not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted student data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match required {expected_version}; call create_schema first"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Constraint(violation) => Some(violation),
            Self::NotFound(_)
            | Self::InvalidData(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match STUDENTS.classify_violation(&value) {
            Some(violation) => Self::Constraint(violation),
            None => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// Repository interface for student rows.
pub trait StudentRepository {
    /// Inserts one row and returns its primary key.
    fn insert_student(&self, student: &Student) -> RepoResult<StudentId>;
    /// Rewrites every non-key column of an existing row.
    fn update_student(&self, student: &Student) -> RepoResult<()>;
    /// Removes one row by primary key.
    fn delete_student(&self, id: StudentId) -> RepoResult<()>;
    fn get_student(&self, id: StudentId) -> RepoResult<Option<Student>>;
}

/// SQLite-backed student repository.
///
/// Works over a plain `Connection` or a `Transaction` (via deref).
pub struct SqliteStudentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStudentRepository<'conn> {
    /// Constructs a repository over a connection with the student schema.
    ///
    /// # Errors
    /// - `UninitializedConnection` when `create_schema` has not run.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the layout
    ///   does not match the `students` descriptor.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Wraps a connection already known to be ready (an open transaction of
    /// a checked session).
    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl StudentRepository for SqliteStudentRepository<'_> {
    fn insert_student(&self, student: &Student) -> RepoResult<StudentId> {
        let enrolled_date = student.enrolled_date.ok_or_else(|| {
            RepoError::InvalidData("enrolled_date must be resolved before insert".to_string())
        })?;

        match student.id {
            Some(id) => {
                let mut stmt = self.conn.prepare_cached(
                    "INSERT INTO students (id, name, email, grade, birthday, enrolled_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                )?;
                stmt.execute(params![
                    id,
                    student.name.as_str(),
                    student.email.as_str(),
                    student.grade,
                    format_datetime(student.birthday),
                    format_datetime(enrolled_date),
                ])?;
                Ok(id)
            }
            None => {
                let mut stmt = self.conn.prepare_cached(
                    "INSERT INTO students (name, email, grade, birthday, enrolled_date)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                )?;
                stmt.execute(params![
                    student.name.as_str(),
                    student.email.as_str(),
                    student.grade,
                    format_datetime(student.birthday),
                    format_datetime(enrolled_date),
                ])?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    fn update_student(&self, student: &Student) -> RepoResult<()> {
        let id = student.id.ok_or_else(|| {
            RepoError::InvalidData("cannot update a student without an id".to_string())
        })?;
        let enrolled_date = student.enrolled_date.ok_or_else(|| {
            RepoError::InvalidData(format!("student {id} has no enrolled_date"))
        })?;

        let mut stmt = self.conn.prepare_cached(
            "UPDATE students
             SET
                name = ?1,
                email = ?2,
                grade = ?3,
                birthday = ?4,
                enrolled_date = ?5
             WHERE id = ?6;",
        )?;
        let changed = stmt.execute(params![
            student.name.as_str(),
            student.email.as_str(),
            student.grade,
            format_datetime(student.birthday),
            format_datetime(enrolled_date),
            id,
        ])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn delete_student(&self, id: StudentId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM students WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn get_student(&self, id: StudentId) -> RepoResult<Option<Student>> {
        let student = self
            .conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS_SQL} FROM students WHERE id = ?1;"),
                [id],
                parse_student_row,
            )
            .optional()?;
        Ok(student)
    }
}

/// Decodes one row selected with `STUDENT_COLUMNS_SQL`.
pub(crate) fn parse_student_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        grade: row.get(3)?,
        birthday: row.get::<_, NaiveDateTime>(4)?,
        enrolled_date: Some(row.get::<_, NaiveDateTime>(5)?),
    })
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let actual_version = current_user_version(conn)?;
    if actual_version != SCHEMA_VERSION {
        return Err(RepoError::UninitializedConnection {
            expected_version: SCHEMA_VERSION,
            actual_version,
        });
    }

    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [STUDENTS.name],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Err(RepoError::MissingRequiredTable(STUDENTS.name));
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", STUDENTS.name))?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<HashSet<String>>>()?;
    if let Some(column) = STUDENTS.column_names().find(|name| !present.contains(*name)) {
        return Err(RepoError::MissingRequiredColumn {
            table: STUDENTS.name,
            column,
        });
    }

    Ok(())
}
