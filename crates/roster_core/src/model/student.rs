//! Student domain model.
//!
//! # Responsibility
//! - Define the canonical in-memory student record.
//! - Name the persisted columns that queries can select, filter and order by.
//!
//! # Invariants
//! - `id` is `None` until the store assigns one (or the caller supplies one).
//! - `enrolled_date == None` means "use the column default" at insert time.
//! - Field assignment never validates; grade range and email uniqueness are
//!   checked when the owning session commits.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Integer primary key of a persisted student.
pub type StudentId = i64;

/// A student record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// System-assigned primary key.
    pub id: Option<StudentId>,
    /// Indexed, not unique.
    pub name: String,
    /// Unique across all students; at most 55 characters.
    pub email: String,
    /// School grade in `1..=12`.
    pub grade: i64,
    pub birthday: NaiveDateTime,
    pub enrolled_date: Option<NaiveDateTime>,
}

impl Student {
    /// Creates a transient student that has not been persisted yet.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        grade: i64,
        birthday: NaiveDateTime,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            grade,
            birthday,
            enrolled_date: None,
        }
    }

    /// Sets an explicit enrollment timestamp, bypassing the column default.
    pub fn with_enrolled_date(mut self, enrolled_date: NaiveDateTime) -> Self {
        self.enrolled_date = Some(enrolled_date);
        self
    }

    /// Sets an explicit primary key instead of letting the store assign one.
    pub fn with_id(mut self, id: StudentId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns whether the record carries a primary key.
    pub fn is_persistent(&self) -> bool {
        self.id.is_some()
    }
}

impl Display for Student {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "Student {id}: {}, Grade {}", self.name, self.grade),
            None => write!(f, "Student (transient): {}, Grade {}", self.name, self.grade),
        }
    }
}

/// Storage class of a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    DateTime,
}

/// Persisted `students` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudentColumn {
    Id,
    Name,
    Email,
    Grade,
    Birthday,
    EnrolledDate,
}

impl StudentColumn {
    /// All columns in table declaration order.
    pub const ALL: [StudentColumn; 6] = [
        Self::Id,
        Self::Name,
        Self::Email,
        Self::Grade,
        Self::Birthday,
        Self::EnrolledDate,
    ];

    /// SQL column name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
            Self::Grade => "grade",
            Self::Birthday => "birthday",
            Self::EnrolledDate => "enrolled_date",
        }
    }

    pub fn column_type(self) -> ColumnType {
        match self {
            Self::Id | Self::Grade => ColumnType::Integer,
            Self::Name | Self::Email => ColumnType::Text,
            Self::Birthday | Self::EnrolledDate => ColumnType::DateTime,
        }
    }
}

impl Display for StudentColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
