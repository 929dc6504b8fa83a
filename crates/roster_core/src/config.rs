//! Store and logging configuration.
//!
//! # Responsibility
//! - Describe where the student store lives (`StoreTarget`).
//! - Decide how the `enrolled_date` column default is evaluated.
//! - Carry logging level/directory for `init_logging`.
//!
//! # Invariants
//! - Configuration is plain data; nothing here reads environment variables.
//! - Connection strings follow the `sqlite://` URL shape.

use crate::db::{DbError, DbResult};
use std::path::PathBuf;

const SQLITE_SCHEME: &str = "sqlite://";
const MEMORY_DATABASE: &str = ":memory:";
const DEFAULT_LOG_DIR_NAME: &str = "roster-logs";

/// Physical location of the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// Private in-memory database, discarded when the store is dropped.
    Memory,
    /// File-backed database at the given path.
    File(PathBuf),
}

impl StoreTarget {
    /// Parses a SQLite connection string.
    ///
    /// Accepted shapes:
    /// - `sqlite://` and `sqlite:///:memory:` -> [`StoreTarget::Memory`]
    /// - `sqlite:///relative.db` -> relative file path
    /// - `sqlite:////abs/path.db` -> absolute file path
    ///
    /// # Errors
    /// - Returns `DbError::InvalidConnectionString` for other schemes or a
    ///   non-empty host component.
    pub fn parse(url: &str) -> DbResult<Self> {
        let trimmed = url.trim();
        let rest = trimmed.strip_prefix(SQLITE_SCHEME).ok_or_else(|| {
            DbError::InvalidConnectionString(format!(
                "`{trimmed}` must start with `{SQLITE_SCHEME}`"
            ))
        })?;

        if rest.is_empty() {
            return Ok(Self::Memory);
        }

        let path = rest.strip_prefix('/').ok_or_else(|| {
            DbError::InvalidConnectionString(format!(
                "`{trimmed}` has a host component; sqlite urls take no host"
            ))
        })?;

        if path.is_empty() || path == MEMORY_DATABASE {
            return Ok(Self::Memory);
        }

        Ok(Self::File(PathBuf::from(path)))
    }

    /// Short label attached to `db_open` log events.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

/// Evaluation rule for the `enrolled_date` column default.
///
/// Only applies to students whose `enrolled_date` is `None` when flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrolledDatePolicy {
    /// One timestamp is captured when the store is opened and reused for
    /// every insert made through it.
    #[default]
    FixedAtOpen,
    /// A fresh timestamp is taken for each inserted row.
    PerInsert,
}

/// Store configuration passed to `StudentStore::open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub target: StoreTarget,
    pub enrolled_date: EnrolledDatePolicy,
}

impl StoreConfig {
    /// In-memory store with the default enrolled-date policy.
    pub fn in_memory() -> Self {
        Self {
            target: StoreTarget::Memory,
            enrolled_date: EnrolledDatePolicy::default(),
        }
    }

    /// Builds a config from a connection string.
    pub fn from_url(url: &str) -> DbResult<Self> {
        Ok(Self {
            target: StoreTarget::parse(url)?,
            enrolled_date: EnrolledDatePolicy::default(),
        })
    }

    pub fn with_enrolled_date(mut self, policy: EnrolledDatePolicy) -> Self {
        self.enrolled_date = policy;
        self
    }
}

/// Logging configuration for `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// One of `trace|debug|info|warn|error` (case-insensitive).
    pub level: String,
    /// Absolute directory where rolling log files are written.
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: std::env::temp_dir().join(DEFAULT_LOG_DIR_NAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EnrolledDatePolicy, StoreConfig, StoreTarget};
    use crate::db::DbError;
    use std::path::PathBuf;

    #[test]
    fn memory_urls_parse_to_memory_target() {
        assert_eq!(StoreTarget::parse("sqlite://").unwrap(), StoreTarget::Memory);
        assert_eq!(
            StoreTarget::parse("sqlite:///:memory:").unwrap(),
            StoreTarget::Memory
        );
    }

    #[test]
    fn file_urls_keep_relative_and_absolute_paths() {
        assert_eq!(
            StoreTarget::parse("sqlite:///school.db").unwrap(),
            StoreTarget::File(PathBuf::from("school.db"))
        );
        assert_eq!(
            StoreTarget::parse("sqlite:////var/data/school.db").unwrap(),
            StoreTarget::File(PathBuf::from("/var/data/school.db"))
        );
    }

    #[test]
    fn foreign_scheme_and_host_are_rejected() {
        assert!(matches!(
            StoreTarget::parse("postgres://localhost/school"),
            Err(DbError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            StoreTarget::parse("sqlite://host/school.db"),
            Err(DbError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn from_url_uses_fixed_enrolled_default() {
        let config = StoreConfig::from_url("sqlite://").unwrap();
        assert_eq!(config.enrolled_date, EnrolledDatePolicy::FixedAtOpen);
        let config = config.with_enrolled_date(EnrolledDatePolicy::PerInsert);
        assert_eq!(config.enrolled_date, EnrolledDatePolicy::PerInsert);
    }
}
