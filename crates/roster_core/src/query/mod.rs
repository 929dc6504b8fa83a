//! Lazy query descriptors over the `students` table.
//!
//! # Responsibility
//! - Compose selection, filters, ordering and limits without touching the
//!   store.
//! - Render the composed query to SQL and execute it inside a session.
//!
//! # Invariants
//! - A `Query` is plain data: it can be cloned and executed any number of
//!   times; each execution reads the store afresh.
//! - Filters combine by conjunction.
//! - Ordering applies before limit/offset; `id ASC` is always the final
//!   tie-breaker so `first()` is deterministic.
//! - Queries do not flush staged session changes.

mod predicate;

pub use predicate::{Aggregate, CompareOp, Direction, OrderTerm, Predicate};

use crate::db::schema::STUDENTS;
use crate::model::student::{Student, StudentColumn};
use crate::model::value::{FieldValue, Record};
use crate::repo::student_repo::{parse_student_row, RepoError, STUDENT_COLUMNS_SQL};
use crate::session::{Session, SessionResult};
use log::debug;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::time::Instant;

/// What a query returns per row.
pub trait Selection {
    fn select_list(&self) -> String;
}

/// Selects whole `Student` entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StudentEntity;

impl Selection for StudentEntity {
    fn select_list(&self) -> String {
        STUDENT_COLUMNS_SQL.to_string()
    }
}

/// Selects a column projection; rows come back as `Record`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns(Vec<StudentColumn>);

impl Columns {
    /// Projection in the given order. An empty list selects every column.
    pub fn of(columns: impl IntoIterator<Item = StudentColumn>) -> Self {
        let columns: Vec<StudentColumn> = columns.into_iter().collect();
        if columns.is_empty() {
            return Self(StudentColumn::ALL.to_vec());
        }
        Self(columns)
    }

    pub fn columns(&self) -> &[StudentColumn] {
        &self.0
    }
}

impl From<StudentColumn> for Columns {
    fn from(column: StudentColumn) -> Self {
        Self(vec![column])
    }
}

impl Selection for Columns {
    fn select_list(&self) -> String {
        self.0
            .iter()
            .map(|column| column.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Composable, not-yet-executed description of rows to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<S> {
    selection: S,
    predicates: Vec<Predicate>,
    ordering: Vec<OrderTerm>,
    limit: Option<u32>,
    offset: u32,
}

impl<S: Selection> Query<S> {
    pub(crate) fn new(selection: S) -> Self {
        Self {
            selection,
            predicates: Vec::new(),
            ordering: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Adds one condition; all conditions must hold.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds several conditions at once.
    pub fn filter_all(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    /// Appends a sort key. A bare `StudentColumn` sorts ascending.
    pub fn order_by(mut self, term: impl Into<OrderTerm>) -> Self {
        self.ordering.push(term.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn selection(&self) -> &S {
        &self.selection
    }

    /// Counts rows matching the filters (and limit/offset, when set).
    pub fn count(&self, session: &mut Session<'_>) -> SessionResult<u64> {
        let value = self.aggregate(session, Aggregate::CountAll)?;
        let count = value.as_i64().unwrap_or(0);
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")).into())
    }

    /// Executes a scalar aggregate over the filtered rows.
    ///
    /// `Min`/`Max`/`Sum` over an empty set yield `FieldValue::Null`.
    pub fn aggregate(
        &self,
        session: &mut Session<'_>,
        aggregate: Aggregate,
    ) -> SessionResult<FieldValue> {
        let started_at = Instant::now();
        let (sql, binds) = self.render_aggregate(aggregate);
        let value = session
            .connection()
            .query_row(&sql, params_from_iter(binds), |row| {
                Ok(FieldValue::from_sql(aggregate.result_type(), row.get_ref(0)?))
            })
            .map_err(RepoError::from)?
            .map_err(RepoError::InvalidData)?;

        debug!(
            "event=query_exec module=query status=ok kind=aggregate duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(value)
    }

    pub(crate) fn render(&self) -> (String, Vec<Value>) {
        self.render_with_limit(self.limit)
    }

    fn render_with_limit(&self, limit: Option<u32>) -> (String, Vec<Value>) {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.selection.select_list(),
            STUDENTS.name
        );
        let mut binds = Vec::new();
        self.push_where(&mut sql, &mut binds);

        sql.push_str(" ORDER BY ");
        for term in &self.ordering {
            sql.push_str(&term.sql());
            sql.push_str(", ");
        }
        sql.push_str("id ASC");

        push_limit(&mut sql, &mut binds, limit, self.offset);
        (sql, binds)
    }

    fn render_aggregate(&self, aggregate: Aggregate) -> (String, Vec<Value>) {
        let mut binds = Vec::new();
        if self.limit.is_none() && self.offset == 0 {
            let mut sql = format!("SELECT {} FROM {}", aggregate.sql(), STUDENTS.name);
            self.push_where(&mut sql, &mut binds);
            return (sql, binds);
        }

        let mut inner = format!("SELECT * FROM {}", STUDENTS.name);
        self.push_where(&mut inner, &mut binds);
        if !self.ordering.is_empty() {
            let terms: Vec<String> = self.ordering.iter().map(OrderTerm::sql).collect();
            inner.push_str(&format!(" ORDER BY {}, id ASC", terms.join(", ")));
        }
        push_limit(&mut inner, &mut binds, self.limit, self.offset);
        (format!("SELECT {} FROM ({inner})", aggregate.sql()), binds)
    }

    fn push_where(&self, sql: &mut String, binds: &mut Vec<Value>) {
        for (index, predicate) in self.predicates.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            predicate.render(sql, binds);
        }
    }
}

impl Query<StudentEntity> {
    /// Executes the query and materializes every matching student.
    ///
    /// Rows already tracked by the session come back as their in-session
    /// version.
    pub fn all(&self, session: &mut Session<'_>) -> SessionResult<Vec<Student>> {
        let (sql, binds) = self.render();
        self.load(session, &sql, binds)
    }

    /// Executes the query and returns the first row by current ordering.
    pub fn first(&self, session: &mut Session<'_>) -> SessionResult<Option<Student>> {
        let (sql, binds) = self.render_with_limit(Some(1));
        Ok(self.load(session, &sql, binds)?.into_iter().next())
    }

    fn load(
        &self,
        session: &mut Session<'_>,
        sql: &str,
        binds: Vec<Value>,
    ) -> SessionResult<Vec<Student>> {
        let started_at = Instant::now();
        let loaded = {
            let mut stmt = session.connection().prepare(sql).map_err(RepoError::from)?;
            let rows = stmt
                .query_map(params_from_iter(binds), parse_student_row)
                .map_err(RepoError::from)?;
            let collected = rows
                .collect::<rusqlite::Result<Vec<Student>>>()
                .map_err(RepoError::from)?;
            collected
        };

        let students: Vec<Student> = loaded
            .into_iter()
            .map(|student| session.attach_loaded(student))
            .collect();
        debug!(
            "event=query_exec module=query status=ok kind=entity rows={} duration_ms={}",
            students.len(),
            started_at.elapsed().as_millis()
        );
        Ok(students)
    }
}

impl Query<Columns> {
    /// Executes the projection and materializes every matching record.
    pub fn all(&self, session: &mut Session<'_>) -> SessionResult<Vec<Record>> {
        let (sql, binds) = self.render();
        self.load(session, &sql, binds)
    }

    pub fn first(&self, session: &mut Session<'_>) -> SessionResult<Option<Record>> {
        let (sql, binds) = self.render_with_limit(Some(1));
        Ok(self.load(session, &sql, binds)?.into_iter().next())
    }

    fn load(
        &self,
        session: &mut Session<'_>,
        sql: &str,
        binds: Vec<Value>,
    ) -> SessionResult<Vec<Record>> {
        let started_at = Instant::now();
        let columns = self.selection.columns();
        let mut stmt = session.connection().prepare(sql).map_err(RepoError::from)?;
        let mut rows = stmt.query(params_from_iter(binds)).map_err(RepoError::from)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(RepoError::from)? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let raw = row.get_ref(index).map_err(RepoError::from)?;
                let value = FieldValue::from_sql(column.column_type(), raw)
                    .map_err(|message| RepoError::InvalidData(format!("{column}: {message}")))?;
                values.push(value);
            }
            records.push(Record(values));
        }

        debug!(
            "event=query_exec module=query status=ok kind=columns rows={} duration_ms={}",
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }
}

fn push_limit(sql: &mut String, binds: &mut Vec<Value>, limit: Option<u32>, offset: u32) {
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        binds.push(Value::Integer(i64::from(limit)));
        if offset > 0 {
            sql.push_str(" OFFSET ?");
            binds.push(Value::Integer(i64::from(offset)));
        }
    } else if offset > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        binds.push(Value::Integer(i64::from(offset)));
    }
}

#[cfg(test)]
mod tests {
    use super::{Aggregate, Columns, Query, StudentEntity};
    use crate::model::student::StudentColumn;
    use rusqlite::types::Value;

    #[test]
    fn entity_query_renders_filters_ordering_and_limit() {
        let query = Query::new(StudentEntity)
            .filter(StudentColumn::Name.like("%Alan%"))
            .filter(StudentColumn::Grade.eq(11))
            .order_by(StudentColumn::Grade.desc())
            .limit(5);

        let (sql, binds) = query.render();
        assert_eq!(
            sql,
            "SELECT id, name, email, grade, birthday, enrolled_date FROM students \
             WHERE name LIKE ? AND grade = ? ORDER BY grade DESC, id ASC LIMIT ?"
        );
        assert_eq!(
            binds,
            vec![
                Value::Text("%Alan%".to_string()),
                Value::Integer(11),
                Value::Integer(5)
            ]
        );
    }

    #[test]
    fn column_query_renders_projection_in_order() {
        let query = Query::new(Columns::of([StudentColumn::Name, StudentColumn::Birthday]))
            .order_by(StudentColumn::Name)
            .offset(2);
        assert_eq!(
            query.selection().columns(),
            [StudentColumn::Name, StudentColumn::Birthday].as_slice()
        );
        let (sql, binds) = query.render();
        assert_eq!(
            sql,
            "SELECT name, birthday FROM students ORDER BY name ASC, id ASC LIMIT -1 OFFSET ?"
        );
        assert_eq!(binds, vec![Value::Integer(2)]);
    }

    #[test]
    fn empty_projection_selects_every_column() {
        assert_eq!(
            Columns::of(Vec::<StudentColumn>::new()).columns(),
            StudentColumn::ALL.as_slice()
        );
    }

    #[test]
    fn aggregate_wraps_limited_queries_in_subselect() {
        let plain = Query::new(StudentEntity).filter(StudentColumn::Grade.gt(5));
        let (sql, _) = plain.render_aggregate(Aggregate::CountAll);
        assert_eq!(sql, "SELECT count(*) FROM students WHERE grade > ?");

        let limited = plain.limit(1);
        let (sql, binds) = limited.render_aggregate(Aggregate::Max(StudentColumn::Grade));
        assert_eq!(
            sql,
            "SELECT max(grade) FROM (SELECT * FROM students WHERE grade > ? LIMIT ?)"
        );
        assert_eq!(binds, vec![Value::Integer(5), Value::Integer(1)]);
    }
}
