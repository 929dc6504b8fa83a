//! Filter predicates, ordering terms and aggregate functions.
//!
//! Built from `StudentColumn` helpers, e.g.
//! `StudentColumn::Name.like("%Alan%")` or `StudentColumn::Grade.desc()`.

use crate::model::student::{ColumnType, StudentColumn};
use crate::model::value::FieldValue;
use rusqlite::types::Value;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Boolean condition over one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Compare {
        column: StudentColumn,
        op: CompareOp,
        value: FieldValue,
    },
    /// SQL `LIKE` with `%` and `_` wildcards (ASCII case-insensitive).
    Like {
        column: StudentColumn,
        pattern: String,
    },
}

impl Predicate {
    /// Appends this condition to `sql`, pushing its bind values.
    pub(crate) fn render(&self, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Self::Compare { column, op, value } => {
                if value.is_null() {
                    // `= NULL` never matches; equality maps to the SQL null
                    // tests and ordering against NULL matches nothing.
                    match op {
                        CompareOp::Eq => sql.push_str(&format!("{} IS NULL", column.name())),
                        CompareOp::Ne => sql.push_str(&format!("{} IS NOT NULL", column.name())),
                        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                            sql.push_str("1 = 0")
                        }
                    }
                    return;
                }
                sql.push_str(&format!("{} {} ?", column.name(), op.sql()));
                binds.push(value.to_sql_value());
            }
            Self::Like { column, pattern } => {
                sql.push_str(&format!("{} LIKE ?", column.name()));
                binds.push(Value::Text(pattern.clone()));
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: StudentColumn,
    pub direction: Direction,
}

impl OrderTerm {
    pub(crate) fn sql(&self) -> String {
        match self.direction {
            Direction::Asc => format!("{} ASC", self.column.name()),
            Direction::Desc => format!("{} DESC", self.column.name()),
        }
    }
}

/// A bare column orders ascending.
impl From<StudentColumn> for OrderTerm {
    fn from(column: StudentColumn) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }
}

/// Scalar aggregate over the filtered row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// `count(*)`.
    CountAll,
    /// `count(column)`: non-null values only.
    Count(StudentColumn),
    Min(StudentColumn),
    Max(StudentColumn),
    Sum(StudentColumn),
}

impl Aggregate {
    pub(crate) fn sql(self) -> String {
        match self {
            Self::CountAll => "count(*)".to_string(),
            Self::Count(column) => format!("count({})", column.name()),
            Self::Min(column) => format!("min({})", column.name()),
            Self::Max(column) => format!("max({})", column.name()),
            Self::Sum(column) => format!("sum({})", column.name()),
        }
    }

    /// Storage class of the aggregate result.
    pub(crate) fn result_type(self) -> ColumnType {
        match self {
            Self::CountAll | Self::Count(_) | Self::Sum(_) => ColumnType::Integer,
            Self::Min(column) | Self::Max(column) => column.column_type(),
        }
    }
}

impl StudentColumn {
    pub fn eq(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    pub fn like(self, pattern: impl Into<String>) -> Predicate {
        Predicate::Like {
            column: self,
            pattern: pattern.into(),
        }
    }

    pub fn asc(self) -> OrderTerm {
        OrderTerm::from(self)
    }

    pub fn desc(self) -> OrderTerm {
        OrderTerm {
            column: self,
            direction: Direction::Desc,
        }
    }

    fn compare(self, op: CompareOp, value: impl Into<FieldValue>) -> Predicate {
        Predicate::Compare {
            column: self,
            op,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::student::StudentColumn;
    use crate::model::value::FieldValue;
    use rusqlite::types::Value;

    #[test]
    fn like_and_compare_render_with_placeholders() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        StudentColumn::Name.like("%Alan%").render(&mut sql, &mut binds);
        sql.push_str(" AND ");
        StudentColumn::Grade.ge(11).render(&mut sql, &mut binds);

        assert_eq!(sql, "name LIKE ? AND grade >= ?");
        assert_eq!(
            binds,
            vec![Value::Text("%Alan%".to_string()), Value::Integer(11)]
        );
    }

    #[test]
    fn null_comparison_renders_null_test_without_bind() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        StudentColumn::Email
            .ne(FieldValue::Null)
            .render(&mut sql, &mut binds);
        assert_eq!(sql, "email IS NOT NULL");
        assert!(binds.is_empty());

        let mut sql = String::new();
        StudentColumn::Email
            .eq(FieldValue::Null)
            .render(&mut sql, &mut binds);
        assert_eq!(sql, "email IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn ordering_against_null_matches_nothing() {
        for predicate in [
            StudentColumn::Grade.lt(FieldValue::Null),
            StudentColumn::Grade.le(FieldValue::Null),
            StudentColumn::Grade.gt(FieldValue::Null),
            StudentColumn::Grade.ge(FieldValue::Null),
        ] {
            let mut sql = String::new();
            let mut binds = Vec::new();
            predicate.render(&mut sql, &mut binds);
            assert_eq!(sql, "1 = 0");
            assert!(binds.is_empty());
        }
    }

    #[test]
    fn bare_column_orders_ascending() {
        assert_eq!(StudentColumn::Name.asc().sql(), "name ASC");
        assert_eq!(StudentColumn::Grade.desc().sql(), "grade DESC");
    }
}
