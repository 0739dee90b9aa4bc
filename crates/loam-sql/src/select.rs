//! SELECT query descriptors.
//!
//! A [`SelectQuery`] binds a projection, an optional condition tree, and an
//! optional row limit to one target table. Validation happens at
//! construction; rendering is a pure function of the descriptor.

use crate::error::{QueryError, Result};
use crate::expr::{ColumnRef, Expr};

/// A row cap, rendered as `LIMIT n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(u64);

impl Limit {
    /// Creates a limit of `n` rows.
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the row cap.
    pub const fn rows(self) -> u64 {
        self.0
    }

    /// Renders this limit as a SQL fragment.
    pub fn to_sql(self) -> String {
        format!("LIMIT {}", self.0)
    }
}

/// An immutable SELECT descriptor.
///
/// The projection is an ordered list of qualified columns; every column must
/// belong to the same table. An empty projection is allowed only with an
/// explicit table and renders as `*`.
///
/// ```
/// use loam_sql::{ColumnRef, Expr, Limit, SelectQuery};
///
/// let query = SelectQuery::new(
///     vec![
///         ColumnRef::new("Person", "id"),
///         ColumnRef::new("Person", "age"),
///     ],
///     Some(Expr::gt(ColumnRef::new("Person", "age"), 18)),
///     Some(Limit::new(10)),
///     None,
/// )
/// .unwrap();
/// assert_eq!(
///     query.to_sql(),
///     "SELECT Person.id, Person.age FROM Person WHERE Person.age > 18 LIMIT 10"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    projection: Vec<ColumnRef>,
    condition: Option<Expr>,
    limit: Option<Limit>,
}

impl SelectQuery {
    /// Creates a descriptor over `projection`, optionally filtered and
    /// limited.
    ///
    /// The target table is inferred from the projection; `table` must be
    /// given when the projection is empty.
    ///
    /// # Errors
    ///
    /// [`QueryError::MixedEntityProjection`] if the projected columns span
    /// more than one table; [`QueryError::UnresolvableEntityType`] if the
    /// projection is empty and no table was given.
    pub fn new(
        projection: Vec<ColumnRef>,
        condition: Option<Expr>,
        limit: Option<Limit>,
        table: Option<&str>,
    ) -> Result<Self> {
        let mut tables: Vec<&str> = projection.iter().map(ColumnRef::table).collect();
        tables.sort_unstable();
        tables.dedup();

        let table = match tables.as_slice() {
            [] => table
                .ok_or(QueryError::UnresolvableEntityType)?
                .to_string(),
            [single] => (*single).to_string(),
            _ => return Err(QueryError::MixedEntityProjection),
        };

        Ok(Self {
            table,
            projection,
            condition,
            limit,
        })
    }

    /// Returns the target table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the projected columns.
    pub fn projection(&self) -> &[ColumnRef] {
        &self.projection
    }

    /// Returns the condition, if any.
    pub const fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    /// Returns the row limit, if any.
    pub const fn limit(&self) -> Option<Limit> {
        self.limit
    }

    /// Renders the full SELECT statement.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");

        if self.projection.is_empty() {
            sql.push('*');
        } else {
            let columns: Vec<String> = self.projection.iter().map(ToString::to_string).collect();
            sql.push_str(&columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.to_sql());
        }

        if let Some(limit) = self.limit {
            sql.push(' ');
            sql.push_str(&limit.to_sql());
        }

        sql
    }
}
