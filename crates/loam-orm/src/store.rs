//! The store connection wrapper.
//!
//! Every statement runs on its own connection: open, execute, close, on all
//! paths including failure. There is no pooling, no batching, and no
//! transaction spanning two statements; ordering guarantees are exactly
//! those of the caller's call sequence.

use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Connection, Row, SqliteConnection, TypeInfo, ValueRef};
use tracing::trace;

use crate::error::{OrmError, Result};

/// A dynamically typed value read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Integer column value.
    Integer(i64),
    /// Floating-point column value.
    Real(f64),
    /// Text column value.
    Text(String),
}

/// The outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementOutput {
    /// Result rows, one dynamically typed value per selected column.
    pub rows: Vec<Vec<SqlValue>>,
    /// The rowid assigned by the most recent INSERT on this connection.
    pub last_insert_id: i64,
}

/// Connection-per-statement access to one SQLite database.
#[derive(Debug, Clone)]
pub struct Store {
    options: SqliteConnectOptions,
}

impl Store {
    /// Creates a store for the database at `path`, creating the file on
    /// first use.
    pub fn new(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            options: SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        }
    }

    /// Executes one statement against a fresh connection and returns the
    /// decoded rows together with the last inserted rowid.
    ///
    /// # Errors
    ///
    /// [`OrmError::Connection`] if the connection cannot be opened or
    /// closed; [`OrmError::Statement`] if the store rejects the statement.
    pub async fn execute(&self, sql: &str) -> Result<StatementOutput> {
        trace!(sql = %sql, "Executing statement");
        let mut conn = SqliteConnection::connect_with(&self.options)
            .await
            .map_err(OrmError::Connection)?;

        let output = Self::run(&mut conn, sql).await;
        let closed = conn.close().await.map_err(OrmError::Connection);
        match output {
            Ok(output) => {
                closed?;
                Ok(output)
            }
            Err(error) => Err(error),
        }
    }

    async fn run(conn: &mut SqliteConnection, sql: &str) -> Result<StatementOutput> {
        let raw_rows = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(OrmError::Statement)?;
        let last_insert_id: i64 = sqlx::query_scalar("SELECT last_insert_rowid()")
            .fetch_one(&mut *conn)
            .await
            .map_err(OrmError::Statement)?;

        let rows = raw_rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(StatementOutput {
            rows,
            last_insert_id,
        })
    }
}

/// Decodes one row into dynamically typed values, driven by the value type
/// SQLite reports per cell.
fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        let raw = row.try_get_raw(index).map_err(OrmError::Statement)?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let info = raw.type_info();
        let value = match info.name() {
            "INTEGER" => SqlValue::Integer(row.try_get(index).map_err(OrmError::Statement)?),
            "REAL" => SqlValue::Real(row.try_get(index).map_err(OrmError::Statement)?),
            _ => SqlValue::Text(row.try_get(index).map_err(OrmError::Statement)?),
        };
        values.push(value);
    }
    Ok(values)
}
