//! The row-store driver boundary.
//!
//! The underlying row-store driver is treated as an external collaborator
//! exposing `Begin`/`Exec`/`Commit`/`Rollback` — modeled as the
//! [`SqlConnection`]/[`SqlTransaction`] traits rather than calling `sqlx`
//! directly from the planner/executor, so the planner and executor can be
//! tested against an in-memory fake instead of a live Postgres instance.
//! [`PgConnection`] is the real implementation, backed by `sqlx::PgPool`.

use crate::error::{Error, Result};
use crate::types::BindValue;
use async_trait::async_trait;

/// Outcome of executing one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Number of rows the statement affected
    pub rows_affected: u64,
    /// Driver-reported last insert id, if any
    pub last_insert_id: Option<i64>,
}

/// An open transaction against the row-store.
#[async_trait]
pub trait SqlTransaction: Send {
    /// Execute one statement within this transaction.
    async fn execute(&mut self, sql: &str, args: &[BindValue]) -> Result<ExecResult>;

    /// Commit the transaction, applying all statements executed on it.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll back the transaction, discarding all statements executed on it.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A handle to the underlying row-store, capable of beginning transactions,
/// executing statements directly, and fetching a base table's schema DDL
/// (used by the shard schema materializer, C2).
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// `Begin`
    async fn begin(&self) -> Result<Box<dyn SqlTransaction>>;

    /// Execute a statement directly on the connection (used for
    /// [`crate::types::Primitive::Passthrough`], which bypasses transactions).
    async fn execute(&self, sql: &str, args: &[BindValue]) -> Result<ExecResult>;

    /// Fetch the DDL that created `table`, for C2 to textually rewrite into
    /// a shard table's DDL.
    async fn fetch_table_ddl(&self, table: &str) -> Result<String>;
}

/// Postgres-backed [`SqlConnection`], via `sqlx::PgPool`.
pub struct PgConnection {
    pool: sqlx::PgPool,
}

impl PgConnection {
    /// Wrap an existing pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

fn bind_one<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        BindValue::Integer(v) => query.bind(v),
        BindValue::Text(v) => query.bind(v),
        BindValue::Float(v) => query.bind(v),
        BindValue::Boolean(v) => query.bind(v),
        BindValue::Null => query.bind(None::<i64>),
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn begin(&self) -> Result<Box<dyn SqlTransaction>> {
        let txn = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { inner: Some(txn) }))
    }

    async fn execute(&self, sql: &str, args: &[BindValue]) -> Result<ExecResult> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = bind_one(query, arg);
        }
        let result = query.execute(&self.pool).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn fetch_table_ddl(&self, table: &str) -> Result<String> {
        // Postgres has no `SHOW CREATE TABLE`; we rely on an operator-installed
        // helper function that reflects `pg_catalog` into a `CREATE TABLE` string.
        let row: (String,) = sqlx::query_as("SELECT shard_router_table_ddl($1)")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::SchemaFetchFailed(table.to_string(), e.to_string()))?;
        Ok(row.0)
    }
}

struct PgTransaction {
    inner: Option<sqlx::Transaction<'static, sqlx::Postgres>>,
}

#[async_trait]
impl SqlTransaction for PgTransaction {
    async fn execute(&mut self, sql: &str, args: &[BindValue]) -> Result<ExecResult> {
        let txn = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::Execution("transaction already finished".to_string()))?;
        let mut query = sqlx::query(sql);
        for arg in args {
            query = bind_one(query, arg);
        }
        let result = query.execute(&mut **txn).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let txn = self
            .inner
            .take()
            .ok_or_else(|| Error::Execution("transaction already finished".to_string()))?;
        txn.commit().await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let txn = self
            .inner
            .take()
            .ok_or_else(|| Error::Execution("transaction already finished".to_string()))?;
        txn.rollback().await?;
        Ok(())
    }
}
