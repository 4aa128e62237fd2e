//! C4 — Plan Executor.
//!
//! `Insert::exec` runs a planned [`Primitive`] against a [`SqlConnection`]:
//! a `Passthrough` executes directly; a `ShardedInsert` runs every row
//! inside one transaction, rolling back and returning the first error if
//! any row fails.

use crate::connection::SqlConnection;
use crate::error::{Error, Result};
use crate::types::{AggregateResult, Primitive};
use tokio::sync::Mutex;

/// One planned statement, ready to execute. Holds an internal lock so the
/// same plan object is never re-entered concurrently.
pub struct Insert {
    plan: Primitive,
    lock: Mutex<()>,
}

impl Insert {
    /// Wrap a planned primitive for execution.
    pub fn new(plan: Primitive) -> Self {
        Self {
            plan,
            lock: Mutex::new(()),
        }
    }

    /// Execute the plan against `conn`.
    pub async fn exec(&self, conn: &dyn SqlConnection) -> Result<AggregateResult> {
        let _guard = self.lock.lock().await;

        match &self.plan {
            Primitive::Passthrough { query, args } => {
                let result = conn.execute(query, args).await?;
                Ok(AggregateResult {
                    rows_affected: result.rows_affected,
                    last_insert_id: result.last_insert_id,
                })
            }
            Primitive::ShardedInsert { rows } => self.exec_sharded(conn, rows).await,
        }
    }

    async fn exec_sharded(
        &self,
        conn: &dyn SqlConnection,
        rows: &[crate::types::SingleRow],
    ) -> Result<AggregateResult> {
        let mut txn = conn.begin().await?;
        let mut aggregate = AggregateResult::default();

        for row in rows {
            match txn.execute(&row.sql, &row.args).await {
                Ok(result) => {
                    aggregate.rows_affected += result.rows_affected;
                    if result.last_insert_id.is_some() {
                        aggregate.last_insert_id = result.last_insert_id;
                    }
                }
                Err(exec_err) => {
                    tracing::warn!(shard = %row.shard_table, error = %exec_err, "sharded insert row failed, rolling back");
                    if let Err(rollback_err) = txn.rollback().await {
                        return Err(Error::RollbackFailed(exec_err.to_string(), rollback_err.to_string()));
                    }
                    return Err(exec_err);
                }
            }
        }

        txn.commit().await?;
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{FakeConnection, FakeConnectionHandle};
    use crate::types::{BindValue, SingleRow};

    fn row(table: &str, sql: &str) -> SingleRow {
        SingleRow {
            shard_table: table.to_string(),
            sql: sql.to_string(),
            args: vec![BindValue::Integer(1)],
        }
    }

    #[tokio::test]
    async fn passthrough_executes_directly() {
        let conn = FakeConnectionHandle::new(FakeConnection::new());
        let insert = Insert::new(Primitive::Passthrough {
            query: "UPDATE plain SET x = 1".to_string(),
            args: vec![],
        });
        let result = insert.exec(&conn).await.unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(conn.inner.executed.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn sharded_insert_commits_all_rows() {
        let conn = FakeConnectionHandle::new(FakeConnection::new());
        let plan = Primitive::ShardedInsert {
            rows: vec![
                row("foo_ts_0", "INSERT INTO foo_ts_0 (id, ts) VALUES (1, 100)"),
                row("foo_ts_1", "INSERT INTO foo_ts_1 (id, ts) VALUES (2, 4000)"),
            ],
        };
        let insert = Insert::new(plan);
        let result = insert.exec(&conn).await.unwrap();
        assert_eq!(result.rows_affected, 2);
        assert_eq!(conn.inner.executed.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn failure_on_any_row_rolls_back_the_whole_insert() {
        let conn = FakeConnectionHandle::new(FakeConnection::new().failing_on("foo_ts_1"));
        let plan = Primitive::ShardedInsert {
            rows: vec![
                row("foo_ts_0", "INSERT INTO foo_ts_0 (id, ts) VALUES (1, 100)"),
                row("foo_ts_1", "INSERT INTO foo_ts_1 (id, ts) VALUES (2, 4000)"),
            ],
        };
        let insert = Insert::new(plan);
        let result = insert.exec(&conn).await;
        assert!(matches!(result, Err(Error::Execution(_))));
        // nothing committed: the first row's statement was only staged, never
        // merged into `executed`, because the transaction was rolled back.
        assert_eq!(conn.inner.executed.lock().await.len(), 0);
    }
}
