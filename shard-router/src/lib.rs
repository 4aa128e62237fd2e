//! Time-sharded SQL router: rewrites `INSERT`s into per-window shard
//! tables, materializing each shard table's schema on first use and
//! executing multi-row inserts as one atomic transaction per shard split.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod materializer;
pub mod planner;
pub mod types;

pub use connection::{ExecResult, PgConnection, SqlConnection, SqlTransaction};
pub use error::{Error, Result};
pub use executor::Insert;
pub use materializer::ShardMaterializer;
pub use planner::plan_insert;
pub use types::{AggregateResult, BindArgs, BindValue, Primitive, RouterConfig, ShardingConf, SingleRow};

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::ParserError;

/// Parse one `sql` statement with the dialect this router targets.
///
/// `sqlparser::ast::Statement::Insert` is the statement shape the router
/// understands; callers needing a different dialect should parse with
/// `sqlparser` directly and call [`plan_insert`].
pub fn parse_statement(sql: &str) -> std::result::Result<Statement, ParserError> {
    let mut statements = sqlparser::parser::Parser::parse_sql(&GenericDialect {}, sql)?;
    if statements.len() != 1 {
        return Err(ParserError::ParserError(format!(
            "expected exactly one statement, got {}",
            statements.len()
        )));
    }
    Ok(statements.remove(0))
}

/// Route and execute one `INSERT` end-to-end: parse, plan (materializing
/// any missing shard tables along the way), then execute.
pub async fn route_and_execute(
    sql: &str,
    args: &BindArgs,
    config: &RouterConfig,
    materializer: &ShardMaterializer,
    conn: &dyn SqlConnection,
) -> Result<AggregateResult> {
    let stmt = parse_statement(sql)?;
    let plan = plan_insert(sql, &stmt, args, config)?;

    if let Primitive::ShardedInsert { rows } = &plan {
        for row in rows {
            let base_name = row
                .shard_table
                .rsplit_once("_ts_")
                .map(|(base, _)| base)
                .unwrap_or(&row.shard_table);
            materializer
                .ensure_shard_table(conn, base_name, &row.shard_table)
                .await?;
        }
    }

    Insert::new(plan).exec(conn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{FakeConnection, FakeConnectionHandle};
    use std::collections::HashMap;

    fn hourly_config() -> RouterConfig {
        let mut tables = HashMap::new();
        tables.insert(
            "foo".to_string(),
            ShardingConf {
                shard_col_name: "ts".to_string(),
                shard_interval_seconds: 3600,
                shard_start_time: 0,
            },
        );
        RouterConfig { tables }
    }

    #[tokio::test]
    async fn route_and_execute_materializes_and_inserts() {
        let conn = FakeConnectionHandle::new(
            FakeConnection::new().with_table_ddl("foo", "CREATE TABLE foo (id INT, ts BIGINT)"),
        );
        let materializer = ShardMaterializer::new();
        let sql = "INSERT INTO foo(id, ts) VALUES (1, 100), (2, 4000)";

        let result = route_and_execute(sql, &BindArgs::none(), &hourly_config(), &materializer, &conn)
            .await
            .unwrap();

        assert_eq!(result.rows_affected, 2);
        let executed = conn.inner.executed.lock().await;
        // 2 shard DDLs + 2 inserts
        assert_eq!(executed.len(), 4);
    }

    #[tokio::test]
    async fn route_and_execute_rejects_replace_before_any_ddl() {
        let conn = FakeConnectionHandle::new(
            FakeConnection::new().with_table_ddl("foo", "CREATE TABLE foo (id INT, ts BIGINT)"),
        );
        let materializer = ShardMaterializer::new();
        let sql = "REPLACE INTO foo(id, ts) VALUES (1, 100)";

        let result = route_and_execute(sql, &BindArgs::none(), &hourly_config(), &materializer, &conn).await;

        assert!(matches!(result, Err(Error::UnsupportedShardedUpsert(_))));
        assert_eq!(conn.inner.executed.lock().await.len(), 0);
    }
}
