//! C2 — Shard Schema Materializer.
//!
//! `ensure_shard_table` is idempotent and safe under concurrent callers for
//! the same shard name: an in-memory known-set short-circuits repeat calls,
//! and a per-table single-flight lock (keyed by shard name) collapses
//! concurrent misses into one DDL execution, with the store's own
//! `CREATE TABLE IF NOT EXISTS` as the ultimate guard against a race this
//! process doesn't know about (e.g. another process materializing the same
//! shard).

use crate::connection::SqlConnection;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tracks which shard tables are known to exist, and single-flights
/// concurrent materialization attempts for the same shard name.
pub struct ShardMaterializer {
    known: Mutex<HashSet<String>>,
    inflight: Mutex<std::collections::HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for ShardMaterializer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardMaterializer {
    /// A materializer with no known shard tables yet.
    pub fn new() -> Self {
        Self {
            known: Mutex::new(HashSet::new()),
            inflight: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Idempotently create `shard_name` by mirroring `base_name`'s schema,
    /// if it is not already known to exist.
    pub async fn ensure_shard_table(
        &self,
        conn: &dyn SqlConnection,
        base_name: &str,
        shard_name: &str,
    ) -> Result<()> {
        if self.known.lock().await.contains(shard_name) {
            return Ok(());
        }

        let lane = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(shard_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lane.lock().await;

        // Re-check after acquiring the single-flight lock: another caller may
        // have materialized the table while we were waiting.
        if self.known.lock().await.contains(shard_name) {
            return Ok(());
        }

        let base_ddl = conn
            .fetch_table_ddl(base_name)
            .await
            .map_err(|e| Error::SchemaFetchFailed(base_name.to_string(), e.to_string()))?;

        let shard_ddl = rewrite_ddl(&base_ddl, base_name, shard_name)
            .ok_or_else(|| Error::SchemaRewriteFailed(shard_name.to_string()))?;

        conn.execute(&shard_ddl, &[])
            .await
            .map_err(|e| {
                tracing::error!(shard = %shard_name, error = %e, "shard DDL execution failed");
                Error::ShardDdlFailed(shard_name.to_string(), e.to_string())
            })?;

        self.known.lock().await.insert(shard_name.to_string());
        self.inflight.lock().await.remove(shard_name);
        tracing::debug!(shard = %shard_name, "materialized shard table");
        Ok(())
    }
}

/// Textually substitute the base table name with the shard name in the DDL.
/// Returns `None` if `base_name` does not appear in `ddl` as a whole
/// identifier (a defensive check against accidental partial matches, e.g.
/// `orders` inside `order_items`).
fn rewrite_ddl(ddl: &str, base_name: &str, shard_name: &str) -> Option<String> {
    let mut out = String::with_capacity(ddl.len());
    let mut rest = ddl;
    let mut replaced_any = false;

    while let Some(pos) = rest.find(base_name) {
        let before_ok = rest[..pos]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric() && c != '_')
            .unwrap_or(true);
        let after_idx = pos + base_name.len();
        let after_ok = rest[after_idx..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric() && c != '_')
            .unwrap_or(true);

        out.push_str(&rest[..pos]);
        if before_ok && after_ok {
            out.push_str(shard_name);
            replaced_any = true;
        } else {
            out.push_str(base_name);
        }
        rest = &rest[after_idx..];
    }
    out.push_str(rest);

    replaced_any.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{FakeConnection, FakeConnectionHandle};

    #[test]
    fn rewrite_replaces_whole_identifier_only() {
        let ddl = "CREATE TABLE orders (id INT)";
        let rewritten = rewrite_ddl(ddl, "orders", "orders_ts_0").unwrap();
        assert_eq!(rewritten, "CREATE TABLE orders_ts_0 (id INT)");
    }

    #[test]
    fn rewrite_does_not_touch_partial_identifier_matches() {
        let ddl = "CREATE TABLE order_items (id INT)";
        assert!(rewrite_ddl(ddl, "order", "order_ts_0").is_none());
    }

    #[tokio::test]
    async fn ensure_shard_table_is_idempotent() {
        let conn = FakeConnectionHandle::new(
            FakeConnection::new().with_table_ddl("orders", "CREATE TABLE orders (id INT, ts BIGINT)"),
        );
        let materializer = ShardMaterializer::new();

        materializer
            .ensure_shard_table(&conn, "orders", "orders_ts_0")
            .await
            .unwrap();
        materializer
            .ensure_shard_table(&conn, "orders", "orders_ts_0")
            .await
            .unwrap();

        let executed = conn.inner.executed.lock().await;
        assert_eq!(executed.len(), 1);
        assert!(executed[0].0.contains("orders_ts_0"));
    }

    #[tokio::test]
    async fn missing_base_schema_fails() {
        let conn = FakeConnectionHandle::new(FakeConnection::new());
        let materializer = ShardMaterializer::new();
        let result = materializer.ensure_shard_table(&conn, "orders", "orders_ts_0").await;
        assert!(matches!(result, Err(Error::SchemaFetchFailed(_, _))));
    }
}
