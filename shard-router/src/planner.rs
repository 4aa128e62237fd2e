//! C3 — INSERT Rewriter / Planner.
//!
//! `plan_insert` turns one multi-row `INSERT` into either a passthrough (the
//! base table carries no sharding config) or a set of single-row inserts,
//! each routed to its resolved shard table.

use crate::error::{Error, Result};
use crate::extractor::{resolve_placeholder, shard_column_index};
use crate::types::{BindArgs, BindValue, Primitive, RouterConfig, ShardingConf, SingleRow};
use sqlparser::ast::{Expr, Insert, SetExpr, Statement, Value};

/// Plan one statement against `config`.
///
/// `original_sql` is passed through verbatim for [`Primitive::Passthrough`];
/// `stmt` must be the parsed form of the same statement.
pub fn plan_insert(
    original_sql: &str,
    stmt: &Statement,
    args: &BindArgs,
    config: &RouterConfig,
) -> Result<Primitive> {
    let insert = match stmt {
        Statement::Insert(insert) => insert,
        other => return Err(Error::UnsupportedStatement(other.to_string())),
    };

    let base_name = insert
        .table_name
        .0
        .last()
        .map(|ident| ident.value.clone())
        .ok_or_else(|| Error::UnsupportedStatement("insert with empty table name".to_string()))?;

    let sharding = match config.sharding_for(&base_name) {
        Some(sharding) => sharding,
        None => {
            return Ok(Primitive::Passthrough {
                query: original_sql.to_string(),
                args: args.positional.clone(),
            });
        }
    };

    if is_replace_or_upsert(original_sql, insert) {
        return Err(Error::UnsupportedShardedUpsert(base_name));
    }

    let qualifier = qualifier_prefix(insert);
    let rows = extract_value_rows(insert)?;
    let shard_col_idx = shard_column_index(&insert.columns, &sharding.shard_col_name)?;
    let column_list = insert
        .columns
        .iter()
        .map(|c| c.value.clone())
        .collect::<Vec<_>>()
        .join(", ");
    let ignore_clause = if insert.ignore { "IGNORE " } else { "" };

    let mut planned_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let ts = crate::extractor::extract_shard_ts(row, shard_col_idx, args)?;
        let shard_id = sharding.shard_id(ts)?;
        let shard_table = format!("{qualifier}{}", ShardingConf::shard_table_name(&base_name, shard_id));
        let (values_sql, row_args) = render_row_values(row, args)?;

        let sql = format!("INSERT {ignore_clause}INTO {shard_table} ({column_list}) VALUES ({values_sql})");
        planned_rows.push(SingleRow {
            shard_table,
            sql,
            args: row_args,
        });
    }

    Ok(Primitive::ShardedInsert { rows: planned_rows })
}

/// `REPLACE INTO`/`ON DUPLICATE KEY UPDATE` are rejected for sharded tables.
/// Detected both from the statement's `ON` clause (if the
/// dialect the caller parsed with populates it) and from the raw SQL text,
/// since `REPLACE INTO` support varies by `sqlparser` dialect.
fn is_replace_or_upsert(original_sql: &str, insert: &Insert) -> bool {
    if insert.on.is_some() || insert.replace_into {
        return true;
    }
    let upper = original_sql.trim_start().to_ascii_uppercase();
    upper.starts_with("REPLACE") || upper.contains("ON DUPLICATE KEY UPDATE")
}

/// Keep any schema qualifier ahead of the table's final identifier: the
/// rewrite replaces `table.name` with the shard name but keeps the
/// qualifier.
fn qualifier_prefix(insert: &Insert) -> String {
    let segments = &insert.table_name.0;
    if segments.len() <= 1 {
        return String::new();
    }
    let qualifier: Vec<String> = segments[..segments.len() - 1].iter().map(|i| i.value.clone()).collect();
    format!("{}.", qualifier.join("."))
}

fn extract_value_rows(insert: &Insert) -> Result<&Vec<Vec<Expr>>> {
    let source = insert
        .source
        .as_ref()
        .ok_or_else(|| Error::UnsupportedStatement("INSERT without a VALUES source".to_string()))?;
    match source.body.as_ref() {
        SetExpr::Values(values) => Ok(&values.rows),
        other => Err(Error::UnsupportedStatement(format!(
            "INSERT source is not a VALUES list: {other}"
        ))),
    }
}

/// Render one row's value tuple as SQL text, renumbering any parameter
/// markers to `$1.. $k` against the pruned subset of `args` this row
/// actually references.
fn render_row_values(row: &[Expr], args: &BindArgs) -> Result<(String, Vec<BindValue>)> {
    let mut pruned = Vec::new();
    let mut parts = Vec::with_capacity(row.len());
    for expr in row {
        if let Expr::Value(Value::Placeholder(marker)) = expr {
            let value = resolve_placeholder(marker, args)?;
            pruned.push(value);
            parts.push(format!("${}", pruned.len()));
        } else {
            parts.push(expr.to_string());
        }
    }
    Ok((parts.join(", "), pruned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;
    use std::collections::HashMap;

    fn parse(sql: &str) -> Statement {
        Parser::parse_sql(&GenericDialect {}, sql).unwrap().remove(0)
    }

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

    #[test]
    fn unsharded_table_is_passthrough() {
        let sql = "INSERT INTO plain(id) VALUES (1)";
        let stmt = parse(sql);
        let plan = plan_insert(sql, &stmt, &BindArgs::none(), &RouterConfig::default()).unwrap();
        assert!(matches!(plan, Primitive::Passthrough { .. }));
    }

    #[test]
    fn multi_row_insert_splits_by_shard() {
        let sql = "INSERT INTO foo(id, ts) VALUES (1, 100), (2, 4000)";
        let stmt = parse(sql);
        let plan = plan_insert(sql, &stmt, &BindArgs::none(), &hourly_config()).unwrap();
        let Primitive::ShardedInsert { rows } = plan else {
            panic!("expected ShardedInsert");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].shard_table, "foo_ts_0");
        assert_eq!(rows[1].shard_table, "foo_ts_1");
        assert!(rows[0].sql.contains("INSERT INTO foo_ts_0"));
        assert!(rows[1].sql.contains("INSERT INTO foo_ts_1"));
    }

    #[test]
    fn replace_into_sharded_table_is_rejected() {
        let sql = "REPLACE INTO foo(id, ts) VALUES (1, 100)";
        let stmt = parse(sql);
        let result = plan_insert(sql, &stmt, &BindArgs::none(), &hourly_config());
        assert!(matches!(result, Err(Error::UnsupportedShardedUpsert(_))));
    }

    #[test]
    fn placeholders_are_renumbered_per_row() {
        let sql = "INSERT INTO foo(id, ts) VALUES ($1, $2), ($3, $4)";
        let stmt = parse(sql);
        let args = BindArgs::positional(vec![
            BindValue::Integer(1),
            BindValue::Integer(100),
            BindValue::Integer(2),
            BindValue::Integer(4000),
        ]);
        let plan = plan_insert(sql, &stmt, &args, &hourly_config()).unwrap();
        let Primitive::ShardedInsert { rows } = plan else {
            panic!("expected ShardedInsert");
        };
        assert_eq!(rows[0].args, vec![BindValue::Integer(1), BindValue::Integer(100)]);
        assert_eq!(rows[1].args, vec![BindValue::Integer(2), BindValue::Integer(4000)]);
        assert!(rows[0].sql.contains("VALUES ($1, $2)"));
    }
}
