//! C1 — Shard Key Extractor.
//!
//! `extract_shard_ts` resolves the shard-column literal for one INSERT row
//! to an integer seconds-since-epoch timestamp.

use crate::error::{Error, Result};
use crate::types::{BindArgs, BindValue};
use sqlparser::ast::{Expr, Ident, Value};

/// Locate `shard_col_name`'s position in `columns`.
pub fn shard_column_index(columns: &[Ident], shard_col_name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c.value.eq_ignore_ascii_case(shard_col_name))
        .ok_or_else(|| Error::ShardColNotFound(shard_col_name.to_string()))
}

/// Resolve one row's shard-column expression to an integer timestamp.
///
/// Only a literal expression, or a parameter marker resolved against `args`,
/// is accepted — a function call expression (e.g. `strftime('now')`) fails
/// with [`Error::NonLiteralShardKey`].
pub fn extract_shard_ts(row: &[Expr], shard_col_idx: usize, args: &BindArgs) -> Result<i64> {
    let expr = row
        .get(shard_col_idx)
        .ok_or_else(|| Error::ShardColNotFound(format!("row has no value at index {shard_col_idx}")))?;

    let value = resolve_literal(expr, args)?;
    to_integer_ts(&value)
}

/// Resolve an expression to a [`BindValue`]: either a literal directly, or a
/// placeholder (`$n`/`:name`/`?`) looked up in `args`.
fn resolve_literal(expr: &Expr, args: &BindArgs) -> Result<BindValue> {
    match expr {
        Expr::Value(Value::Number(text, _)) => text
            .parse::<i64>()
            .map(BindValue::Integer)
            .or_else(|_| text.parse::<f64>().map(BindValue::Float))
            .map_err(|_| Error::BadShardKeyType(text.clone())),
        Expr::Value(Value::SingleQuotedString(s)) | Expr::Value(Value::DoubleQuotedString(s)) => {
            Ok(BindValue::Text(s.clone()))
        }
        Expr::Value(Value::Boolean(b)) => Ok(BindValue::Boolean(*b)),
        Expr::Value(Value::Null) => Ok(BindValue::Null),
        Expr::Value(Value::Placeholder(marker)) => resolve_placeholder(marker, args),
        Expr::UnaryOp { op, expr } if matches!(op, sqlparser::ast::UnaryOperator::Minus) => {
            match resolve_literal(expr, args)? {
                BindValue::Integer(i) => Ok(BindValue::Integer(-i)),
                BindValue::Float(f) => Ok(BindValue::Float(-f)),
                other => Err(Error::BadShardKeyType(format!("{other:?}"))),
            }
        }
        other => Err(Error::NonLiteralShardKey(other.to_string())),
    }
}

/// Resolve a parameter marker against `args`: `$n`/`?` address
/// [`BindArgs::positional`] (1-indexed for `$n`); `:name` addresses
/// [`BindArgs::named`] by the marker's name with the colon stripped.
pub fn resolve_placeholder(marker: &str, args: &BindArgs) -> Result<BindValue> {
    if let Some(ordinal) = marker.strip_prefix('$') {
        let idx: usize = ordinal
            .parse()
            .map_err(|_| Error::BindNotFound(marker.to_string()))?;
        return args
            .positional
            .get(idx.wrapping_sub(1))
            .cloned()
            .ok_or_else(|| Error::BindNotFound(marker.to_string()));
    }
    if let Some(name) = marker.strip_prefix(':') {
        return args
            .named
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BindNotFound(marker.to_string()));
    }
    if marker == "?" {
        return args
            .positional
            .first()
            .cloned()
            .ok_or_else(|| Error::BindNotFound(marker.to_string()));
    }
    Err(Error::BindNotFound(marker.to_string()))
}

fn to_integer_ts(value: &BindValue) -> Result<i64> {
    match value {
        BindValue::Integer(i) => Ok(*i),
        other => Err(Error::BadShardKeyType(format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::Ident;

    fn cols(names: &[&str]) -> Vec<Ident> {
        names.iter().map(|n| Ident::new(*n)).collect()
    }

    #[test]
    fn finds_shard_column_case_insensitively() {
        let columns = cols(&["id", "TS", "name"]);
        assert_eq!(shard_column_index(&columns, "ts").unwrap(), 1);
    }

    #[test]
    fn missing_shard_column_errors() {
        let columns = cols(&["id", "name"]);
        assert!(matches!(
            shard_column_index(&columns, "ts"),
            Err(Error::ShardColNotFound(_))
        ));
    }

    #[test]
    fn literal_integer_row_resolves() {
        let row = vec![
            Expr::Value(Value::Number("1".to_string(), false)),
            Expr::Value(Value::Number("100".to_string(), false)),
        ];
        assert_eq!(extract_shard_ts(&row, 1, &BindArgs::none()).unwrap(), 100);
    }

    #[test]
    fn ordinal_placeholder_resolves_against_args() {
        let row = vec![
            Expr::Value(Value::Number("1".to_string(), false)),
            Expr::Value(Value::Placeholder("$1".to_string())),
        ];
        let args = BindArgs::positional(vec![BindValue::Integer(4200)]);
        assert_eq!(extract_shard_ts(&row, 1, &args).unwrap(), 4200);
    }

    #[test]
    fn named_placeholder_resolves_against_named_args() {
        let row = vec![Expr::Value(Value::Placeholder(":ts".to_string()))];
        let mut args = BindArgs::none();
        args.named.insert("ts".to_string(), BindValue::Integer(99));
        assert_eq!(extract_shard_ts(&row, 0, &args).unwrap(), 99);
    }

    #[test]
    fn unresolved_placeholder_is_bind_not_found() {
        let row = vec![Expr::Value(Value::Placeholder("$1".to_string()))];
        assert!(matches!(
            extract_shard_ts(&row, 0, &BindArgs::none()),
            Err(Error::BindNotFound(_))
        ));
    }

    fn parse_expr(sql: &str) -> Expr {
        use sqlparser::dialect::GenericDialect;
        use sqlparser::parser::Parser;
        let select_sql = format!("SELECT {sql}");
        let stmts = Parser::parse_sql(&GenericDialect {}, &select_sql).unwrap();
        match &stmts[0] {
            sqlparser::ast::Statement::Query(query) => match &*query.body {
                sqlparser::ast::SetExpr::Select(select) => match &select.projection[0] {
                    sqlparser::ast::SelectItem::UnnamedExpr(expr) => expr.clone(),
                    other => panic!("unexpected projection item: {other:?}"),
                },
                other => panic!("unexpected query body: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn function_call_is_non_literal() {
        let row = vec![parse_expr("strftime('now')")];
        assert!(matches!(
            extract_shard_ts(&row, 0, &BindArgs::none()),
            Err(Error::NonLiteralShardKey(_))
        ));
    }

    #[test]
    fn non_integer_literal_is_bad_type() {
        let row = vec![Expr::Value(Value::SingleQuotedString("now".to_string()))];
        assert!(matches!(
            extract_shard_ts(&row, 0, &BindArgs::none()),
            Err(Error::BadShardKeyType(_))
        ));
    }
}
