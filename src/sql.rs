//! Parameterized statement builders for the structured CRUD operations.
//!
//! All data values travel as bound parameters in the target engine's
//! placeholder style. Table and column names cannot be parameterized in
//! SQL and are interpolated as received; callers own identifier hygiene.

use serde_json::Map;

use crate::error::GatewayError;
use crate::profile::EngineKind;
use crate::value::Value;

/// Number of rows fetched for a table's schema sample.
pub const SAMPLE_ROWS: usize = 5;

/// A SQL string plus the values to bind, in placeholder order.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

type JsonMap = Map<String, serde_json::Value>;

fn require_non_empty(map: &JsonMap, what: &str) -> Result<(), GatewayError> {
    if map.is_empty() {
        return Err(GatewayError::Validation(format!(
            "{what} must contain at least one column"
        )));
    }
    Ok(())
}

/// Render an AND-joined equality predicate, numbering placeholders from
/// `start` (1-indexed), and push the bound values onto `params`.
fn where_clause(
    engine: EngineKind,
    where_map: &JsonMap,
    start: usize,
    params: &mut Vec<Value>,
) -> String {
    let mut parts = Vec::with_capacity(where_map.len());
    for (i, (column, value)) in where_map.iter().enumerate() {
        parts.push(format!("{} = {}", column, engine.placeholder(start + i)));
        params.push(Value::from(value.clone()));
    }
    parts.join(" AND ")
}

/// `INSERT INTO table (cols) VALUES (placeholders)`.
pub fn insert(
    engine: EngineKind,
    table: &str,
    values: &JsonMap,
) -> Result<Statement, GatewayError> {
    require_non_empty(values, "insert values")?;

    let columns: Vec<&str> = values.keys().map(String::as_str).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|n| engine.placeholder(n)).collect();
    let params: Vec<Value> = values.values().map(|v| Value::from(v.clone())).collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok(Statement::new(sql, params))
}

/// `UPDATE table SET ... WHERE ...`; SET values bind before WHERE values
/// and placeholder numbering runs straight through both.
pub fn update(
    engine: EngineKind,
    table: &str,
    values: &JsonMap,
    where_map: &JsonMap,
) -> Result<Statement, GatewayError> {
    require_non_empty(values, "update values")?;
    require_non_empty(where_map, "update filter")?;

    let mut params = Vec::with_capacity(values.len() + where_map.len());
    let mut assignments = Vec::with_capacity(values.len());
    for (i, (column, value)) in values.iter().enumerate() {
        assignments.push(format!("{} = {}", column, engine.placeholder(i + 1)));
        params.push(Value::from(value.clone()));
    }
    let predicate = where_clause(engine, where_map, values.len() + 1, &mut params);

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments.join(", "),
        predicate
    );
    Ok(Statement::new(sql, params))
}

/// `DELETE FROM table WHERE ...`. An empty filter is rejected rather than
/// silently deleting every row.
pub fn delete(
    engine: EngineKind,
    table: &str,
    where_map: &JsonMap,
) -> Result<Statement, GatewayError> {
    require_non_empty(where_map, "delete filter")?;

    let mut params = Vec::with_capacity(where_map.len());
    let predicate = where_clause(engine, where_map, 1, &mut params);

    Ok(Statement::new(
        format!("DELETE FROM {table} WHERE {predicate}"),
        params,
    ))
}

/// `SELECT cols FROM table [WHERE ...]` with engine-appropriate pagination.
/// An empty column list projects `*`. The filter may be empty; limit and
/// offset bind as parameters (SQL Server gets the OFFSET/FETCH form since
/// it has no LIMIT). An offset without a limit is rejected because SQLite
/// and MySQL cannot express it.
pub fn select(
    engine: EngineKind,
    table: &str,
    columns: &[String],
    where_map: &JsonMap,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Statement, GatewayError> {
    for n in [limit, offset].into_iter().flatten() {
        if n < 0 {
            return Err(GatewayError::Validation(
                "limit and offset must be non-negative".to_string(),
            ));
        }
    }
    if offset.is_some() && limit.is_none() && engine != EngineKind::Mssql {
        return Err(GatewayError::Validation(
            "offset requires a limit".to_string(),
        ));
    }

    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };

    let mut params = Vec::with_capacity(where_map.len() + 2);
    let mut sql = format!("SELECT {projection} FROM {table}");
    if !where_map.is_empty() {
        let predicate = where_clause(engine, where_map, 1, &mut params);
        sql.push_str(&format!(" WHERE {predicate}"));
    }

    match engine {
        EngineKind::Mssql => {
            if limit.is_some() || offset.is_some() {
                let n = params.len() + 1;
                sql.push_str(&format!(
                    " ORDER BY (SELECT NULL) OFFSET {} ROWS",
                    engine.placeholder(n)
                ));
                params.push(Value::Int64(offset.unwrap_or(0)));
                if let Some(limit) = limit {
                    sql.push_str(&format!(
                        " FETCH NEXT {} ROWS ONLY",
                        engine.placeholder(n + 1)
                    ));
                    params.push(Value::Int64(limit));
                }
            }
        }
        _ => {
            if let Some(limit) = limit {
                sql.push_str(&format!(" LIMIT {}", engine.placeholder(params.len() + 1)));
                params.push(Value::Int64(limit));
                if let Some(offset) = offset {
                    sql.push_str(&format!(
                        " OFFSET {}",
                        engine.placeholder(params.len() + 1)
                    ));
                    params.push(Value::Int64(offset));
                }
            }
        }
    }
    Ok(Statement::new(sql, params))
}

/// One page of a table. SQL Server has no LIMIT/OFFSET and needs an ORDER
/// BY before its OFFSET clause, so it binds (offset, limit); the others
/// bind (limit, offset).
pub fn table_page(
    engine: EngineKind,
    table: &str,
    limit: i64,
    offset: i64,
) -> Result<Statement, GatewayError> {
    if limit < 0 || offset < 0 {
        return Err(GatewayError::Validation(
            "limit and offset must be non-negative".to_string(),
        ));
    }

    let statement = match engine {
        EngineKind::Mssql => Statement::new(
            format!(
                "SELECT * FROM {} ORDER BY (SELECT NULL) OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                table,
                engine.placeholder(1),
                engine.placeholder(2)
            ),
            vec![Value::Int64(offset), Value::Int64(limit)],
        ),
        _ => Statement::new(
            format!(
                "SELECT * FROM {} LIMIT {} OFFSET {}",
                table,
                engine.placeholder(1),
                engine.placeholder(2)
            ),
            vec![Value::Int64(limit), Value::Int64(offset)],
        ),
    };
    Ok(statement)
}

/// Unpaged row total for a table.
pub fn count_all(table: &str) -> Statement {
    Statement::new(format!("SELECT COUNT(*) FROM {table}"), Vec::new())
}

/// The small row sample attached to a table's schema.
pub fn sample(engine: EngineKind, table: &str) -> Statement {
    let sql = match engine {
        EngineKind::Mssql => format!("SELECT TOP {SAMPLE_ROWS} * FROM {table}"),
        _ => format!("SELECT * FROM {table} LIMIT {SAMPLE_ROWS}"),
    };
    Statement::new(sql, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, serde_json::Value)]) -> JsonMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_preserves_column_order() {
        let values = map(&[
            ("name", serde_json::json!("ada")),
            ("age", serde_json::json!(36)),
        ]);
        let stmt = insert(EngineKind::Sqlite, "users", &values).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO users (name, age) VALUES (?, ?)");
        assert_eq!(
            stmt.params,
            vec![Value::Text("ada".to_string()), Value::Int64(36)]
        );
    }

    #[test]
    fn test_insert_numbers_postgres_placeholders() {
        let values = map(&[
            ("a", serde_json::json!(1)),
            ("b", serde_json::json!(2)),
            ("c", serde_json::json!(3)),
        ]);
        let stmt = insert(EngineKind::Postgres, "t", &values).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t (a, b, c) VALUES ($1, $2, $3)");
    }

    #[test]
    fn test_insert_rejects_empty_values() {
        let err = insert(EngineKind::Sqlite, "t", &JsonMap::new()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_update_numbers_set_then_where() {
        let values = map(&[("name", serde_json::json!("b"))]);
        let filter = map(&[("id", serde_json::json!(7))]);
        let stmt = update(EngineKind::Postgres, "users", &values, &filter).unwrap();
        assert_eq!(stmt.sql, "UPDATE users SET name = $1 WHERE id = $2");
        assert_eq!(
            stmt.params,
            vec![Value::Text("b".to_string()), Value::Int64(7)]
        );
    }

    #[test]
    fn test_update_rejects_empty_filter() {
        let values = map(&[("name", serde_json::json!("b"))]);
        let err = update(EngineKind::Sqlite, "t", &values, &JsonMap::new()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_delete_joins_filter_with_and() {
        let filter = map(&[
            ("a", serde_json::json!(1)),
            ("b", serde_json::json!("x")),
        ]);
        let stmt = delete(EngineKind::Mssql, "t", &filter).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM t WHERE a = @P1 AND b = @P2");
    }

    #[test]
    fn test_delete_rejects_empty_filter() {
        assert!(delete(EngineKind::Sqlite, "t", &JsonMap::new()).is_err());
    }

    #[test]
    fn test_select_with_filter_and_limit() {
        let filter = map(&[("active", serde_json::json!(true))]);
        let stmt = select(EngineKind::Mysql, "users", &[], &filter, Some(10), None).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM users WHERE active = ? LIMIT ?");
        assert_eq!(
            stmt.params,
            vec![Value::Bool(true), Value::Int64(10)]
        );

        let stmt = select(EngineKind::Mssql, "users", &[], &filter, Some(10), None).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM users WHERE active = @P1 \
             ORDER BY (SELECT NULL) OFFSET @P2 ROWS FETCH NEXT @P3 ROWS ONLY"
        );
        assert_eq!(
            stmt.params,
            vec![Value::Bool(true), Value::Int64(0), Value::Int64(10)]
        );
    }

    #[test]
    fn test_select_projects_columns() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let stmt = select(
            EngineKind::Postgres,
            "users",
            &columns,
            &JsonMap::new(),
            Some(5),
            Some(10),
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT id, name FROM users LIMIT $1 OFFSET $2");
        assert_eq!(stmt.params, vec![Value::Int64(5), Value::Int64(10)]);
    }

    #[test]
    fn test_select_without_filter() {
        let stmt = select(EngineKind::Sqlite, "users", &[], &JsonMap::new(), None, None).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM users");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_offset_needs_limit() {
        let err = select(
            EngineKind::Sqlite,
            "users",
            &[],
            &JsonMap::new(),
            None,
            Some(3),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_table_page_param_order() {
        let stmt = table_page(EngineKind::Sqlite, "t", 100, 40).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t LIMIT ? OFFSET ?");
        assert_eq!(stmt.params, vec![Value::Int64(100), Value::Int64(40)]);

        let stmt = table_page(EngineKind::Mssql, "t", 100, 40).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM t ORDER BY (SELECT NULL) OFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY"
        );
        assert_eq!(stmt.params, vec![Value::Int64(40), Value::Int64(100)]);
    }

    #[test]
    fn test_table_page_rejects_negative() {
        assert!(table_page(EngineKind::Sqlite, "t", -1, 0).is_err());
        assert!(table_page(EngineKind::Sqlite, "t", 10, -1).is_err());
    }

    #[test]
    fn test_sample_per_engine() {
        assert_eq!(
            sample(EngineKind::Postgres, "t").sql,
            "SELECT * FROM t LIMIT 5"
        );
        assert_eq!(sample(EngineKind::Mssql, "t").sql, "SELECT TOP 5 * FROM t");
    }
}
