//! SQLite adapter over a single SQLx connection.
//!
//! SQLite is file-based and dynamically typed: cells are decoded by the
//! column's declared type affinity, falling back through the common
//! storage classes when the declaration is absent or unusual.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, SqliteConnection, TypeInfo, ValueRef};

use super::{EngineHandle, connect_err, exec_err};
use crate::error::GatewayError;
use crate::profile::ConnectionProfile;
use crate::query::{ColumnDescriptor, RowSet, WriteOutcome};
use crate::value::Value;

pub(super) async fn connect(
    profile: &ConnectionProfile,
) -> Result<(Box<dyn EngineHandle>, String), GatewayError> {
    let path = profile.sqlite_path().ok_or_else(|| {
        GatewayError::Validation("SQLite database file path is required".to_string())
    })?;

    // Refuse to create new files; connecting only opens databases that
    // already exist on disk.
    if !path.exists() {
        return Err(GatewayError::NotFound(format!(
            "Database file not found: {}",
            path.display()
        )));
    }

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(false)
        .foreign_keys(true);

    let mut conn = options.connect().await.map_err(connect_err)?;

    let version: String = sqlx::query_scalar("SELECT sqlite_version()")
        .fetch_one(&mut conn)
        .await
        .map_err(connect_err)?;

    let database = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok((Box::new(SqliteHandle { conn, database }), version))
}

struct SqliteHandle {
    conn: SqliteConnection,
    database: String,
}

impl SqliteHandle {
    fn bind_all<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        params: &'q [Value],
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        let mut query = query;
        for param in params {
            query = match param {
                Value::Null => query.bind(Option::<String>::None),
                Value::Bool(v) => query.bind(*v),
                Value::Int16(v) => query.bind(*v as i64),
                Value::Int32(v) => query.bind(*v as i64),
                Value::Int64(v) => query.bind(*v),
                Value::Float32(v) => query.bind(*v as f64),
                Value::Float64(v) => query.bind(*v),
                Value::Text(s) => query.bind(s.as_str()),
                Value::Bytes(b) => query.bind(b.as_slice()),
                Value::Date(d) => query.bind(*d),
                Value::Time(t) => query.bind(*t),
                Value::DateTime(dt) => query.bind(*dt),
                Value::DateTimeTz(dt) => query.bind(*dt),
                // SQLite has no native decimal, uuid, or json storage
                // classes; they travel as text.
                Value::Decimal(d) => query.bind(d.to_string()),
                Value::Uuid(u) => query.bind(u.to_string()),
                Value::Json(j) => query.bind(j.to_string()),
                Value::Other { display, .. } => query.bind(display.clone()),
            };
        }
        query
    }
}

#[async_trait]
impl EngineHandle for SqliteHandle {
    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, GatewayError> {
        let rows = Self::bind_all(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(exec_err)?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            // Empty results carry no row metadata; the prepared statement
            // still knows its column names.
            None => self
                .conn
                .describe(sql)
                .await
                .map_err(exec_err)?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };
        let rows = rows.iter().map(convert_row).collect();
        Ok(RowSet { columns, rows })
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<WriteOutcome, GatewayError> {
        let result = Self::bind_all(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await
            .map_err(exec_err)?;

        Ok(WriteOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, GatewayError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(exec_err)?;
        Ok(names)
    }

    async fn database_name(&mut self) -> Result<String, GatewayError> {
        Ok(self.database.clone())
    }

    async fn describe_columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, GatewayError> {
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&mut self.conn)
            .await
            .map_err(exec_err)?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let notnull: i64 = row.try_get("notnull").map_err(exec_err)?;
            let pk: i64 = row.try_get("pk").map_err(exec_err)?;
            columns.push(ColumnDescriptor {
                name: row.try_get("name").map_err(exec_err)?,
                data_type: row.try_get("type").map_err(exec_err)?,
                nullable: notnull == 0,
                default: row.try_get("dflt_value").map_err(exec_err)?,
                primary_key: pk > 0,
            });
        }
        Ok(columns)
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        self.conn.close().await.map_err(exec_err)
    }
}

fn convert_row(row: &SqliteRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| extract_value(row, idx, col.type_info().name()))
        .collect()
}

/// Decode one cell by declared type affinity. NULL wins regardless of the
/// declaration; unknown declarations fall back through the storage classes.
fn extract_value(row: &SqliteRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        _ => {}
    }

    match type_name.to_uppercase().as_str() {
        "INTEGER" | "INT" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" | "INT2" | "INT8" => {
            row.try_get::<i64, _>(index)
                .map(Value::Int64)
                .unwrap_or(Value::Null)
        }
        "BOOLEAN" | "BOOL" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .or_else(|_| row.try_get::<i64, _>(index).map(|v| Value::Bool(v != 0)))
            .unwrap_or(Value::Null),
        "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" => row
            .try_get::<f64, _>(index)
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        "TEXT" | "VARCHAR" | "NVARCHAR" | "NCHAR" | "CHAR" | "CHARACTER" | "CLOB" => row
            .try_get::<String, _>(index)
            .map(Value::Text)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "DATE" => decode_date(row, index),
        "DATETIME" | "TIMESTAMP" => decode_datetime(row, index),
        "NUMERIC" | "DECIMAL" => decode_numeric(row, index),
        _ => decode_unknown(row, index, type_name),
    }
}

fn decode_date(row: &SqliteRow, index: usize) -> Value {
    if let Ok(s) = row.try_get::<String, _>(index) {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            return Value::Date(date);
        }
        return Value::Text(s);
    }
    Value::Null
}

fn decode_datetime(row: &SqliteRow, index: usize) -> Value {
    if let Ok(s) = row.try_get::<String, _>(index) {
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&s, format) {
                return Value::DateTime(dt);
            }
        }
        return Value::Text(s);
    }
    // Unix timestamp storage
    if let Ok(secs) = row.try_get::<i64, _>(index) {
        if let Some(dt) = chrono::DateTime::from_timestamp(secs, 0) {
            return Value::DateTimeTz(dt);
        }
    }
    Value::Null
}

fn decode_numeric(row: &SqliteRow, index: usize) -> Value {
    if let Ok(s) = row.try_get::<String, _>(index) {
        if let Ok(decimal) = s.parse::<rust_decimal::Decimal>() {
            return Value::Decimal(decimal);
        }
        return Value::Text(s);
    }
    if let Ok(f) = row.try_get::<f64, _>(index) {
        return Value::Float64(f);
    }
    if let Ok(i) = row.try_get::<i64, _>(index) {
        return Value::Int64(i);
    }
    Value::Null
}

fn decode_unknown(row: &SqliteRow, index: usize, type_name: &str) -> Value {
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Int64(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Value::Float64(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::Text(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Value::Bytes(v);
    }
    Value::Other {
        type_name: type_name.to_string(),
        display: "<unknown>".to_string(),
    }
}
