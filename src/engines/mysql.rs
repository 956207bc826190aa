//! MySQL adapter over a single SQLx connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, MySqlConnection, Row, TypeInfo, ValueRef};

use super::{EngineHandle, connect_err, exec_err};
use crate::error::GatewayError;
use crate::profile::ConnectionProfile;
use crate::query::{ColumnDescriptor, RowSet, WriteOutcome};
use crate::value::Value;

pub(super) async fn connect(
    profile: &ConnectionProfile,
) -> Result<(Box<dyn EngineHandle>, String), GatewayError> {
    let mut options = MySqlConnectOptions::new();
    if let Some(host) = &profile.host {
        options = options.host(host);
    }
    if let Some(port) = profile.resolved_port() {
        options = options.port(port);
    }
    if let Some(username) = &profile.username {
        options = options.username(username);
    }
    if let Some(password) = &profile.password {
        options = options.password(password);
    }
    if let Some(database) = &profile.database {
        options = options.database(database);
    }

    let mut conn = options.connect().await.map_err(connect_err)?;

    let version: String = sqlx::query_scalar("SELECT VERSION()")
        .fetch_one(&mut conn)
        .await
        .map_err(connect_err)?;

    Ok((Box::new(MysqlHandle { conn }), version))
}

struct MysqlHandle {
    conn: MySqlConnection,
}

impl MysqlHandle {
    fn bind_all<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
        params: &'q [Value],
    ) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
        let mut query = query;
        for param in params {
            query = match param {
                Value::Null => query.bind(Option::<String>::None),
                Value::Bool(v) => query.bind(*v),
                Value::Int16(v) => query.bind(*v),
                Value::Int32(v) => query.bind(*v),
                Value::Int64(v) => query.bind(*v),
                Value::Float32(v) => query.bind(*v),
                Value::Float64(v) => query.bind(*v),
                Value::Text(s) => query.bind(s.as_str()),
                Value::Bytes(b) => query.bind(b.as_slice()),
                Value::Date(d) => query.bind(*d),
                Value::Time(t) => query.bind(*t),
                Value::DateTime(dt) => query.bind(*dt),
                Value::DateTimeTz(dt) => query.bind(*dt),
                Value::Decimal(d) => query.bind(*d),
                // MySQL has no uuid type; conventionally stored as text.
                Value::Uuid(u) => query.bind(u.to_string()),
                Value::Json(j) => query.bind(j.clone()),
                Value::Other { display, .. } => query.bind(display.clone()),
            };
        }
        query
    }
}

#[async_trait]
impl EngineHandle for MysqlHandle {
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

        // last_insert_id() reports 0 when the statement generated no key.
        let last_insert_id = match result.last_insert_id() {
            0 => None,
            id => Some(id as i64),
        };
        Ok(WriteOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id,
        })
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, GatewayError> {
        let rows = sqlx::query("SHOW TABLES")
            .fetch_all(&mut self.conn)
            .await
            .map_err(exec_err)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(exec_err))
            .collect()
    }

    async fn database_name(&mut self) -> Result<String, GatewayError> {
        let name: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&mut self.conn)
            .await
            .map_err(exec_err)?;
        Ok(name.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn describe_columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, GatewayError> {
        let rows = sqlx::query(
            "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(exec_err)?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let nullable: String = row.try_get("IS_NULLABLE").map_err(exec_err)?;
            let key: String = row.try_get("COLUMN_KEY").map_err(exec_err)?;
            columns.push(ColumnDescriptor {
                name: row.try_get("COLUMN_NAME").map_err(exec_err)?,
                data_type: row.try_get("COLUMN_TYPE").map_err(exec_err)?,
                nullable: nullable == "YES",
                default: row.try_get("COLUMN_DEFAULT").map_err(exec_err)?,
                primary_key: key == "PRI",
            });
        }
        Ok(columns)
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        self.conn.close().await.map_err(exec_err)
    }
}

fn convert_row(row: &MySqlRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| extract_value(row, idx, col.type_info().name()))
        .collect()
}

fn extract_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        _ => {}
    }

    match type_name {
        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "TINYINT" => row
            .try_get::<i8, _>(index)
            .map(|v| Value::Int16(v as i16))
            .unwrap_or(Value::Null),
        "SMALLINT" => row
            .try_get::<i16, _>(index)
            .map(Value::Int16)
            .unwrap_or(Value::Null),
        "INT" | "MEDIUMINT" => row
            .try_get::<i32, _>(index)
            .map(Value::Int32)
            .unwrap_or(Value::Null),
        "BIGINT" => row
            .try_get::<i64, _>(index)
            .map(Value::Int64)
            .unwrap_or(Value::Null),
        // Unsigned widths up to 32 bits always fit in i64.
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => row
            .try_get::<u32, _>(index)
            .map(|v| Value::Int64(v as i64))
            .or_else(|_| row.try_get::<u16, _>(index).map(|v| Value::Int64(v as i64)))
            .or_else(|_| row.try_get::<u8, _>(index).map(|v| Value::Int64(v as i64)))
            .unwrap_or(Value::Null),
        "BIGINT UNSIGNED" => row
            .try_get::<u64, _>(index)
            .map(|v| unsigned_to_value(type_name, v))
            .unwrap_or(Value::Null),
        "FLOAT" => row
            .try_get::<f32, _>(index)
            .map(Value::Float32)
            .unwrap_or(Value::Null),
        "DOUBLE" => row
            .try_get::<f64, _>(index)
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        "DECIMAL" => row
            .try_get::<rust_decimal::Decimal, _>(index)
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get::<String, _>(index)
                .map(Value::Text)
                .unwrap_or(Value::Null)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(Value::Date)
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .map(Value::Time)
            .unwrap_or(Value::Null),
        "DATETIME" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(Value::DateTimeTz)
            .unwrap_or(Value::Null),
        "JSON" => row
            .try_get::<serde_json::Value, _>(index)
            .map(Value::Json)
            .unwrap_or(Value::Null),
        _ => decode_unknown(row, index, type_name),
    }
}

/// A u64 above `i64::MAX` has no lossless signed representation; keep the
/// textual form instead of wrapping negative.
fn unsigned_to_value(type_name: &str, v: u64) -> Value {
    match i64::try_from(v) {
        Ok(v) => Value::Int64(v),
        Err(_) => Value::Other {
            type_name: type_name.to_string(),
            display: v.to_string(),
        },
    }
}

fn decode_unknown(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::Text(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Int64(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Value::Float64(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Value::Bytes(v);
    }
    Value::Other {
        type_name: type_name.to_string(),
        display: "<unknown>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_bigint_within_i64_stays_numeric() {
        assert_eq!(unsigned_to_value("BIGINT UNSIGNED", 0), Value::Int64(0));
        assert_eq!(
            unsigned_to_value("BIGINT UNSIGNED", i64::MAX as u64),
            Value::Int64(i64::MAX)
        );
    }

    #[test]
    fn test_unsigned_bigint_above_i64_keeps_digits() {
        // Values past i64::MAX must not wrap negative.
        let value = unsigned_to_value("BIGINT UNSIGNED", u64::MAX);
        assert_eq!(
            value,
            Value::Other {
                type_name: "BIGINT UNSIGNED".to_string(),
                display: u64::MAX.to_string(),
            }
        );
    }
}
