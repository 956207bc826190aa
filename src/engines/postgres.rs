//! PostgreSQL adapter over a single SQLx connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, PgConnection, Row, TypeInfo, ValueRef};

use super::{EngineHandle, connect_err, exec_err};
use crate::error::GatewayError;
use crate::profile::ConnectionProfile;
use crate::query::{ColumnDescriptor, RowSet, WriteOutcome};
use crate::value::Value;

pub(super) async fn connect(
    profile: &ConnectionProfile,
) -> Result<(Box<dyn EngineHandle>, String), GatewayError> {
    let mut options = PgConnectOptions::new();
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

    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(&mut conn)
        .await
        .map_err(connect_err)?;

    Ok((Box::new(PostgresHandle { conn }), version))
}

struct PostgresHandle {
    conn: PgConnection,
}

impl PostgresHandle {
    fn bind_all<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        params: &'q [Value],
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
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
                Value::Uuid(u) => query.bind(*u),
                Value::Json(j) => query.bind(j.clone()),
                Value::Other { display, .. } => query.bind(display.clone()),
            };
        }
        query
    }
}

#[async_trait]
impl EngineHandle for PostgresHandle {
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

        // Auto-generated keys are not reported over the wire; callers use
        // RETURNING when they need them.
        Ok(WriteOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, GatewayError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(exec_err)?;
        Ok(names)
    }

    async fn database_name(&mut self) -> Result<String, GatewayError> {
        sqlx::query_scalar("SELECT current_database()")
            .fetch_one(&mut self.conn)
            .await
            .map_err(exec_err)
    }

    async fn describe_columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, GatewayError> {
        let rows = sqlx::query(
            "SELECT c.column_name, c.data_type, c.is_nullable, c.column_default, \
                    EXISTS ( \
                        SELECT 1 FROM information_schema.table_constraints tc \
                        JOIN information_schema.key_column_usage kcu \
                          ON tc.constraint_name = kcu.constraint_name \
                         AND tc.table_schema = kcu.table_schema \
                        WHERE tc.constraint_type = 'PRIMARY KEY' \
                          AND tc.table_name = c.table_name \
                          AND kcu.column_name = c.column_name \
                    ) AS primary_key \
             FROM information_schema.columns c \
             WHERE c.table_schema = 'public' AND c.table_name = $1 \
             ORDER BY c.ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(exec_err)?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let nullable: String = row.try_get("is_nullable").map_err(exec_err)?;
            columns.push(ColumnDescriptor {
                name: row.try_get("column_name").map_err(exec_err)?,
                data_type: row.try_get("data_type").map_err(exec_err)?,
                nullable: nullable == "YES",
                default: row.try_get("column_default").map_err(exec_err)?,
                primary_key: row.try_get("primary_key").map_err(exec_err)?,
            });
        }
        Ok(columns)
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        self.conn.close().await.map_err(exec_err)
    }
}

fn convert_row(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| extract_value(row, idx, col.type_info().name()))
        .collect()
}

fn extract_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        _ => {}
    }

    match type_name {
        "BOOL" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<i16, _>(index)
            .map(Value::Int16)
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<i32, _>(index)
            .map(Value::Int32)
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<i64, _>(index)
            .map(Value::Int64)
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<f32, _>(index)
            .map(Value::Float32)
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<f64, _>(index)
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(index)
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row
            .try_get::<String, _>(index)
            .map(Value::Text)
            .unwrap_or(Value::Null),
        "BYTEA" => row
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
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(Value::DateTimeTz)
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(index)
            .map(Value::Uuid)
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<serde_json::Value, _>(index)
            .map(Value::Json)
            .unwrap_or(Value::Null),
        _ => decode_unknown(row, index, type_name),
    }
}

fn decode_unknown(row: &PgRow, index: usize, type_name: &str) -> Value {
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::Text(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Int64(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Value::Float64(v);
    }
    Value::Other {
        type_name: type_name.to_string(),
        display: "<unsupported>".to_string(),
    }
}
