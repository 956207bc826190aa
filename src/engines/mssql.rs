//! Microsoft SQL Server adapter over a tiberius client.
//!
//! Tiberius speaks TDS over a tokio `TcpStream` bridged through the
//! futures-io compat layer. Cells are decoded by the wire column type;
//! parameters bind via `@Pn` markers.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{AuthMethod, Client, ColumnType, Config, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{EngineHandle, connect_err, exec_err};
use crate::error::GatewayError;
use crate::profile::ConnectionProfile;
use crate::query::{ColumnDescriptor, RowSet, WriteOutcome};
use crate::value::Value;

type MssqlClient = Client<Compat<TcpStream>>;

pub(super) async fn connect(
    profile: &ConnectionProfile,
) -> Result<(Box<dyn EngineHandle>, String), GatewayError> {
    let mut config = Config::new();
    if let Some(host) = &profile.host {
        config.host(host);
    }
    if let Some(port) = profile.resolved_port() {
        config.port(port);
    }
    if let (Some(username), Some(password)) = (&profile.username, &profile.password) {
        config.authentication(AuthMethod::sql_server(username, password));
    }
    if let Some(database) = &profile.database {
        config.database(database);
    }
    config.trust_cert();

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(connect_err)?;
    tcp.set_nodelay(true).map_err(connect_err)?;

    let mut client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(connect_err)?;

    let version = probe_version(&mut client).await?;
    Ok((Box::new(MssqlHandle { client }), version))
}

async fn probe_version(client: &mut MssqlClient) -> Result<String, GatewayError> {
    let stream = client
        .simple_query("SELECT @@VERSION")
        .await
        .map_err(connect_err)?;
    let rows = stream.into_first_result().await.map_err(connect_err)?;
    let full = rows
        .first()
        .and_then(|row| row.get::<&str, _>(0))
        .unwrap_or("unknown");
    // @@VERSION is a multi-line banner; the first line carries the product
    // name and build number.
    Ok(full.lines().next().unwrap_or(full).trim().to_string())
}

struct MssqlHandle {
    client: MssqlClient,
}

impl MssqlHandle {
    fn build_query<'a>(sql: &str, params: &'a [Value]) -> Query<'a> {
        let mut query = Query::new(sql.to_string());
        for param in params {
            match param {
                Value::Null => query.bind(Option::<String>::None),
                Value::Bool(v) => query.bind(*v),
                Value::Int16(v) => query.bind(*v),
                Value::Int32(v) => query.bind(*v),
                Value::Int64(v) => query.bind(*v),
                Value::Float32(v) => query.bind(*v),
                Value::Float64(v) => query.bind(*v),
                Value::Text(s) => query.bind(s.as_str()),
                Value::Bytes(b) => query.bind(b.clone()),
                Value::Date(d) => query.bind(*d),
                Value::Time(t) => query.bind(*t),
                Value::DateTime(dt) => query.bind(*dt),
                Value::DateTimeTz(dt) => query.bind(*dt),
                // Bound as text; the server converts on comparison.
                Value::Decimal(d) => query.bind(d.to_string()),
                Value::Uuid(u) => query.bind(u.to_string()),
                Value::Json(j) => query.bind(j.to_string()),
                Value::Other { display, .. } => query.bind(display.clone()),
            }
        }
        query
    }

    async fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, GatewayError> {
        let query = Self::build_query(sql, params);
        let stream = query.query(&mut self.client).await.map_err(exec_err)?;
        stream.into_first_result().await.map_err(exec_err)
    }
}

#[async_trait]
impl EngineHandle for MssqlHandle {
    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, GatewayError> {
        let query = Self::build_query(sql, params);
        let mut stream = query.query(&mut self.client).await.map_err(exec_err)?;

        // The stream reports column metadata before any row arrives, so
        // empty results still carry their column names.
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(exec_err)?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = stream.into_first_result().await.map_err(exec_err)?;
        let rows = rows.iter().map(convert_row).collect();
        Ok(RowSet { columns, rows })
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<WriteOutcome, GatewayError> {
        let query = Self::build_query(sql, params);
        let result = query.execute(&mut self.client).await.map_err(exec_err)?;

        // TDS does not report generated keys on the execute path.
        Ok(WriteOutcome {
            rows_affected: result.total(),
            last_insert_id: None,
        })
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, GatewayError> {
        let rows = self
            .fetch_rows(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect())
    }

    async fn database_name(&mut self) -> Result<String, GatewayError> {
        let rows = self.fetch_rows("SELECT DB_NAME()", &[]).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get::<&str, _>(0))
            .unwrap_or("unknown")
            .to_string())
    }

    async fn describe_columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, GatewayError> {
        let rows = self
            .fetch_rows(
                "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, c.COLUMN_DEFAULT, \
                        CASE WHEN k.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS is_pk \
                 FROM INFORMATION_SCHEMA.COLUMNS c \
                 LEFT JOIN ( \
                     SELECT kcu.COLUMN_NAME \
                     FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                     JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
                       ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
                     WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND kcu.TABLE_NAME = @P1 \
                 ) k ON c.COLUMN_NAME = k.COLUMN_NAME \
                 WHERE c.TABLE_NAME = @P1 \
                 ORDER BY c.ORDINAL_POSITION",
                &[Value::Text(table.to_string())],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row.get::<&str, _>(0).unwrap_or("").to_string(),
                data_type: row.get::<&str, _>(1).unwrap_or("").to_string(),
                nullable: row.get::<&str, _>(2) == Some("YES"),
                default: row.get::<&str, _>(3).map(str::to_string),
                primary_key: row.get::<i32, _>(4) == Some(1),
            })
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<(), GatewayError> {
        self.client.close().await.map_err(exec_err)
    }
}

fn convert_row(row: &Row) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| {
            let col_type = row
                .columns()
                .get(idx)
                .map(|c| c.column_type())
                .unwrap_or(ColumnType::Null);
            extract_value(row, idx, col_type)
        })
        .collect()
}

fn extract_value(row: &Row, idx: usize, col_type: ColumnType) -> Value {
    match col_type {
        ColumnType::Null => Value::Null,

        ColumnType::Int1 => row
            .try_get::<u8, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int16(v as i16))
            .unwrap_or(Value::Null),
        ColumnType::Int2 => row
            .try_get::<i16, _>(idx)
            .ok()
            .flatten()
            .map(Value::Int16)
            .unwrap_or(Value::Null),
        ColumnType::Int4 => row
            .try_get::<i32, _>(idx)
            .ok()
            .flatten()
            .map(Value::Int32)
            .unwrap_or(Value::Null),
        ColumnType::Int8 => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map(Value::Int64)
            .unwrap_or(Value::Null),
        // Nullable integer columns arrive as Intn regardless of width.
        ColumnType::Intn => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map(Value::Int64)
            .or_else(|| {
                row.try_get::<i32, _>(idx)
                    .ok()
                    .flatten()
                    .map(Value::Int32)
            })
            .unwrap_or(Value::Null),

        ColumnType::Float4 => row
            .try_get::<f32, _>(idx)
            .ok()
            .flatten()
            .map(Value::Float32)
            .unwrap_or(Value::Null),
        ColumnType::Float8 => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        ColumnType::Floatn => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(Value::Float64)
            .or_else(|| {
                row.try_get::<f32, _>(idx)
                    .ok()
                    .flatten()
                    .map(Value::Float32)
            })
            .unwrap_or(Value::Null),

        ColumnType::Decimaln | ColumnType::Numericn => row
            .try_get::<tiberius::numeric::Numeric, _>(idx)
            .ok()
            .flatten()
            .and_then(|n| n.to_string().parse::<rust_decimal::Decimal>().ok().map(Value::Decimal))
            .unwrap_or(Value::Null),

        ColumnType::Money | ColumnType::Money4 => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(Value::Float64)
            .unwrap_or(Value::Null),

        ColumnType::Bit | ColumnType::Bitn => row
            .try_get::<bool, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|s| Value::Text(s.to_string()))
            .unwrap_or(Value::Null),

        ColumnType::Datetime | ColumnType::Datetime2 | ColumnType::Datetimen
        | ColumnType::Datetime4 => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        ColumnType::DatetimeOffsetn => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .flatten()
            .map(Value::DateTimeTz)
            .unwrap_or(Value::Null),
        ColumnType::Daten => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),
        ColumnType::Timen => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .flatten()
            .map(Value::Time)
            .unwrap_or(Value::Null),

        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => row
            .try_get::<&[u8], _>(idx)
            .ok()
            .flatten()
            .map(|b| Value::Bytes(b.to_vec()))
            .unwrap_or(Value::Null),

        ColumnType::Guid => row
            .try_get::<tiberius::Uuid, _>(idx)
            .ok()
            .flatten()
            .map(|u| Value::Text(u.to_string()))
            .unwrap_or(Value::Null),

        ColumnType::Xml => row
            .try_get::<&tiberius::xml::XmlData, _>(idx)
            .ok()
            .flatten()
            .map(|xml| Value::Text(xml.to_owned().into_string()))
            .unwrap_or(Value::Null),

        other => Value::Other {
            type_name: format!("{other:?}").to_lowercase(),
            display: "<unsupported>".to_string(),
        },
    }
}
