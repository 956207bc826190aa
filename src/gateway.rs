//! The gateway facade: every operation a transport exposes, normalized
//! across engines and addressed by connection id.

use std::time::Instant;

use serde_json::Map;
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::profile::{ConnectionInfo, ConnectionProfile};
use crate::query::{DatabaseInfo, Health, QueryKind, QueryResult, RowSet, TablePage, TableSchema};
use crate::registry::{ConnectionRegistry, RegisteredConnection};
use crate::sql::{self, Statement};
use crate::value::Value;

type JsonMap = Map<String, serde_json::Value>;

/// Multi-engine SQL gateway. One instance owns one connection registry;
/// it is `Send + Sync` and meant to be shared behind an `Arc` by whatever
/// transport sits in front of it.
pub struct Gateway {
    registry: ConnectionRegistry,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
        }
    }

    /// Probe a profile without registering anything: connect, read the
    /// server version, close.
    pub async fn test_connection(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<ConnectionInfo, GatewayError> {
        let (handle, info) = crate::engines::connect(profile).await?;
        handle.close().await?;
        debug!(engine = %profile.engine, "connection test succeeded");
        Ok(info)
    }

    /// Open a connection and register it. Returns the opaque id callers
    /// use for every subsequent operation, plus display metadata.
    pub async fn create_connection(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<(String, ConnectionInfo), GatewayError> {
        self.registry.register(profile).await
    }

    /// Display metadata for every live connection.
    pub async fn list_connections(&self) -> Vec<(String, ConnectionInfo)> {
        self.registry.list().await
    }

    /// Close a connection and forget its id.
    pub async fn close_connection(&self, id: &str) -> Result<(), GatewayError> {
        self.registry.close(id).await
    }

    /// Close every live connection.
    pub async fn close_all(&self) {
        self.registry.close_all().await
    }

    /// Run raw SQL on a connection. The statement is classified by its
    /// leading keyword unless the caller supplies a kind; reads return
    /// rows, everything else returns an affected count.
    pub async fn execute_query(
        &self,
        id: &str,
        sql: &str,
        kind: Option<QueryKind>,
    ) -> Result<QueryResult, GatewayError> {
        let kind = kind.unwrap_or_else(|| QueryKind::classify(sql));
        let entry = self.registry.entry(id).await?;
        let result = run_statement(
            &entry,
            Statement {
                sql: sql.to_string(),
                params: Vec::new(),
            },
            kind,
        )
        .await?;
        debug!(connection_id = %id, query_type = %kind, "query executed");
        Ok(result)
    }

    /// Connection metadata plus the database's table list.
    pub async fn database_info(&self, id: &str) -> Result<DatabaseInfo, GatewayError> {
        let entry = self.registry.entry(id).await?;
        entry.touch();
        let (database, tables) = {
            let mut guard = entry.handle.lock().await;
            let handle = guard
                .as_mut()
                .ok_or_else(|| GatewayError::connection_not_found(id))?;
            let database = handle.database_name().await?;
            let tables = handle.list_tables().await?;
            (database, tables)
        };

        let mut connection = entry.info.clone();
        connection.database = database;
        Ok(DatabaseInfo { connection, tables })
    }

    /// Column catalog for one table plus a small sample of its rows.
    ///
    /// The table name is interpolated into catalog and sample statements
    /// as received; callers own identifier hygiene.
    pub async fn table_schema(&self, id: &str, table: &str) -> Result<TableSchema, GatewayError> {
        let entry = self.registry.entry(id).await?;
        entry.touch();
        let (columns, sample) = {
            let mut guard = entry.handle.lock().await;
            let handle = guard
                .as_mut()
                .ok_or_else(|| GatewayError::connection_not_found(id))?;
            let columns = handle.describe_columns(table).await?;
            let stmt = sql::sample(entry.engine, table);
            let sample = handle.fetch(&stmt.sql, &stmt.params).await?;
            (columns, sample)
        };

        Ok(TableSchema {
            table: table.to_string(),
            columns,
            sample_row_count: sample.row_count(),
            sample,
        })
    }

    /// One page of a table plus its unpaged row total.
    pub async fn table_data(
        &self,
        id: &str,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<TablePage, GatewayError> {
        let entry = self.registry.entry(id).await?;
        entry.touch();
        let page_stmt = sql::table_page(entry.engine, table, limit, offset)?;
        let count_stmt = sql::count_all(table);

        let (page, total) = {
            let mut guard = entry.handle.lock().await;
            let handle = guard
                .as_mut()
                .ok_or_else(|| GatewayError::connection_not_found(id))?;
            let page = handle.fetch(&page_stmt.sql, &page_stmt.params).await?;
            let count = handle.fetch(&count_stmt.sql, &count_stmt.params).await?;
            (page, count_total(&count)?)
        };

        Ok(TablePage {
            row_count: page.rows.len(),
            columns: page.columns,
            rows: page.rows,
            total_count: total,
            limit,
            offset,
        })
    }

    /// Insert one row built from a column-to-value map.
    pub async fn insert_row(
        &self,
        id: &str,
        table: &str,
        values: &JsonMap,
    ) -> Result<QueryResult, GatewayError> {
        let entry = self.registry.entry(id).await?;
        let stmt = sql::insert(entry.engine, table, values)?;
        let result = run_statement(&entry, stmt, QueryKind::Insert).await?;
        info!(connection_id = %id, table, "row inserted");
        Ok(result)
    }

    /// Update rows matching an AND-joined equality filter.
    pub async fn update_rows(
        &self,
        id: &str,
        table: &str,
        values: &JsonMap,
        filter: &JsonMap,
    ) -> Result<QueryResult, GatewayError> {
        let entry = self.registry.entry(id).await?;
        let stmt = sql::update(entry.engine, table, values, filter)?;
        let result = run_statement(&entry, stmt, QueryKind::Update).await?;
        info!(connection_id = %id, table, rows = ?result.rows_affected(), "rows updated");
        Ok(result)
    }

    /// Delete rows matching an AND-joined equality filter. An empty
    /// filter is rejected.
    pub async fn delete_rows(
        &self,
        id: &str,
        table: &str,
        filter: &JsonMap,
    ) -> Result<QueryResult, GatewayError> {
        let entry = self.registry.entry(id).await?;
        let stmt = sql::delete(entry.engine, table, filter)?;
        let result = run_statement(&entry, stmt, QueryKind::Delete).await?;
        info!(connection_id = %id, table, rows = ?result.rows_affected(), "rows deleted");
        Ok(result)
    }

    /// Select rows matching an optional equality filter, projecting the
    /// given columns (all when empty), with optional bound limit/offset.
    pub async fn select_rows(
        &self,
        id: &str,
        table: &str,
        columns: &[String],
        filter: &JsonMap,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<QueryResult, GatewayError> {
        let entry = self.registry.entry(id).await?;
        let stmt = sql::select(entry.engine, table, columns, filter, limit, offset)?;
        run_statement(&entry, stmt, QueryKind::Select).await
    }

    /// Liveness report: always healthy when reachable, with the live
    /// connection count.
    pub async fn health(&self) -> Health {
        Health {
            status: "healthy",
            active_connections: self.registry.count().await,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one statement against an entry's handle, stamping last-use at
/// dispatch and timing the execution. Generated keys are surfaced for
/// inserts only.
async fn run_statement(
    entry: &RegisteredConnection,
    stmt: Statement,
    kind: QueryKind,
) -> Result<QueryResult, GatewayError> {
    entry.touch();
    let start = Instant::now();
    let result = {
        let mut guard = entry.handle.lock().await;
        let handle = guard
            .as_mut()
            .ok_or_else(|| GatewayError::connection_not_found(&entry.id))?;

        if kind.returns_rows() {
            let rows = handle.fetch(&stmt.sql, &stmt.params).await?;
            let execution_time_ms = start.elapsed().as_millis() as u64;
            QueryResult::Read {
                row_count: rows.rows.len(),
                columns: rows.columns,
                rows: rows.rows,
                execution_time_ms,
                query_type: kind,
            }
        } else {
            let outcome = handle.execute(&stmt.sql, &stmt.params).await?;
            let execution_time_ms = start.elapsed().as_millis() as u64;
            QueryResult::Write {
                rows_affected: outcome.rows_affected,
                last_insert_id: if kind == QueryKind::Insert {
                    outcome.last_insert_id
                } else {
                    None
                },
                execution_time_ms,
                query_type: kind,
            }
        }
    };
    Ok(result)
}

fn count_total(rows: &RowSet) -> Result<i64, GatewayError> {
    rows.rows
        .first()
        .and_then(|row| row.first())
        .and_then(Value::as_i64)
        .ok_or_else(|| GatewayError::Internal("count query returned no total".to_string()))
}
