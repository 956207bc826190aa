//! Query classification and the result shapes returned by the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::ConnectionInfo;
use crate::value::Value;

/// Coarse category of a SQL statement, decided by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}

impl QueryKind {
    /// Classify a statement by its first keyword, case-insensitively.
    /// `CREATE`, `ALTER`, `DROP` and `TRUNCATE` all count as DDL; anything
    /// unrecognized is `Other`. Classification never fails.
    pub fn classify(sql: &str) -> Self {
        let upper = sql.trim().to_uppercase();
        if upper.starts_with("SELECT") {
            Self::Select
        } else if upper.starts_with("INSERT") {
            Self::Insert
        } else if upper.starts_with("UPDATE") {
            Self::Update
        } else if upper.starts_with("DELETE") {
            Self::Delete
        } else if upper.starts_with("CREATE")
            || upper.starts_with("ALTER")
            || upper.starts_with("DROP")
            || upper.starts_with("TRUNCATE")
        {
            Self::Ddl
        } else {
            Self::Other
        }
    }

    /// Whether statements of this kind produce a row set rather than an
    /// affected-row count.
    pub fn returns_rows(&self) -> bool {
        matches!(self, Self::Select)
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Ddl => "ddl",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// Columns plus decoded rows, as fetched by an engine adapter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// What an engine adapter reports for a non-row-returning statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOutcome {
    pub rows_affected: u64,
    /// Auto-generated key from the last insert, where the engine exposes
    /// one over the wire (SQLite and MySQL do, PostgreSQL and MSSQL don't).
    pub last_insert_id: Option<i64>,
}

/// Outcome of `execute_query`, shaped by whether the statement read or
/// wrote. Serializes untagged so reads carry rows and writes carry counts.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Read {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        row_count: usize,
        execution_time_ms: u64,
        query_type: QueryKind,
    },
    Write {
        rows_affected: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_insert_id: Option<i64>,
        execution_time_ms: u64,
        query_type: QueryKind,
    },
}

impl QueryResult {
    pub fn query_type(&self) -> QueryKind {
        match self {
            Self::Read { query_type, .. } | Self::Write { query_type, .. } => *query_type,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Read { .. } => None,
            Self::Write { rows_affected, .. } => Some(*rows_affected),
        }
    }
}

/// One column of a table as reported by the engine catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub primary_key: bool,
}

/// Column catalog plus a small sample of live rows for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub sample: RowSet,
    pub sample_row_count: usize,
}

/// One page of a table plus the unpaged total, for paged browsing.
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Connection-level overview: display metadata plus the table list.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    #[serde(flatten)]
    pub connection: ConnectionInfo,
    pub tables: Vec<String>,
}

/// Liveness report for the gateway itself.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub active_connections: usize,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_basic_kinds() {
        assert_eq!(QueryKind::classify("SELECT * FROM t"), QueryKind::Select);
        assert_eq!(
            QueryKind::classify("INSERT INTO t VALUES (1)"),
            QueryKind::Insert
        );
        assert_eq!(QueryKind::classify("UPDATE t SET a = 1"), QueryKind::Update);
        assert_eq!(QueryKind::classify("DELETE FROM t"), QueryKind::Delete);
    }

    #[test]
    fn test_classify_ddl_keywords() {
        for sql in [
            "CREATE TABLE t (id INT)",
            "ALTER TABLE t ADD c INT",
            "DROP TABLE t",
            "TRUNCATE TABLE t",
        ] {
            assert_eq!(QueryKind::classify(sql), QueryKind::Ddl, "{sql}");
        }
    }

    #[test]
    fn test_classify_is_case_insensitive_and_trims() {
        assert_eq!(
            QueryKind::classify("  select 1 from dual  "),
            QueryKind::Select
        );
        assert_eq!(QueryKind::classify("\n\tDeLeTe FROM t"), QueryKind::Delete);
    }

    #[test]
    fn test_classify_unknown_is_other() {
        assert_eq!(QueryKind::classify("EXPLAIN SELECT 1"), QueryKind::Other);
        assert_eq!(QueryKind::classify("PRAGMA table_info(t)"), QueryKind::Other);
        assert_eq!(QueryKind::classify(""), QueryKind::Other);
    }

    #[test]
    fn test_classify_is_idempotent() {
        // Classifying a statement twice never changes the answer.
        let sql = "WITH x AS (SELECT 1) SELECT * FROM x";
        assert_eq!(QueryKind::classify(sql), QueryKind::classify(sql));
    }

    #[test]
    fn test_write_result_hides_absent_insert_id() {
        let result = QueryResult::Write {
            rows_affected: 2,
            last_insert_id: None,
            execution_time_ms: 1,
            query_type: QueryKind::Update,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rows_affected"], 2);
        assert_eq!(json["query_type"], "update");
        assert!(json.get("last_insert_id").is_none());
    }

    #[test]
    fn test_read_result_shape() {
        let result = QueryResult::Read {
            columns: vec!["id".to_string()],
            rows: vec![vec![Value::Int64(1)]],
            row_count: 1,
            execution_time_ms: 3,
            query_type: QueryKind::Select,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["row_count"], 1);
        assert_eq!(json["rows"][0][0], 1);
        assert_eq!(json["query_type"], "select");
    }
}
