//! Engine tags, connection profiles, and display metadata.
//!
//! This module contains:
//! - `EngineKind` - Closed enum of supported SQL engines
//! - `ConnectionProfile` - What a caller supplies to open a connection
//! - `ConnectionInfo` - Display metadata returned to the caller (never the
//!   raw handle)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::GatewayError;

/// Fallback UI color applied when a profile omits one.
const DEFAULT_COLOR: &str = "#007bff";

/// Supported SQL engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(rename = "postgresql", alias = "postgres")]
    Postgres,
    #[serde(alias = "sqlserver")]
    Mssql,
}

impl EngineKind {
    /// Get the display name for this engine.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::Mysql => "MySQL",
            Self::Postgres => "PostgreSQL",
            Self::Mssql => "Microsoft SQL Server",
        }
    }

    /// Get the conventional default client port for server-based engines.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None, // File-based
            Self::Mysql => Some(3306),
            Self::Postgres => Some(5432),
            Self::Mssql => Some(1433),
        }
    }

    /// Check if this engine is file-based.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::Sqlite)
    }

    /// The positional placeholder marker for the n-th bound parameter
    /// (1-indexed). SQLite and MySQL use anonymous `?`; PostgreSQL and
    /// SQL Server number their markers.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Sqlite | Self::Mysql => "?".to_string(),
            Self::Postgres => format!("${n}"),
            Self::Mssql => format!("@P{n}"),
        }
    }

    /// Get all supported engine kinds.
    pub fn all() -> Vec<EngineKind> {
        vec![Self::Sqlite, Self::Mysql, Self::Postgres, Self::Mssql]
    }

    /// Parse from a string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "postgresql" | "postgres" | "pg" => Some(Self::Postgres),
            "mssql" | "sqlserver" => Some(Self::Mssql),
            _ => None,
        }
    }

    /// Convert to the lowercase tag used on the wire.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgresql",
            Self::Mssql => "mssql",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// What a caller supplies to open (or test) a connection.
///
/// SQLite profiles carry a file path; server engines carry
/// host/port/credentials/database. The transport may send the SQLite path
/// under either `path` or `database`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// User-facing name for this connection.
    pub name: String,
    /// Engine tag; unrecognized tags are rejected during deserialization.
    #[serde(alias = "type")]
    pub engine: EngineKind,
    /// Optional UI color.
    #[serde(default)]
    pub color: Option<String>,
    /// Database file path (SQLite).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Server hostname (server engines).
    #[serde(default)]
    pub host: Option<String>,
    /// Server port; the engine's conventional default applies when omitted.
    #[serde(default)]
    pub port: Option<u16>,
    /// Username (server engines).
    #[serde(default)]
    pub username: Option<String>,
    /// Password (server engines); never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Database name (server engines), or the file path for SQLite when
    /// `path` is absent.
    #[serde(default)]
    pub database: Option<String>,
}

impl ConnectionProfile {
    /// Resolve the SQLite database file path, accepting it under either
    /// the `path` or `database` field.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| self.database.clone().map(PathBuf::from))
    }

    /// The port to connect on, applying the engine default when omitted.
    pub fn resolved_port(&self) -> Option<u16> {
        self.port.or_else(|| self.engine.default_port())
    }

    /// Validate that the required fields for the profile's engine are
    /// present. Missing fields fail with `Validation`.
    pub fn validate(&self) -> Result<(), GatewayError> {
        match self.engine {
            EngineKind::Sqlite => {
                if self.sqlite_path().is_none() {
                    return Err(GatewayError::Validation(
                        "SQLite database file path is required".to_string(),
                    ));
                }
            }
            EngineKind::Mysql | EngineKind::Postgres | EngineKind::Mssql => {
                let missing = [
                    ("host", self.host.as_deref()),
                    ("username", self.username.as_deref()),
                    ("password", self.password.as_deref()),
                    ("database", self.database.as_deref()),
                ]
                .iter()
                .find(|(_, v)| v.is_none_or(str::is_empty))
                .map(|(name, _)| *name);

                if let Some(field) = missing {
                    return Err(GatewayError::Validation(format!(
                        "{} is required for {}",
                        field,
                        self.engine.display_name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the display metadata for a freshly probed connection.
    pub(crate) fn connection_info(&self, version: String) -> ConnectionInfo {
        let (database, path) = if self.engine.is_file_based() {
            let path = self.sqlite_path();
            let database = path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            (database, path)
        } else {
            (self.database.clone().unwrap_or_default(), None)
        };

        ConnectionInfo {
            name: self.name.clone(),
            engine: self.engine,
            color: self
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            version,
            database,
            host: if self.engine.is_file_based() {
                None
            } else {
                self.host.clone()
            },
            port: if self.engine.is_file_based() {
                None
            } else {
                self.resolved_port()
            },
            path,
        }
    }
}

/// Display metadata for an open connection. This is what callers get back;
/// the live handle itself never leaves the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub engine: EngineKind,
    pub color: String,
    /// Engine-reported version string from the connect-time probe.
    pub version: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_profile(path: &str) -> ConnectionProfile {
        ConnectionProfile {
            name: "demo".to_string(),
            engine: EngineKind::Sqlite,
            color: None,
            path: Some(PathBuf::from(path)),
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
        }
    }

    fn server_profile(engine: EngineKind) -> ConnectionProfile {
        ConnectionProfile {
            name: "demo".to_string(),
            engine,
            color: Some("#ff0000".to_string()),
            path: None,
            host: Some("localhost".to_string()),
            port: None,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            database: Some("appdb".to_string()),
        }
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(EngineKind::Sqlite.default_port(), None);
        assert_eq!(EngineKind::Mysql.default_port(), Some(3306));
        assert_eq!(EngineKind::Postgres.default_port(), Some(5432));
        assert_eq!(EngineKind::Mssql.default_port(), Some(1433));
    }

    #[test]
    fn test_placeholder_styles() {
        assert_eq!(EngineKind::Sqlite.placeholder(1), "?");
        assert_eq!(EngineKind::Mysql.placeholder(3), "?");
        assert_eq!(EngineKind::Postgres.placeholder(2), "$2");
        assert_eq!(EngineKind::Mssql.placeholder(2), "@P2");
    }

    #[test]
    fn test_engine_tag_parsing() {
        assert_eq!(EngineKind::parse("sqlite"), Some(EngineKind::Sqlite));
        assert_eq!(EngineKind::parse("PostgreSQL"), Some(EngineKind::Postgres));
        assert_eq!(EngineKind::parse("mssql"), Some(EngineKind::Mssql));
        assert_eq!(EngineKind::parse("mongodb"), None);
    }

    #[test]
    fn test_profile_deserializes_type_alias() {
        let profile: ConnectionProfile = serde_json::from_str(
            r#"{"name": "local", "type": "postgresql", "host": "db.local",
                "username": "app", "password": "secret", "database": "appdb"}"#,
        )
        .unwrap();
        assert_eq!(profile.engine, EngineKind::Postgres);
        assert_eq!(profile.resolved_port(), Some(5432));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_unrecognized_engine_rejected_before_dispatch() {
        let result: Result<ConnectionProfile, _> =
            serde_json::from_str(r#"{"name": "x", "type": "mongodb"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_sqlite_path_accepted_under_database_field() {
        let profile: ConnectionProfile = serde_json::from_str(
            r#"{"name": "demo", "type": "sqlite", "database": "/data/demo.db"}"#,
        )
        .unwrap();
        assert_eq!(profile.sqlite_path(), Some(PathBuf::from("/data/demo.db")));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_sqlite_requires_path() {
        let mut profile = sqlite_profile("/tmp/demo.db");
        profile.path = None;
        let err = profile.validate().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_server_profile_missing_fields() {
        for engine in [EngineKind::Mysql, EngineKind::Postgres, EngineKind::Mssql] {
            let mut profile = server_profile(engine);
            profile.host = None;
            assert!(profile.validate().is_err());

            let mut profile = server_profile(engine);
            profile.password = Some(String::new());
            assert!(profile.validate().is_err());

            assert!(server_profile(engine).validate().is_ok());
        }
    }

    #[test]
    fn test_connection_info_shape() {
        let info = sqlite_profile("/data/demo.db").connection_info("3.45.0".to_string());
        assert_eq!(info.database, "demo.db");
        assert_eq!(info.color, DEFAULT_COLOR);
        assert_eq!(info.path, Some(PathBuf::from("/data/demo.db")));
        assert!(info.host.is_none());

        let info = server_profile(EngineKind::Mysql).connection_info("8.0.36".to_string());
        assert_eq!(info.database, "appdb");
        assert_eq!(info.port, Some(3306));
        assert!(info.path.is_none());
    }

    #[test]
    fn test_password_never_serialized() {
        let profile = server_profile(EngineKind::Postgres);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("pass"));
    }
}
