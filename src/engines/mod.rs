//! Engine adapters and the factory that picks one from a profile.
//!
//! Each adapter owns a single native connection and normalizes it behind
//! `EngineHandle`: decoded rows come back as unified `Value`s, catalog
//! queries come back as plain table and column lists, and driver errors
//! are mapped into the gateway taxonomy. Adapters are compiled in per
//! engine via Cargo features; a recognized engine whose driver is absent
//! from the build fails with `UnsupportedEngine`.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::profile::{ConnectionInfo, ConnectionProfile, EngineKind};
use crate::query::{ColumnDescriptor, RowSet, WriteOutcome};
use crate::value::Value;

#[cfg(feature = "mssql")]
mod mssql;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

/// A live, single connection to one database, normalized across engines.
///
/// Methods take `&mut self` because each handle wraps one native
/// connection; the registry serializes access per handle.
#[async_trait]
pub(crate) trait EngineHandle: Send {
    /// Run a row-returning statement and decode every cell.
    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, GatewayError>;

    /// Run a non-row-returning statement.
    async fn execute(&mut self, sql: &str, params: &[Value])
    -> Result<WriteOutcome, GatewayError>;

    /// User tables in the connected database, in catalog order.
    async fn list_tables(&mut self) -> Result<Vec<String>, GatewayError>;

    /// Name of the connected database as the engine reports it.
    async fn database_name(&mut self) -> Result<String, GatewayError>;

    /// Column catalog for one table.
    async fn describe_columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, GatewayError>;

    /// Cleanly shut the native connection down.
    async fn close(self: Box<Self>) -> Result<(), GatewayError>;
}

/// Whether this build carries a driver for the given engine.
pub fn is_supported(engine: EngineKind) -> bool {
    match engine {
        EngineKind::Sqlite => cfg!(feature = "sqlite"),
        EngineKind::Mysql => cfg!(feature = "mysql"),
        EngineKind::Postgres => cfg!(feature = "postgres"),
        EngineKind::Mssql => cfg!(feature = "mssql"),
    }
}

/// Validate the profile, open a native connection for its engine, and probe
/// the server version. Returns the normalized handle plus the display
/// metadata a caller gets back.
pub(crate) async fn connect(
    profile: &ConnectionProfile,
) -> Result<(Box<dyn EngineHandle>, ConnectionInfo), GatewayError> {
    profile.validate()?;

    if !is_supported(profile.engine) {
        return Err(GatewayError::UnsupportedEngine(format!(
            "{} support is not compiled into this build",
            profile.engine.display_name()
        )));
    }

    let (handle, version): (Box<dyn EngineHandle>, String) = match profile.engine {
        #[cfg(feature = "sqlite")]
        EngineKind::Sqlite => sqlite::connect(profile).await?,
        #[cfg(feature = "mysql")]
        EngineKind::Mysql => mysql::connect(profile).await?,
        #[cfg(feature = "postgres")]
        EngineKind::Postgres => postgres::connect(profile).await?,
        #[cfg(feature = "mssql")]
        EngineKind::Mssql => mssql::connect(profile).await?,
        #[allow(unreachable_patterns)]
        _ => unreachable!("unsupported engines are rejected above"),
    };

    Ok((handle, profile.connection_info(version)))
}

/// Map a driver failure during connection establishment.
#[allow(dead_code)]
pub(crate) fn connect_err(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Connect(err.to_string())
}

/// Map a driver failure during statement execution or introspection.
#[allow(dead_code)]
pub(crate) fn exec_err(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Execution(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_supports_all_engines() {
        for engine in EngineKind::all() {
            assert!(is_supported(engine), "{engine}");
        }
    }
}
