//! Multi-engine SQL gateway core.
//!
//! `sqlgate` keeps a registry of live database connections (SQLite, MySQL,
//! PostgreSQL, Microsoft SQL Server) and dispatches uniform operations
//! against them: raw query execution with statement classification, schema
//! and table introspection, structured CRUD, and paged table browsing.
//! Callers address connections by opaque id; live handles never leave the
//! registry.
//!
//! The crate is transport-agnostic. An HTTP or RPC layer sits in front of
//! [`Gateway`], deserializes [`ConnectionProfile`]s and CRUD maps from
//! requests, and serializes the returned result types straight back out.
//!
//! Engine drivers compile in via the `sqlite`, `mysql`, `postgres` and
//! `mssql` Cargo features (all on by default). Connecting to an engine
//! whose driver is absent fails with [`GatewayError::UnsupportedEngine`].

mod engines;
mod error;
mod gateway;
mod profile;
mod query;
mod registry;
mod sql;
mod value;

pub use engines::is_supported;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use profile::{ConnectionInfo, ConnectionProfile, EngineKind};
pub use query::{
    ColumnDescriptor, DatabaseInfo, Health, QueryKind, QueryResult, RowSet, TablePage, TableSchema,
};
pub use value::Value;
