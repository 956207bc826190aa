//! Gateway error taxonomy.
//!
//! Every public operation returns a `Result` carrying one of these kinds;
//! nothing panics or unwinds across the crate boundary. Where a native
//! driver produced the failure, its own message is carried verbatim.

use serde::Serialize;

/// Error type for all gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A profile or request field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// Unknown connection id, or a database file path that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Unrecognized engine tag, or a recognized engine whose driver is not
    /// compiled into this build.
    #[error("{0}")]
    UnsupportedEngine(String),

    /// Authentication or network failure surfaced from the engine.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Malformed statement, constraint violation, or identifier problem
    /// surfaced from the engine.
    #[error("{0}")]
    Execution(String),

    /// Anything unanticipated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable snake_case tag for transport marshaling.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::UnsupportedEngine(_) => "unsupported_engine",
            Self::Connect(_) => "connect_error",
            Self::Execution(_) => "execution_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Shorthand for the unknown-connection-id failure every operation
    /// that takes a connection id can return.
    pub(crate) fn connection_not_found(id: &str) -> Self {
        Self::NotFound(format!("Connection not found: {id}"))
    }
}

impl Serialize for GatewayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("GatewayError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("error", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            GatewayError::Validation("x".into()).kind(),
            "validation_error"
        );
        assert_eq!(GatewayError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            GatewayError::UnsupportedEngine("x".into()).kind(),
            "unsupported_engine"
        );
        assert_eq!(GatewayError::Connect("x".into()).kind(), "connect_error");
        assert_eq!(
            GatewayError::Execution("x".into()).kind(),
            "execution_error"
        );
        assert_eq!(GatewayError::Internal("x".into()).kind(), "internal_error");
    }

    #[test]
    fn test_native_message_is_preserved() {
        let err = GatewayError::Connect("Access denied for user 'root'".into());
        assert_eq!(
            err.to_string(),
            "connection failed: Access denied for user 'root'"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let err = GatewayError::connection_not_found("abc");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["error"], "Connection not found: abc");
    }
}
