//! # Error Types
//!
//! Crate-wide error enum shared by the runner, resolver, interpreter and stores.
//!
//! Variants are grouped the way failures are handled at runtime: transient
//! transport problems flow into retry classification, configuration gaps consume
//! retry budget like any other failure, and correlation problems
//! (`UnresolvableContext`, `InvalidProviderResponse`) are logged and skipped.

use thiserror::Error;

use crate::config::error::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClearanceError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("No active endpoint found for {provider}/{operation}")]
    EndpointNotFound { provider: String, operation: String },

    #[error("Unresolvable context: {0}")]
    UnresolvableContext(String),

    #[error("Invalid provider response: {0}")]
    InvalidProviderResponse(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("State transition error: {0}")]
    StateTransitionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Render error: {0}")]
    RenderError(String),
}

impl ClearanceError {
    pub fn endpoint_not_found(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            provider: provider.into(),
            operation: operation.into(),
        }
    }

    /// Data problems cannot heal on a later attempt, so they end the invocation
    /// without consuming the rest of its retry budget.
    pub fn is_data_problem(&self) -> bool {
        matches!(self, Self::UnresolvableContext(_))
    }

    /// Short machine-friendly label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database",
            Self::ConfigurationError(_) => "configuration",
            Self::EndpointNotFound { .. } => "endpoint_not_found",
            Self::UnresolvableContext(_) => "unresolvable_context",
            Self::InvalidProviderResponse(_) => "invalid_provider_response",
            Self::TransportError(_) => "transport",
            Self::AuthenticationError(_) => "authentication",
            Self::StateTransitionError(_) => "state_transition",
            Self::ValidationError(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::SerializationError(_) => "serialization",
            Self::RenderError(_) => "render",
        }
    }
}

impl From<sqlx::Error> for ClearanceError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ClearanceError::Conflict(db.message().to_string())
            }
            _ => ClearanceError::DatabaseError(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ClearanceError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        ClearanceError::DatabaseError(format!("Migration failed: {error}"))
    }
}

impl From<serde_json::Error> for ClearanceError {
    fn from(error: serde_json::Error) -> Self {
        ClearanceError::SerializationError(error.to_string())
    }
}

impl From<ConfigurationError> for ClearanceError {
    fn from(error: ConfigurationError) -> Self {
        ClearanceError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClearanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_not_found_message() {
        let err = ClearanceError::endpoint_not_found("MEDX", "CREATE_CLEARANCE_REQUEST");
        assert_eq!(
            err.to_string(),
            "No active endpoint found for MEDX/CREATE_CLEARANCE_REQUEST"
        );
        assert_eq!(err.kind(), "endpoint_not_found");
    }

    #[test]
    fn test_only_unresolvable_context_is_a_data_problem() {
        assert!(ClearanceError::UnresolvableContext("no ids".into()).is_data_problem());
        assert!(!ClearanceError::TransportError("reset".into()).is_data_problem());
        assert!(!ClearanceError::endpoint_not_found("A", "B").is_data_problem());
    }

    #[test]
    fn test_serde_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ClearanceError = parse.unwrap_err().into();
        assert!(matches!(err, ClearanceError::SerializationError(_)));
    }
}
