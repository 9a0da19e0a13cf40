//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::http::StatusCode;
use chatbot_core::error::PipelineError;
use chatbot_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// An error raised by the response pipeline.
    #[error("Pipeline Error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status and client-safe message for this error.
    pub fn to_status(&self) -> (StatusCode, String) {
        match self {
            ApiError::Port(PortError::NotFound(_))
            | ApiError::Pipeline(PipelineError::Port(PortError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, "Bot configuration not found".to_string())
            }
            ApiError::Pipeline(PipelineError::PersonaNotConfigured(_)) => {
                (StatusCode::NOT_FOUND, "Bot configuration not found".to_string())
            }
            ApiError::Pipeline(PipelineError::EmptyDocument) => {
                (StatusCode::BAD_REQUEST, "Document content must not be empty".to_string())
            }
            ApiError::Port(PortError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process message".to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn missing_configuration_maps_to_not_found() {
        let err = ApiError::from(PipelineError::PersonaNotConfigured(Uuid::nil()));
        assert_eq!(err.to_status().0, StatusCode::NOT_FOUND);
        let err = ApiError::from(PortError::NotFound("Persona x not found".to_string()));
        assert_eq!(err.to_status().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn empty_document_is_a_client_error() {
        let (status, _) = ApiError::from(PipelineError::EmptyDocument).to_status();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = ApiError::from(PortError::Unexpected("password authentication failed".to_string()));
        let (status, message) = err.to_status();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("password"));
    }
}
