//! crates/chatbot_core/src/error.rs
//!
//! The error taxonomy of the response pipeline.

use crate::domain::ProviderKind;
use crate::ports::PortError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No embedding credential, or the embedding provider could not be reached.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// The tenant has no usable credential for any provider kind.
    #[error("No active AI credential is configured")]
    NoActiveCredential,

    #[error("Provider {provider} call failed: {message}")]
    ProviderCallFailed {
        provider: ProviderKind,
        message: String,
    },

    #[error("Document content must not be empty")]
    EmptyDocument,

    #[error("No persona is configured for tenant {0}")]
    PersonaNotConfigured(Uuid),

    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
