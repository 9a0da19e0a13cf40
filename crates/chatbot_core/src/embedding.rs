//! crates/chatbot_core/src/embedding.rs
//!
//! Turns text into fixed-length vectors through the tenant's embedding credential.

use crate::domain::{Credential, EMBEDDING_DIMENSION};
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{CredentialStore, EmbeddingProvider, PortResult};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct EmbeddingClient {
    credentials: Arc<dyn CredentialStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingClient {
    pub fn new(credentials: Arc<dyn CredentialStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            credentials,
            provider,
        }
    }

    /// Embeds `text` for `tenant_id`.
    ///
    /// Never returns a vector whose length differs from [`EMBEDDING_DIMENSION`].
    /// No retries are attempted; callers decide how to degrade.
    pub async fn embed(&self, tenant_id: Uuid, text: &str) -> PipelineResult<Vec<f32>> {
        let kind = self.provider.kind();
        let credential = newest_active(self.credentials.list_active(tenant_id, kind).await)
            .map_err(|e| PipelineError::EmbeddingUnavailable(e.to_string()))?
            .ok_or_else(|| {
                PipelineError::EmbeddingUnavailable(format!("no active {} credential", kind))
            })?;

        let vector = self
            .provider
            .embed(text, &credential)
            .await
            .map_err(|e| PipelineError::EmbeddingUnavailable(e.to_string()))?;

        if vector.len() != EMBEDDING_DIMENSION {
            return Err(PipelineError::EmbeddingDimensionMismatch {
                expected: EMBEDDING_DIMENSION,
                actual: vector.len(),
            });
        }

        debug!(tenant_id = %tenant_id, provider = %kind, "Embedded query text");
        Ok(vector)
    }
}

/// Picks the most recently created active credential out of a store listing.
pub(crate) fn newest_active(listing: PortResult<Vec<Credential>>) -> PortResult<Option<Credential>> {
    Ok(listing?
        .into_iter()
        .filter(|c| c.active)
        .max_by_key(|c| c.created_at))
}
