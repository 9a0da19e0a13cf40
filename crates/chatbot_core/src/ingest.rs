//! crates/chatbot_core/src/ingest.rs
//!
//! Adds documents to a tenant's knowledge base. Content is embedded on the way
//! in so the vector strategy can find it; when embedding is not possible the
//! document is still stored and stays reachable through text search.

use crate::domain::{KnowledgeDocument, EMBEDDING_DIMENSION};
use crate::embedding::EmbeddingClient;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::KnowledgeStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct KnowledgeIngestor {
    store: Arc<dyn KnowledgeStore>,
    embeddings: Option<EmbeddingClient>,
}

impl KnowledgeIngestor {
    pub fn new(store: Arc<dyn KnowledgeStore>, embeddings: Option<EmbeddingClient>) -> Self {
        Self { store, embeddings }
    }

    /// Embeds and stores a new document for `tenant_id`.
    pub async fn add(
        &self,
        tenant_id: Uuid,
        content: &str,
        source: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> PipelineResult<KnowledgeDocument> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let embedding = self.embed(tenant_id, content).await;
        let document = KnowledgeDocument {
            id: Uuid::new_v4(),
            tenant_id,
            content: content.to_string(),
            embedding,
            source: source.filter(|s| !s.trim().is_empty()),
            metadata,
            created_at: Utc::now(),
        };
        self.store.insert_document(&document).await?;

        info!(
            tenant_id = %tenant_id,
            document_id = %document.id,
            embedded = document.embedding.is_some(),
            "Knowledge document added"
        );
        Ok(document)
    }

    pub async fn list(&self, tenant_id: Uuid) -> PipelineResult<Vec<KnowledgeDocument>> {
        Ok(self.store.list_documents(tenant_id).await?)
    }

    pub async fn remove(&self, tenant_id: Uuid, document_id: Uuid) -> PipelineResult<()> {
        self.store.delete_document(tenant_id, document_id).await?;
        info!(tenant_id = %tenant_id, document_id = %document_id, "Knowledge document removed");
        Ok(())
    }

    async fn embed(&self, tenant_id: Uuid, content: &str) -> Option<Vec<f32>> {
        let client = self.embeddings.as_ref()?;
        match client.embed(tenant_id, content).await {
            Ok(vector) if vector.len() == EMBEDDING_DIMENSION => Some(vector),
            Ok(_) => None,
            Err(e) => {
                warn!(tenant_id = %tenant_id, "Storing document without embedding: {}", e);
                None
            }
        }
    }
}
