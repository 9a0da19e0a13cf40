//! crates/chatbot_core/src/ports.rs
//!
//! Defines the service contracts (traits) the response pipeline depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific stores, LLM vendors and notification transports.

use crate::domain::{ChatTurn, ConfigChange, Credential, KnowledgeDocument, Persona, ProviderKind};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Stream of persona changes for one tenant. The stream ending means the
/// subscription was lost.
pub type ConfigChangeStream = Pin<Box<dyn Stream<Item = PortResult<ConfigChange>> + Send>>;

//=========================================================================================
// Store Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Active credentials of one provider kind for a tenant, in any order.
    async fn list_active(&self, tenant_id: Uuid, kind: ProviderKind) -> PortResult<Vec<Credential>>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Every tenant document that carries an embedding.
    async fn embedded_documents(&self, tenant_id: Uuid) -> PortResult<Vec<KnowledgeDocument>>;

    /// Natural-language text search of document content.
    async fn full_text_search(
        &self,
        tenant_id: Uuid,
        query: &str,
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>>;

    /// Case-insensitive substring match of `needle` against document content.
    async fn substring_search(
        &self,
        tenant_id: Uuid,
        needle: &str,
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>>;

    /// Documents containing any of `needles` (case-insensitive).
    async fn any_substring_search(
        &self,
        tenant_id: Uuid,
        needles: &[String],
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>>;

    /// Whether the tenant has any knowledge documents at all.
    async fn has_documents(&self, tenant_id: Uuid) -> PortResult<bool>;

    /// Every document of the tenant, newest first.
    async fn list_documents(&self, tenant_id: Uuid) -> PortResult<Vec<KnowledgeDocument>>;

    async fn insert_document(&self, document: &KnowledgeDocument) -> PortResult<()>;

    /// Removes one of the tenant's documents. `NotFound` when the tenant owns no
    /// document with that id.
    async fn delete_document(&self, tenant_id: Uuid, document_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The tenant's active persona, if one exists.
    async fn get_persona(&self, tenant_id: Uuid) -> PortResult<Option<Persona>>;

    /// Looks a persona up by its own id (the public widget id).
    async fn get_persona_by_id(&self, persona_id: Uuid) -> PortResult<Persona>;

    /// Tenant-level company information, if any was saved.
    async fn get_company_info(&self, tenant_id: Uuid) -> PortResult<Option<String>>;

    /// Opens a change subscription filtered to one tenant. Returning `Ok`
    /// means the subscription is acknowledged.
    async fn subscribe(&self, tenant_id: Uuid) -> PortResult<ConfigChangeStream>;
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Appends one turn to a persisted session transcript.
    async fn save_turn(&self, session_id: Uuid, tenant_id: Uuid, turn: ChatTurn) -> PortResult<()>;
}

//=========================================================================================
// Provider Ports (Traits)
//=========================================================================================

/// Fixed sampling parameters for every chat completion.
pub const CHAT_MAX_TOKENS: u32 = 500;
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// The uniform request shape every chat provider receives.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_text: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(system_prompt: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_text: user_text.into(),
            max_tokens: CHAT_MAX_TOKENS,
            temperature: CHAT_TEMPERATURE,
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Which provider kind this adapter translates for.
    fn kind(&self) -> ProviderKind;

    /// Runs a single-turn chat completion and returns the reply text.
    async fn complete_chat(&self, request: &ChatRequest, credential: &Credential) -> PortResult<String>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Which credential kind this provider authenticates with.
    fn kind(&self) -> ProviderKind;

    /// Turns text into a vector. Dimensionality is validated by the caller.
    async fn embed(&self, text: &str, credential: &Credential) -> PortResult<Vec<f32>>;
}
