pub mod context;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod live_config;
pub mod ports;
pub mod prompt;
pub mod responder;
pub mod retrieval;
pub mod router;

pub use domain::{
    ChangeOp, ChatRole, ChatTurn, ConfigChange, Credential, KnowledgeDocument, Persona,
    PersonaEvent, ProviderKind, SearchResult, Secret, SyncStatus, Tone, EMBEDDING_DIMENSION,
};
pub use error::{PipelineError, PipelineResult};
pub use ports::{
    ChatProvider, ChatRequest, ConfigChangeStream, ConfigStore, CredentialStore,
    EmbeddingProvider, KnowledgeStore, PortError, PortResult, TranscriptStore,
};
pub use context::assemble_context;
pub use embedding::EmbeddingClient;
pub use ingest::KnowledgeIngestor;
pub use live_config::{LiveConfigPropagator, PersonaListener};
pub use prompt::{tone_description, tone_description_for, PromptBuilder};
pub use responder::{apology, ApologyKind, ResponseGenerator};
pub use retrieval::{KnowledgeRetriever, RetrievalOptions, SearchStrategy};
pub use router::{ProviderRouter, Reply, Selection};
