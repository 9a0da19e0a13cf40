//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-connection console state.

use chatbot_core::ports::{ConfigStore, KnowledgeStore, TranscriptStore};
use chatbot_core::{KnowledgeIngestor, LiveConfigPropagator, ResponseGenerator};
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub responder: ResponseGenerator,
    pub ingestor: KnowledgeIngestor,
    pub live_config: Arc<LiveConfigPropagator>,
    pub personas: Arc<dyn ConfigStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
}

//=========================================================================================
// ConsoleSession (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single test-console WebSocket connection.
#[derive(Debug, Clone)]
pub struct ConsoleSession {
    pub tenant_id: Uuid,
    /// Set when the client asked for the conversation to be saved.
    pub session_id: Option<Uuid>,
    pub turns: usize,
}

impl ConsoleSession {
    pub fn new(tenant_id: Uuid, session_id: Option<Uuid>) -> Self {
        Self {
            tenant_id,
            session_id,
            turns: 0,
        }
    }
}
