//! crates/chatbot_core/src/domain.rs
//!
//! Defines the pure, core data structures for the chatbot platform.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Fixed dimensionality of every embedding vector stored or compared by the system.
pub const EMBEDDING_DIMENSION: usize = 1536;

//=========================================================================================
// Persona
//=========================================================================================

/// The register a persona speaks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tone {
    #[default]
    Friendly,
    Professional,
    Casual,
    Formal,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Tone::Friendly, Tone::Professional, Tone::Casual, Tone::Formal];

    /// Parses a stored tone label. Unknown labels fall back to `Friendly`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "professional" => Tone::Professional,
            "casual" => Tone::Casual,
            "formal" => Tone::Formal,
            _ => Tone::Friendly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Friendly => "friendly",
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Formal => "formal",
        }
    }
}

impl From<&str> for Tone {
    fn from(label: &str) -> Self {
        Tone::from_label(label)
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant's bot configuration. Exactly one is active per tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub system_instruction: String,
    pub tone: Tone,
    pub accent_color: String,
    pub welcome_message: String,
    pub first_message: Option<String>,
    pub background_info: Option<String>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Credentials and Providers
//=========================================================================================

/// The closed set of interchangeable LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    OpenAi,
    Claude,
    Groq,
}

impl ProviderKind {
    /// Order used when nothing else distinguishes two candidates.
    pub const DEFAULT_ORDER: [ProviderKind; 3] =
        [ProviderKind::OpenAi, ProviderKind::Claude, ProviderKind::Groq];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Groq => "groq",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "claude" | "anthropic" => Some(ProviderKind::Claude),
            "groq" => Some(ProviderKind::Groq),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An API key that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// A stored provider secret. Never mutated in place; revocation flips `active`.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: ProviderKind,
    pub secret: Secret,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Knowledge
//=========================================================================================

/// A retrievable text document owned by one tenant.
#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeDocument {
    /// The embedding, if it has the system's fixed dimensionality.
    pub fn usable_embedding(&self) -> Option<&[f32]> {
        self.embedding
            .as_deref()
            .filter(|v| v.len() == EMBEDDING_DIMENSION)
    }
}

/// One hit produced by the knowledge retriever. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub similarity: Option<f32>,
}

impl From<KnowledgeDocument> for SearchResult {
    fn from(doc: KnowledgeDocument) -> Self {
        Self {
            content: doc.content,
            source: doc.source,
            metadata: doc.metadata,
            similarity: None,
        }
    }
}

//=========================================================================================
// Chat transcript
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A single message in a widget or console conversation.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub id: Uuid,
    pub content: String,
    pub role: ChatRole,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            role,
            timestamp: Utc::now(),
        }
    }
}

//=========================================================================================
// Config change notifications
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One row-level change of a tenant's persona as delivered by the config store.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub op: ChangeOp,
    pub new_value: Option<Persona>,
}

/// What local listeners receive when a tenant's persona changes.
#[derive(Debug, Clone, PartialEq)]
pub enum PersonaEvent {
    Updated(Persona),
    Cleared,
}

/// Synchronisation state of one tenant's live persona feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Uninitialized,
    Syncing,
    Live,
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tone_labels_parse_as_friendly() {
        assert_eq!(Tone::from_label("pirate"), Tone::Friendly);
        assert_eq!(Tone::from_label(""), Tone::Friendly);
        assert_eq!(Tone::from_label(" Formal "), Tone::Formal);
        for tone in Tone::ALL {
            assert_eq!(Tone::from_label(tone.as_str()), tone);
        }
    }

    #[test]
    fn provider_labels_parse() {
        for kind in ProviderKind::DEFAULT_ORDER {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse("mistral"), None);
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let secret = Secret::new("sk-live-123");
        assert_eq!(format!("{:?}", secret), "Secret(****)");
        assert_eq!(secret.expose(), "sk-live-123");
    }

    #[test]
    fn short_embeddings_are_not_usable() {
        let mut doc = KnowledgeDocument {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            content: "hello".to_string(),
            embedding: Some(vec![0.1; 3]),
            source: None,
            metadata: None,
            created_at: Utc::now(),
        };
        assert!(doc.usable_embedding().is_none());
        doc.embedding = Some(vec![0.1; EMBEDDING_DIMENSION]);
        assert!(doc.usable_embedding().is_some());
    }
}
