//! In-memory implementations of the core ports, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chatbot_core::domain::{
    ChangeOp, ConfigChange, Credential, KnowledgeDocument, Persona, ProviderKind, Secret, Tone,
    EMBEDDING_DIMENSION,
};
use chatbot_core::ports::{
    ChatProvider, ChatRequest, ConfigChangeStream, ConfigStore, CredentialStore,
    EmbeddingProvider, KnowledgeStore, PortError, PortResult,
};
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

//=========================================================================================
// Builders
//=========================================================================================

pub fn persona(tenant_id: Uuid, instruction: &str, tone: Tone) -> Persona {
    Persona {
        id: Uuid::new_v4(),
        tenant_id,
        name: "Ava".to_string(),
        system_instruction: instruction.to_string(),
        tone,
        accent_color: "#2563EB".to_string(),
        welcome_message: "Hi! How can I help you today?".to_string(),
        first_message: None,
        background_info: None,
        updated_at: Utc::now(),
    }
}

pub fn credential(tenant_id: Uuid, kind: ProviderKind, created_at: DateTime<Utc>) -> Credential {
    Credential {
        id: Uuid::new_v4(),
        tenant_id,
        provider: kind,
        secret: Secret::new(format!("{}-key", kind)),
        active: true,
        created_at,
    }
}

pub fn document(tenant_id: Uuid, content: &str, embedding: Option<Vec<f32>>) -> KnowledgeDocument {
    KnowledgeDocument {
        id: Uuid::new_v4(),
        tenant_id,
        content: content.to_string(),
        embedding,
        source: Some("faq.md".to_string()),
        metadata: None,
        created_at: Utc::now(),
    }
}

/// Unit vector along `i`, optionally tilted towards the next axis.
pub fn unit(i: usize, tilt: f32) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMENSION];
    v[i] = 1.0;
    v[(i + 1) % EMBEDDING_DIMENSION] = tilt;
    v
}

//=========================================================================================
// Credential store
//=========================================================================================

#[derive(Default)]
pub struct MemoryCredentials {
    credentials: Mutex<Vec<Credential>>,
}

impl MemoryCredentials {
    pub fn with(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Mutex::new(credentials),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn list_active(&self, tenant_id: Uuid, kind: ProviderKind) -> PortResult<Vec<Credential>> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.provider == kind && c.active)
            .cloned()
            .collect())
    }
}

//=========================================================================================
// Knowledge store
//=========================================================================================

/// Records which search method ran, in order.
#[derive(Default)]
pub struct MemoryKnowledge {
    documents: Mutex<Vec<KnowledgeDocument>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub fail_embedded_reads: Mutex<bool>,
}

impl MemoryKnowledge {
    pub fn with(documents: Vec<KnowledgeDocument>) -> Self {
        Self {
            documents: Mutex::new(documents),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<KnowledgeDocument> {
        self.documents.lock().unwrap().clone()
    }

    fn matching<F>(&self, tenant_id: Uuid, limit: usize, pred: F) -> Vec<KnowledgeDocument>
    where
        F: Fn(&str) -> bool,
    {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.tenant_id == tenant_id && pred(&d.content.to_lowercase()))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledge {
    async fn embedded_documents(&self, tenant_id: Uuid) -> PortResult<Vec<KnowledgeDocument>> {
        self.calls.lock().unwrap().push("embedded");
        if *self.fail_embedded_reads.lock().unwrap() {
            return Err(PortError::Unexpected("statement timeout".to_string()));
        }
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.embedding.is_some())
            .cloned()
            .collect())
    }

    /// Every query word must occur, with stop words of two letters or fewer ignored.
    async fn full_text_search(
        &self,
        tenant_id: Uuid,
        query: &str,
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>> {
        self.calls.lock().unwrap().push("full_text");
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| w.len() > 2)
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.matching(tenant_id, limit, |content| {
            words.iter().all(|w| content.split_whitespace().any(|c| c == w))
        }))
    }

    async fn substring_search(
        &self,
        tenant_id: Uuid,
        needle: &str,
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>> {
        self.calls.lock().unwrap().push("substring");
        let needle = needle.to_lowercase();
        Ok(self.matching(tenant_id, limit, |content| content.contains(&needle)))
    }

    async fn any_substring_search(
        &self,
        tenant_id: Uuid,
        needles: &[String],
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>> {
        self.calls.lock().unwrap().push("any_substring");
        Ok(self.matching(tenant_id, limit, |content| {
            needles.iter().any(|n| content.contains(n.as_str()))
        }))
    }

    async fn has_documents(&self, tenant_id: Uuid) -> PortResult<bool> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.tenant_id == tenant_id))
    }

    async fn list_documents(&self, tenant_id: Uuid) -> PortResult<Vec<KnowledgeDocument>> {
        let mut documents: Vec<KnowledgeDocument> = self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn insert_document(&self, document: &KnowledgeDocument) -> PortResult<()> {
        self.documents.lock().unwrap().push(document.clone());
        Ok(())
    }

    async fn delete_document(&self, tenant_id: Uuid, document_id: Uuid) -> PortResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let before = documents.len();
        documents.retain(|d| !(d.id == document_id && d.tenant_id == tenant_id));
        if documents.len() == before {
            return Err(PortError::NotFound(format!("Document {} not found", document_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// Config store
//=========================================================================================

type Subscriber = (Uuid, mpsc::UnboundedSender<PortResult<ConfigChange>>);

#[derive(Default)]
pub struct MemoryConfig {
    personas: Mutex<HashMap<Uuid, Persona>>,
    company: Mutex<HashMap<Uuid, String>>,
    subscribers: Mutex<Vec<Subscriber>>,
    pub subscribe_calls: Mutex<usize>,
    pub fail_reads: Mutex<bool>,
}

impl MemoryConfig {
    pub fn with_persona(persona: Persona) -> Self {
        let store = Self::default();
        store.personas.lock().unwrap().insert(persona.tenant_id, persona);
        store
    }

    pub fn set_company_info(&self, tenant_id: Uuid, info: &str) {
        self.company.lock().unwrap().insert(tenant_id, info.to_string());
    }

    /// Changes the stored row without notifying anyone.
    pub fn store_silently(&self, persona: Persona) {
        self.personas.lock().unwrap().insert(persona.tenant_id, persona);
    }

    /// Changes the stored row and notifies open subscriptions of that tenant.
    pub fn save(&self, persona: Persona) {
        let op = if self.personas.lock().unwrap().contains_key(&persona.tenant_id) {
            ChangeOp::Update
        } else {
            ChangeOp::Insert
        };
        let tenant_id = persona.tenant_id;
        self.store_silently(persona.clone());
        self.push(
            tenant_id,
            ConfigChange {
                op,
                new_value: Some(persona),
            },
        );
    }

    pub fn delete(&self, tenant_id: Uuid) {
        self.personas.lock().unwrap().remove(&tenant_id);
        self.push(
            tenant_id,
            ConfigChange {
                op: ChangeOp::Delete,
                new_value: None,
            },
        );
    }

    /// Ends every open subscription stream, as a dropped connection would.
    pub fn drop_subscriptions(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub fn subscribe_calls(&self) -> usize {
        *self.subscribe_calls.lock().unwrap()
    }

    /// Delivers a raw change to the tenant's open subscriptions.
    pub fn push(&self, tenant_id: Uuid, change: ConfigChange) {
        for (subscribed, sender) in self.subscribers.lock().unwrap().iter() {
            if *subscribed == tenant_id {
                let _ = sender.unbounded_send(Ok(change.clone()));
            }
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfig {
    async fn get_persona(&self, tenant_id: Uuid) -> PortResult<Option<Persona>> {
        if *self.fail_reads.lock().unwrap() {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        Ok(self.personas.lock().unwrap().get(&tenant_id).cloned())
    }

    async fn get_persona_by_id(&self, persona_id: Uuid) -> PortResult<Persona> {
        self.personas
            .lock()
            .unwrap()
            .values()
            .find(|p| p.id == persona_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Persona {} not found", persona_id)))
    }

    async fn get_company_info(&self, tenant_id: Uuid) -> PortResult<Option<String>> {
        Ok(self.company.lock().unwrap().get(&tenant_id).cloned())
    }

    async fn subscribe(&self, tenant_id: Uuid) -> PortResult<ConfigChangeStream> {
        *self.subscribe_calls.lock().unwrap() += 1;
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers.lock().unwrap().push((tenant_id, sender));
        Ok(Box::pin(receiver))
    }
}

//=========================================================================================
// Providers
//=========================================================================================

/// A chat provider that answers with a fixed text or fails, and records requests.
pub struct ScriptedChat {
    kind: ProviderKind,
    outcome: Result<String, String>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn replying(kind: ProviderKind, text: &str) -> Self {
        Self {
            kind,
            outcome: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: ProviderKind, message: &str) -> Self {
        Self {
            kind,
            outcome: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete_chat(&self, request: &ChatRequest, _credential: &Credential) -> PortResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.outcome.clone().map_err(PortError::Unexpected)
    }
}

/// Embeds every text to the same vector.
pub struct FixedEmbedder {
    pub vector: Vec<f32>,
    pub calls: Mutex<usize>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn embed(&self, _text: &str, _credential: &Credential) -> PortResult<Vec<f32>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.vector.clone())
    }
}
