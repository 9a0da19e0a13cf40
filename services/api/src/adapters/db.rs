//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! store ports from the `core` crate. It handles all interactions with the
//! PostgreSQL database using `sqlx`, including the `LISTEN/NOTIFY` channel that
//! carries persona changes.

use async_trait::async_trait;
use chatbot_core::domain::{
    ChangeOp, ChatTurn, ConfigChange, Credential, KnowledgeDocument, Persona, ProviderKind,
    Secret, Tone, EMBEDDING_DIMENSION,
};
use chatbot_core::ports::{
    ConfigChangeStream, ConfigStore, CredentialStore, KnowledgeStore, PortError, PortResult,
    TranscriptStore,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The channel the persona trigger notifies on.
pub const PERSONA_CHANNEL: &str = "persona_changes";

/// Text search configuration shared with the GIN index in the migrations.
const TS_CONFIG: &str = "simple";

/// Buffered notifications per subscriber before it counts as lagging.
const CHANGE_BUFFER: usize = 256;

/// Pause before the listener retries after a failed receive.
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every store port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    changes: Arc<ChangeHub>,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            changes: Arc::new(ChangeHub::new()),
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Opens the one listener connection shared by every tenant feed and
    /// spawns the task that fans its notifications out.
    pub async fn listen_for_changes(&self) -> Result<JoinHandle<()>, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(PERSONA_CHANNEL).await?;
        self.changes.set_running();
        info!(channel = PERSONA_CHANNEL, "Listening for persona changes");

        let hub = self.changes.clone();
        Ok(tokio::spawn(async move { run_listener(listener, hub).await }))
    }
}

//=========================================================================================
// Persona Change Fan-out
//=========================================================================================

/// What the shared listener hands to every tenant feed.
#[derive(Debug, Clone)]
enum ListenerEvent {
    Changed(PersonaNotification),
    /// The listener connection dropped; notifications may have been missed.
    Lost,
}

/// Demultiplexes the single `LISTEN` connection into per-tenant streams.
struct ChangeHub {
    sender: broadcast::Sender<ListenerEvent>,
    running: AtomicBool,
}

impl ChangeHub {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            sender,
            running: AtomicBool::new(false),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_running(&self) {
        self.running.store(true, Ordering::Release);
    }

    fn publish(&self, event: ListenerEvent) {
        // No receivers just means no tenant is listening right now.
        let _ = self.sender.send(event);
    }
}

/// Reads notifications until the task is aborted. `PgListener` reconnects on
/// the receive that follows a lost connection.
async fn run_listener(mut listener: PgListener, hub: Arc<ChangeHub>) {
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                match serde_json::from_str::<PersonaNotification>(notification.payload()) {
                    Ok(payload) => hub.publish(ListenerEvent::Changed(payload)),
                    Err(e) => warn!("Malformed persona notification ignored: {}", e),
                }
            }
            Ok(None) => {
                warn!("Persona listener connection lost, reconnecting");
                hub.publish(ListenerEvent::Lost);
            }
            Err(e) => {
                error!("Persona listener failed: {}", e);
                hub.publish(ListenerEvent::Lost);
                tokio::time::sleep(LISTENER_RETRY_DELAY).await;
            }
        }
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const PERSONA_COLUMNS: &str = "id, tenant_id, name, system_instruction, tone, accent_color, \
     welcome_message, first_message, background_info, updated_at";

#[derive(FromRow)]
struct PersonaRecord {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    system_instruction: String,
    tone: String,
    accent_color: String,
    welcome_message: String,
    first_message: Option<String>,
    background_info: Option<String>,
    updated_at: DateTime<Utc>,
}
impl PersonaRecord {
    fn to_domain(self) -> Persona {
        Persona {
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            system_instruction: self.system_instruction,
            tone: Tone::from_label(&self.tone),
            accent_color: self.accent_color,
            welcome_message: self.welcome_message,
            first_message: self.first_message,
            background_info: self.background_info,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialRecord {
    id: Uuid,
    tenant_id: Uuid,
    provider: String,
    secret: String,
    active: bool,
    created_at: DateTime<Utc>,
}
impl CredentialRecord {
    fn to_domain(self) -> PortResult<Credential> {
        let provider = ProviderKind::parse(&self.provider).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown provider '{}' on credential {}", self.provider, self.id))
        })?;
        Ok(Credential {
            id: self.id,
            tenant_id: self.tenant_id,
            provider,
            secret: Secret::new(self.secret),
            active: self.active,
            created_at: self.created_at,
        })
    }
}

const DOCUMENT_COLUMNS: &str = "id, tenant_id, content, embedding, source, metadata, created_at";

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    tenant_id: Uuid,
    content: String,
    embedding: Option<Vec<f32>>,
    source: Option<String>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> KnowledgeDocument {
        KnowledgeDocument {
            id: self.id,
            tenant_id: self.tenant_id,
            content: self.content,
            embedding: self.embedding,
            source: self.source,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

/// The JSON payload the persona trigger sends.
#[derive(Debug, Clone, Deserialize)]
struct PersonaNotification {
    op: String,
    tenant_id: Uuid,
    persona_id: Uuid,
}

fn change_op(op: &str) -> Option<ChangeOp> {
    match op {
        "INSERT" => Some(ChangeOp::Insert),
        "UPDATE" => Some(ChangeOp::Update),
        "DELETE" => Some(ChangeOp::Delete),
        _ => None,
    }
}

/// Wraps `needle` for a case-insensitive `LIKE` match anywhere in the text,
/// escaping the pattern metacharacters.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

async fn fetch_persona(pool: &PgPool, tenant_id: Uuid) -> PortResult<Option<Persona>> {
    let record = sqlx::query_as::<_, PersonaRecord>(&format!(
        "SELECT {} FROM personas WHERE tenant_id = $1",
        PERSONA_COLUMNS
    ))
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| PortError::Unexpected(e.to_string()))?;
    Ok(record.map(PersonaRecord::to_domain))
}

//=========================================================================================
// `CredentialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CredentialStore for PgStore {
    async fn list_active(&self, tenant_id: Uuid, kind: ProviderKind) -> PortResult<Vec<Credential>> {
        let records = sqlx::query_as::<_, CredentialRecord>(
            "SELECT id, tenant_id, provider, secret, active, created_at FROM credentials \
             WHERE tenant_id = $1 AND provider = $2 AND active ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(CredentialRecord::to_domain).collect()
    }
}

//=========================================================================================
// `KnowledgeStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl KnowledgeStore for PgStore {
    async fn embedded_documents(&self, tenant_id: Uuid) -> PortResult<Vec<KnowledgeDocument>> {
        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {} FROM knowledge_documents \
             WHERE tenant_id = $1 AND embedding IS NOT NULL AND cardinality(embedding) = $2",
            DOCUMENT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(EMBEDDING_DIMENSION as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn full_text_search(
        &self,
        tenant_id: Uuid,
        query: &str,
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>> {
        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {cols} FROM knowledge_documents \
             WHERE tenant_id = $1 \
               AND to_tsvector('{cfg}', content) @@ plainto_tsquery('{cfg}', $2) \
             ORDER BY ts_rank(to_tsvector('{cfg}', content), plainto_tsquery('{cfg}', $2)) DESC \
             LIMIT $3",
            cols = DOCUMENT_COLUMNS,
            cfg = TS_CONFIG
        ))
        .bind(tenant_id)
        .bind(query)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn substring_search(
        &self,
        tenant_id: Uuid,
        needle: &str,
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>> {
        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {} FROM knowledge_documents \
             WHERE tenant_id = $1 AND content ILIKE $2 \
             ORDER BY created_at DESC LIMIT $3",
            DOCUMENT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(contains_pattern(needle))
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn any_substring_search(
        &self,
        tenant_id: Uuid,
        needles: &[String],
        limit: usize,
    ) -> PortResult<Vec<KnowledgeDocument>> {
        if needles.is_empty() {
            return Ok(Vec::new());
        }
        let patterns: Vec<String> = needles.iter().map(|n| contains_pattern(n)).collect();

        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {} FROM knowledge_documents \
             WHERE tenant_id = $1 AND content ILIKE ANY($2) \
             ORDER BY created_at DESC LIMIT $3",
            DOCUMENT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(patterns)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn has_documents(&self, tenant_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM knowledge_documents WHERE tenant_id = $1)",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn list_documents(&self, tenant_id: Uuid) -> PortResult<Vec<KnowledgeDocument>> {
        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {} FROM knowledge_documents WHERE tenant_id = $1 ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_document(&self, document: &KnowledgeDocument) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO knowledge_documents (id, tenant_id, content, embedding, source, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(document.id)
        .bind(document.tenant_id)
        .bind(&document.content)
        .bind(document.usable_embedding().map(<[f32]>::to_vec))
        .bind(&document.source)
        .bind(&document.metadata)
        .bind(document.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn delete_document(&self, tenant_id: Uuid, document_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM knowledge_documents WHERE id = $1 AND tenant_id = $2")
            .bind(document_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Document {} not found", document_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `ConfigStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConfigStore for PgStore {
    async fn get_persona(&self, tenant_id: Uuid) -> PortResult<Option<Persona>> {
        fetch_persona(&self.pool, tenant_id).await
    }

    async fn get_persona_by_id(&self, persona_id: Uuid) -> PortResult<Persona> {
        let record = sqlx::query_as::<_, PersonaRecord>(&format!(
            "SELECT {} FROM personas WHERE id = $1",
            PERSONA_COLUMNS
        ))
        .bind(persona_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Persona {} not found", persona_id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn get_company_info(&self, tenant_id: Uuid) -> PortResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT content FROM company_info WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    /// Hands out a tenant-filtered view of the shared listener. No connection
    /// is taken from the pool; the stream ends when the listener loses its
    /// connection or this subscriber falls behind, and the caller resubscribes.
    async fn subscribe(&self, tenant_id: Uuid) -> PortResult<ConfigChangeStream> {
        if !self.changes.is_running() {
            return Err(PortError::Unexpected(
                "Persona change listener has not been started".to_string(),
            ));
        }
        let mut receiver = self.changes.sender.subscribe();
        debug!(tenant_id = %tenant_id, "Subscribed to persona changes");

        let pool = self.pool.clone();
        let changes = async_stream::stream! {
            loop {
                let payload = match receiver.recv().await {
                    Ok(ListenerEvent::Changed(payload)) => payload,
                    Ok(ListenerEvent::Lost) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(missed)) => {
                        yield Err(PortError::Unexpected(format!(
                            "Missed {} persona notifications",
                            missed
                        )));
                        break;
                    }
                };
                if payload.tenant_id != tenant_id {
                    continue;
                }
                let Some(op) = change_op(&payload.op) else {
                    warn!(op = %payload.op, "Unknown persona change operation ignored");
                    continue;
                };
                debug!(tenant_id = %tenant_id, persona_id = %payload.persona_id, ?op, "Persona change received");

                if op == ChangeOp::Delete {
                    yield Ok(ConfigChange { op, new_value: None });
                    continue;
                }

                // Read the row back; a row deleted in the meantime counts as a delete.
                match fetch_persona(&pool, tenant_id).await {
                    Ok(Some(persona)) => yield Ok(ConfigChange { op, new_value: Some(persona) }),
                    Ok(None) => yield Ok(ConfigChange { op: ChangeOp::Delete, new_value: None }),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(changes))
    }
}

//=========================================================================================
// `TranscriptStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TranscriptStore for PgStore {
    async fn save_turn(&self, session_id: Uuid, tenant_id: Uuid, turn: ChatTurn) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, tenant_id, role, content, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(turn.id)
        .bind(session_id)
        .bind(tenant_id)
        .bind(turn.role.as_str())
        .bind(turn.content)
        .bind(turn.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}
