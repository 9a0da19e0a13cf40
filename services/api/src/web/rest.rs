//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the public widget endpoints, the tenant's
//! knowledge-base endpoints and the master definition for the OpenAPI
//! specification.

use crate::error::ApiError;
use crate::web::protocol::PersonaView;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chatbot_core::domain::{ChatRole, ChatTurn, KnowledgeDocument, ProviderKind};
use chatbot_core::error::PipelineError;
use chatbot_core::ports::{PortError, TranscriptStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        widget_config_handler,
        widget_chat_handler,
        add_document_handler,
        list_documents_handler,
        delete_document_handler,
    ),
    components(
        schemas(
            WidgetConfigResponse,
            PersonaView,
            WidgetChatRequest,
            WidgetChatResponse,
            AddDocumentRequest,
            DocumentView
        )
    ),
    tags(
        (name = "Chatbot Widget API", description = "Public endpoints used by the embeddable chat widget."),
        (name = "Knowledge Base API", description = "Tenant-scoped management of knowledge documents.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// What the widget needs to render itself. Contains no secrets.
#[derive(Serialize, ToSchema)]
pub struct WidgetConfigResponse {
    #[serde(flatten)]
    persona: PersonaView,
    has_knowledge_base: bool,
}

/// One visitor message sent from the widget.
#[derive(Deserialize, ToSchema)]
pub struct WidgetChatRequest {
    message: String,
    /// When present, both turns of the exchange are saved under this id.
    #[serde(default)]
    session_id: Option<Uuid>,
    /// Preferred provider: `openai`, `claude` or `groq`.
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct WidgetChatResponse {
    response: String,
}

/// A new knowledge document. It is embedded before it is stored.
#[derive(Deserialize, ToSchema)]
pub struct AddDocumentRequest {
    content: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    metadata: Option<serde_json::Value>,
}

/// A stored knowledge document. The vector itself is not returned.
#[derive(Serialize, ToSchema)]
pub struct DocumentView {
    id: Uuid,
    content: String,
    source: Option<String>,
    #[schema(value_type = Option<Object>)]
    metadata: Option<serde_json::Value>,
    /// Whether the document can be found by semantic search.
    embedded: bool,
    created_at: DateTime<Utc>,
}

impl From<KnowledgeDocument> for DocumentView {
    fn from(document: KnowledgeDocument) -> Self {
        Self {
            embedded: document.usable_embedding().is_some(),
            id: document.id,
            content: document.content,
            source: document.source,
            metadata: document.metadata,
            created_at: document.created_at,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Fetch the public configuration of a widget.
#[utoipa::path(
    get,
    path = "/api/widget/{widget_id}/config",
    responses(
        (status = 200, description = "Widget configuration", body = WidgetConfigResponse),
        (status = 404, description = "Bot configuration not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("widget_id" = Uuid, Path, description = "The persona id embedded in the widget.")
    )
)]
pub async fn widget_config_handler(
    State(app_state): State<Arc<AppState>>,
    Path(widget_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let result = async {
        let persona = app_state.personas.get_persona_by_id(widget_id).await?;
        let has_knowledge_base = app_state.knowledge.has_documents(persona.tenant_id).await?;
        Ok::<_, ApiError>(WidgetConfigResponse {
            persona: PersonaView::from(&persona),
            has_knowledge_base,
        })
    }
    .await;

    match result {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!(widget_id = %widget_id, "Failed to fetch widget config: {:?}", e);
            Err(e.to_status())
        }
    }
}

/// Send a visitor message and receive the assistant's answer.
#[utoipa::path(
    post,
    path = "/api/widget/{widget_id}/chat",
    request_body = WidgetChatRequest,
    responses(
        (status = 200, description = "The assistant's answer", body = WidgetChatResponse),
        (status = 400, description = "Bad request (e.g., empty message or unknown provider)"),
        (status = 404, description = "Bot configuration not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("widget_id" = Uuid, Path, description = "The persona id embedded in the widget.")
    )
)]
pub async fn widget_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Path(widget_id): Path<Uuid>,
    Json(payload): Json<WidgetChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
    }
    let preferred = parse_provider(payload.provider.as_deref())?;

    let result = async {
        let persona = app_state.personas.get_persona_by_id(widget_id).await?;
        let response = app_state
            .responder
            .generate_response(message, persona.tenant_id, preferred)
            .await?;
        Ok::<_, ApiError>((persona.tenant_id, response))
    }
    .await;

    match result {
        Ok((tenant_id, response)) => {
            info!(widget_id = %widget_id, tenant_id = %tenant_id, "Widget message answered");
            if let Some(session_id) = payload.session_id {
                save_exchange_in_background(
                    app_state.transcripts.clone(),
                    session_id,
                    tenant_id,
                    message.to_string(),
                    response.clone(),
                );
            }
            Ok(Json(WidgetChatResponse { response }))
        }
        Err(e) => {
            error!(widget_id = %widget_id, "Failed to process widget message: {:?}", e);
            Err(e.to_status())
        }
    }
}

/// Add a document to the tenant's knowledge base.
#[utoipa::path(
    post,
    path = "/api/console/documents",
    tag = "Knowledge Base API",
    request_body = AddDocumentRequest,
    responses(
        (status = 201, description = "Document stored", body = DocumentView),
        (status = 400, description = "Empty document content"),
        (status = 401, description = "Missing or invalid tenant header"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "The tenant that owns the knowledge base.")
    )
)]
pub async fn add_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(tenant_id): Extension<Uuid>,
    Json(payload): Json<AddDocumentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state
        .ingestor
        .add(tenant_id, &payload.content, payload.source, payload.metadata)
        .await
    {
        Ok(document) => Ok((StatusCode::CREATED, Json(DocumentView::from(document)))),
        Err(e) => {
            let e = ApiError::from(e);
            error!(tenant_id = %tenant_id, "Failed to add knowledge document: {:?}", e);
            Err(e.to_status())
        }
    }
}

/// List the tenant's knowledge documents, newest first.
#[utoipa::path(
    get,
    path = "/api/console/documents",
    tag = "Knowledge Base API",
    responses(
        (status = 200, description = "The tenant's documents", body = [DocumentView]),
        (status = 401, description = "Missing or invalid tenant header"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "The tenant that owns the knowledge base.")
    )
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(tenant_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.ingestor.list(tenant_id).await {
        Ok(documents) => Ok(Json(
            documents.into_iter().map(DocumentView::from).collect::<Vec<_>>(),
        )),
        Err(e) => {
            let e = ApiError::from(e);
            error!(tenant_id = %tenant_id, "Failed to list knowledge documents: {:?}", e);
            Err(e.to_status())
        }
    }
}

/// Remove one document from the tenant's knowledge base.
#[utoipa::path(
    delete,
    path = "/api/console/documents/{document_id}",
    tag = "Knowledge Base API",
    responses(
        (status = 204, description = "Document removed"),
        (status = 401, description = "Missing or invalid tenant header"),
        (status = 404, description = "Document not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document to remove."),
        ("x-tenant-id" = Uuid, Header, description = "The tenant that owns the knowledge base.")
    )
)]
pub async fn delete_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(tenant_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.ingestor.remove(tenant_id, document_id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(PipelineError::Port(PortError::NotFound(_))) => {
            Err((StatusCode::NOT_FOUND, "Document not found".to_string()))
        }
        Err(e) => {
            let e = ApiError::from(e);
            error!(tenant_id = %tenant_id, document_id = %document_id, "Failed to remove knowledge document: {:?}", e);
            Err(e.to_status())
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Parses an optional provider label. An unknown label is a client error.
pub fn parse_provider(label: Option<&str>) -> Result<Option<ProviderKind>, (StatusCode, String)> {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        None => Ok(None),
        Some(label) => ProviderKind::parse(label).map(Some).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Unknown provider '{}'", label),
            )
        }),
    }
}

/// Saves the user turn and the assistant turn without holding up the response.
pub fn save_exchange_in_background(
    transcripts: Arc<dyn TranscriptStore>,
    session_id: Uuid,
    tenant_id: Uuid,
    user_text: String,
    reply: String,
) {
    tokio::spawn(async move {
        let turns = [
            ChatTurn::new(ChatRole::User, user_text),
            ChatTurn::new(ChatRole::Assistant, reply),
        ];
        for turn in turns {
            if let Err(e) = transcripts.save_turn(session_id, tenant_id, turn).await {
                warn!(session_id = %session_id, "Failed to save chat turn: {:?}", e);
                return;
            }
        }
    });
}
