//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{ClaudeChatAdapter, OpenAiChatAdapter, OpenAiEmbeddingAdapter, PgStore},
    config::Config,
    error::ApiError,
    web::{
        add_document_handler, console_ws_handler, delete_document_handler,
        list_documents_handler, middleware::TENANT_HEADER, require_tenant, rest::ApiDoc,
        state::AppState, widget_chat_handler, widget_config_handler,
    },
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use chatbot_core::ports::ChatProvider;
use chatbot_core::{
    EmbeddingClient, KnowledgeIngestor, KnowledgeRetriever, LiveConfigPropagator, PromptBuilder,
    ProviderRouter, ResponseGenerator,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");
    let change_listener = store.listen_for_changes().await?;

    // --- 3. Initialize Provider Adapters ---
    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;
    let providers: Vec<Arc<dyn ChatProvider>> = vec![
        Arc::new(OpenAiChatAdapter::openai(
            http.clone(),
            config.chat_model_openai.clone(),
        )),
        Arc::new(ClaudeChatAdapter::new(
            http.clone(),
            config.chat_model_claude.clone(),
            config.claude_api_base.clone(),
        )),
        Arc::new(OpenAiChatAdapter::groq(
            http.clone(),
            config.chat_model_groq.clone(),
            config.groq_api_base.clone(),
        )),
    ];
    let embeddings = EmbeddingClient::new(
        store.clone(),
        Arc::new(OpenAiEmbeddingAdapter::new(
            http,
            config.embedding_model.clone(),
        )),
    );

    // --- 4. Build the Response Pipeline ---
    let live_config = Arc::new(LiveConfigPropagator::with_reconnect_delay(
        store.clone(),
        config.config_reconnect_delay,
    ));
    let responder = ResponseGenerator::new(
        live_config.clone(),
        store.clone(),
        KnowledgeRetriever::new(store.clone(), Some(embeddings.clone())),
        PromptBuilder::new(config.response_language.clone()),
        ProviderRouter::new(store.clone(), providers),
    );

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        responder,
        ingestor: KnowledgeIngestor::new(store.clone(), Some(embeddings)),
        live_config: live_config.clone(),
        personas: store.clone(),
        knowledge: store.clone(),
        transcripts: store,
    });

    // --- 6. Create the Web Router ---
    let cors = build_cors(&config.allowed_origins);

    // Public routes used by the embedded widget.
    let widget_routes = Router::new()
        .route("/api/widget/{widget_id}/config", get(widget_config_handler))
        .route("/api/widget/{widget_id}/chat", post(widget_chat_handler));

    // Dashboard routes, bound to one tenant.
    let console_routes = Router::new()
        .route("/api/console/ws", get(console_ws_handler))
        .route(
            "/api/console/documents",
            get(list_documents_handler).post(add_document_handler),
        )
        .route(
            "/api/console/documents/{document_id}",
            delete(delete_document_handler),
        )
        .layer(axum_middleware::from_fn(require_tenant));

    let api_router = Router::new()
        .merge(widget_routes)
        .merge(console_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    live_config.shutdown();
    change_listener.abort();
    info!("Server stopped.");
    Ok(())
}

/// Any origin when none are configured, otherwise exactly the configured ones.
fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static(TENANT_HEADER)]);

    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid origin in ALLOWED_ORIGINS: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}
