//! services/api/src/web/ws_handler.rs
//!
//! The test console's WebSocket connection. Each connection is bound to one
//! tenant; user messages are answered through the response pipeline and
//! persona edits made in the dashboard are pushed to the console as they land.

use crate::error::ApiError;
use crate::web::{
    protocol::{ClientMessage, PersonaView, ServerMessage},
    rest::{parse_provider, save_exchange_in_background},
    state::{AppState, ConsoleSession},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use chatbot_core::domain::PersonaEvent;
use chatbot_core::error::PipelineError;
use chatbot_core::responder::opening_message;
use chatbot_core::PersonaListener;
use futures::{
    stream::{SplitSink, SplitStream, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn console_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(tenant_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, tenant_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, tenant_id: Uuid) {
    info!(tenant_id = %tenant_id, "New console connection established");
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Initialization Phase ---
    let Some((mut session, mut listener)) =
        initialize(&app_state, tenant_id, &mut sender, &mut receiver).await
    else {
        return;
    };

    // --- 2. Main Message Loop ---
    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text_message(text.as_str(), &app_state, &mut session, &mut sender).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client sent close message.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(tenant_id = %tenant_id, "Console socket error: {}", e);
                        break;
                    }
                    None => {
                        info!("Client disconnected.");
                        break;
                    }
                }
            }
            event = listener.next() => {
                let message = match event {
                    Some(PersonaEvent::Updated(persona)) => ServerMessage::PersonaUpdated {
                        persona: PersonaView::from(&persona),
                    },
                    Some(PersonaEvent::Cleared) => ServerMessage::PersonaCleared,
                    None => {
                        warn!(tenant_id = %tenant_id, "Persona feed closed, ending console session");
                        break;
                    }
                };
                if !send(&mut sender, &message).await {
                    break;
                }
            }
        }
    }

    // --- 3. Cleanup ---
    info!(tenant_id = %tenant_id, turns = session.turns, "Console connection closed.");
}

/// Waits for `Init`, then replies with `SessionReady`. `None` ends the connection.
async fn initialize(
    app_state: &Arc<AppState>,
    tenant_id: Uuid,
    sender: &mut WsSender,
    receiver: &mut SplitStream<WebSocket>,
) -> Option<(ConsoleSession, PersonaListener)> {
    let session_id = match receiver.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Init { session_id }) => session_id,
            _ => {
                error!("First message was not a valid Init message.");
                send_error(sender, "The first message must be an init message.").await;
                return None;
            }
        },
        _ => {
            error!("Client disconnected before sending Init message.");
            return None;
        }
    };

    // Subscribe before reading so no edit slips between the read and the push.
    let listener = match app_state.live_config.subscribe(tenant_id).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(tenant_id = %tenant_id, "Failed to subscribe to persona changes: {:?}", e);
            send_error(sender, "Failed to load the bot configuration.").await;
            return None;
        }
    };

    let persona = match app_state.live_config.current(tenant_id).await {
        Ok(Some(persona)) => persona,
        Ok(None) => {
            send_error(sender, "No bot configuration exists for this account yet.").await;
            return None;
        }
        Err(e) => {
            error!(tenant_id = %tenant_id, "Failed to load persona: {:?}", e);
            send_error(sender, "Failed to load the bot configuration.").await;
            return None;
        }
    };

    let ready = ServerMessage::SessionReady {
        session_id,
        persona: PersonaView::from(&persona),
        opening_message: opening_message(&persona).to_string(),
    };
    if !send(sender, &ready).await {
        return None;
    }
    info!(tenant_id = %tenant_id, ?session_id, "Console session ready");
    Some((ConsoleSession::new(tenant_id, session_id), listener))
}

/// Handles one client text frame. Returns `false` once the socket is unusable.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    session: &mut ConsoleSession,
    sender: &mut WsSender,
) -> bool {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::UserMessage { text, provider }) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                return send_error(sender, "Message must not be empty.").await;
            }
            let preferred = match parse_provider(provider.as_deref()) {
                Ok(preferred) => preferred,
                Err((_, message)) => return send_error(sender, &message).await,
            };

            match app_state
                .responder
                .generate_response(&text, session.tenant_id, preferred)
                .await
            {
                Ok(reply) => {
                    session.turns += 1;
                    if let Some(session_id) = session.session_id {
                        save_exchange_in_background(
                            app_state.transcripts.clone(),
                            session_id,
                            session.tenant_id,
                            text,
                            reply.clone(),
                        );
                    }
                    send(sender, &ServerMessage::AssistantMessage { text: reply }).await
                }
                Err(e) => {
                    let message = turn_failure_message(session.tenant_id, e);
                    send_error(sender, &message).await
                }
            }
        }
        Ok(ClientMessage::Init { .. }) => {
            warn!("Received subsequent Init message, which is ignored.");
            true
        }
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            send_error(sender, "Unrecognised message.").await
        }
    }
}

/// Logs a failed turn and returns the client-safe text for it.
fn turn_failure_message(tenant_id: Uuid, error: PipelineError) -> String {
    let error = ApiError::from(error);
    error!(tenant_id = %tenant_id, "Failed to generate response: {:?}", error);
    error.to_status().1
}

async fn send_error(sender: &mut WsSender, message: &str) -> bool {
    send(
        sender,
        &ServerMessage::Error {
            message: message.to_string(),
        },
    )
    .await
}

/// Serializes and sends one message. Returns `false` if the client is gone.
async fn send(sender: &mut WsSender, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    if sender.send(Message::Text(json.into())).await.is_err() {
        error!("Failed to send message to console client.");
        return false;
    }
    true
}
