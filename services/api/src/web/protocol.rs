//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the test console in the
//! dashboard and the API server.

use chatbot_core::domain::Persona;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens a console session. This must be the first message sent on the connection.
    /// With a `session_id` the conversation is saved as a transcript.
    Init {
        #[serde(default)]
        session_id: Option<Uuid>,
    },

    /// One user utterance, optionally asking for a specific provider.
    UserMessage {
        text: String,
        #[serde(default)]
        provider: Option<String>,
    },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session and carries the opening message.
    SessionReady {
        session_id: Option<Uuid>,
        persona: PersonaView,
        opening_message: String,
    },

    /// The assistant's answer to the last user message.
    AssistantMessage { text: String },

    /// The persona was edited; later answers use the new settings.
    PersonaUpdated { persona: PersonaView },

    /// The persona was deleted; the console can no longer answer.
    PersonaCleared,

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

/// The public face of a persona. Instructions and background text stay server-side.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct PersonaView {
    pub id: Uuid,
    pub name: String,
    pub tone: String,
    pub accent_color: String,
    pub welcome_message: String,
    pub first_message: Option<String>,
}

impl From<&Persona> for PersonaView {
    fn from(persona: &Persona) -> Self {
        Self {
            id: persona.id,
            name: persona.name.clone(),
            tone: persona.tone.as_str().to_string(),
            accent_color: persona.accent_color.clone(),
            welcome_message: persona.welcome_message.clone(),
            first_message: persona.first_message.clone(),
        }
    }
}
