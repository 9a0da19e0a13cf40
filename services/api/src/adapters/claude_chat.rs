//! services/api/src/adapters/claude_chat.rs
//!
//! Chat completions over Anthropic's Messages API, called directly with `reqwest`.

use async_trait::async_trait;
use chatbot_core::domain::{Credential, ProviderKind};
use chatbot_core::ports::{ChatProvider, ChatRequest, PortError, PortResult};
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatProvider` for Claude models.
#[derive(Clone)]
pub struct ClaudeChatAdapter {
    http: reqwest::Client,
    model: String,
    api_base: String,
}

impl ClaudeChatAdapter {
    pub fn new(http: reqwest::Client, model: String, api_base: String) -> Self {
        Self {
            http,
            model,
            api_base,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_base.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, request: &'a ChatRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system_prompt,
            messages: vec![Message {
                role: "user",
                content: &request.user_text,
            }],
        }
    }
}

/// Concatenates the text blocks of a reply. No text at all counts as a failed call.
fn reply_text(response: MessagesResponse) -> PortResult<String> {
    let text = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(PortError::Unexpected("Claude reply contained no text".to_string()));
    }
    Ok(text.to_string())
}

//=========================================================================================
// `ChatProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatProvider for ClaudeChatAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn complete_chat(&self, request: &ChatRequest, credential: &Credential) -> PortResult<String> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", credential.secret.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PortError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Claude API error ({}): {}",
                status, body
            )));
        }

        let parsed = response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        reply_text(parsed)
    }
}
