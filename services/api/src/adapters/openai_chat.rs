//! services/api/src/adapters/openai_chat.rs
//!
//! Chat completions over the OpenAI API. Groq exposes the same API under a
//! different base URL, so one adapter serves both provider kinds.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chatbot_core::domain::{Credential, ProviderKind};
use chatbot_core::ports::{ChatProvider, ChatRequest, PortError, PortResult};
use std::time::Duration;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatProvider` for an OpenAI-compatible endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiChatAdapter {
    http: reqwest::Client,
    kind: ProviderKind,
    model: String,
    api_base: Option<String>,
}

impl OpenAiChatAdapter {
    /// The OpenAI API itself.
    pub fn openai(http: reqwest::Client, model: String) -> Self {
        Self {
            http,
            kind: ProviderKind::OpenAi,
            model,
            api_base: None,
        }
    }

    /// Groq's OpenAI-compatible API at `api_base`.
    pub fn groq(http: reqwest::Client, model: String, api_base: String) -> Self {
        Self {
            http,
            kind: ProviderKind::Groq,
            model,
            api_base: Some(api_base),
        }
    }

    fn client(&self, credential: &Credential) -> Client<OpenAIConfig> {
        let mut config = OpenAIConfig::new().with_api_key(credential.secret.expose());
        if let Some(base) = &self.api_base {
            config = config.with_api_base(base);
        }
        single_attempt_client(&self.http, config)
    }

    fn build_request(&self, request: &ChatRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_prompt.as_str())
            .build()?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user_text.as_str())
            .build()?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![system.into(), user.into()])
            .max_completion_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
    }
}

/// Credentials are per tenant, so a client is built for every call over the
/// shared connection pool. Failed calls are never retried.
pub(crate) fn single_attempt_client(
    http: &reqwest::Client,
    config: OpenAIConfig,
) -> Client<OpenAIConfig> {
    let no_retries = ExponentialBackoff {
        max_elapsed_time: Some(Duration::ZERO),
        ..ExponentialBackoff::default()
    };
    Client::with_config(config)
        .with_http_client(http.clone())
        .with_backoff(no_retries)
}

/// The first choice's text. An empty completion counts as a failed call.
fn first_choice_text(response: CreateChatCompletionResponse) -> PortResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| PortError::Unexpected("Completion contained no text".to_string()))
}

//=========================================================================================
// `ChatProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatProvider for OpenAiChatAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete_chat(&self, request: &ChatRequest, credential: &Credential) -> PortResult<String> {
        let body = self
            .build_request(request)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client(credential)
            .chat()
            .create(body)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        first_choice_text(response)
    }
}
