//! services/api/src/adapters/openai_embedding.rs
//!
//! Implements the `EmbeddingProvider` port with the OpenAI embeddings endpoint.

use crate::adapters::openai_chat::single_attempt_client;
use async_openai::{config::OpenAIConfig, error::OpenAIError, types::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use chatbot_core::domain::{Credential, ProviderKind};
use chatbot_core::ports::{EmbeddingProvider, PortError, PortResult};

#[derive(Clone, Debug)]
pub struct OpenAiEmbeddingAdapter {
    http: reqwest::Client,
    model: String,
}

impl OpenAiEmbeddingAdapter {
    pub fn new(http: reqwest::Client, model: String) -> Self {
        Self { http, model }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn embed(&self, text: &str, credential: &Credential) -> PortResult<Vec<f32>> {
        let client = single_attempt_client(
            &self.http,
            OpenAIConfig::new().with_api_key(credential.secret.expose()),
        );

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(vec![text.to_string()])
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = client
            .embeddings()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // The length is checked by the caller.
        response
            .data
            .into_iter()
            .next()
            .map(|embedding| embedding.embedding)
            .ok_or_else(|| PortError::Unexpected("Embedding response was empty".to_string()))
    }
}
