//! crates/chatbot_core/src/responder.rs
//!
//! The response-generation entry point used by the widget backend and the test
//! console. Wires retrieval, context assembly, prompt building and provider
//! routing together and turns provider-side failures into an apology the end
//! user can read.

use crate::context::assemble_context;
use crate::domain::{Persona, ProviderKind, Tone};
use crate::error::{PipelineError, PipelineResult};
use crate::live_config::LiveConfigPropagator;
use crate::ports::ConfigStore;
use crate::prompt::PromptBuilder;
use crate::retrieval::KnowledgeRetriever;
use crate::router::ProviderRouter;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Why the assistant could not answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApologyKind {
    /// The tenant has not configured any usable AI credential.
    NoCredentials,
    /// The provider call failed; trying again later may work.
    Transient,
}

/// Canned reply shown instead of a raw error.
pub fn apology(tone: Tone, kind: ApologyKind) -> &'static str {
    match (kind, tone) {
        (ApologyKind::NoCredentials, Tone::Friendly) => {
            "Sorry! I can't answer right now because no AI credentials are configured for this assistant yet."
        }
        (ApologyKind::NoCredentials, Tone::Professional) => {
            "I apologize, but I cannot respond at the moment because no AI credentials have been configured for this assistant."
        }
        (ApologyKind::NoCredentials, Tone::Casual) => {
            "Oops, I can't chat yet. Nobody has set up AI credentials for me."
        }
        (ApologyKind::NoCredentials, Tone::Formal) => {
            "We regret that no response can be provided, as no AI credentials have been configured for this service."
        }
        (ApologyKind::Transient, Tone::Friendly) => {
            "Sorry, I couldn't process your request right now. Please try again in a moment!"
        }
        (ApologyKind::Transient, Tone::Professional) => {
            "I apologize, but I was unable to process your request at this time. Please try again later."
        }
        (ApologyKind::Transient, Tone::Casual) => {
            "Hmm, something went wrong on my end. Mind trying again in a bit?"
        }
        (ApologyKind::Transient, Tone::Formal) => {
            "We regret that your request could not be processed at this time. Kindly try again later."
        }
    }
}

#[derive(Clone)]
pub struct ResponseGenerator {
    config: Arc<LiveConfigPropagator>,
    config_store: Arc<dyn ConfigStore>,
    retriever: KnowledgeRetriever,
    prompts: PromptBuilder,
    router: ProviderRouter,
}

impl ResponseGenerator {
    pub fn new(
        config: Arc<LiveConfigPropagator>,
        config_store: Arc<dyn ConfigStore>,
        retriever: KnowledgeRetriever,
        prompts: PromptBuilder,
        router: ProviderRouter,
    ) -> Self {
        Self {
            config,
            config_store,
            retriever,
            prompts,
            router,
        }
    }

    /// Answers one utterance for a tenant.
    ///
    /// Missing credentials and provider failures come back as `Ok` with a
    /// tone-appropriate apology. Store and configuration errors propagate.
    pub async fn generate_response(
        &self,
        utterance: &str,
        tenant_id: Uuid,
        preferred: Option<ProviderKind>,
    ) -> PipelineResult<String> {
        let persona = self
            .config
            .current(tenant_id)
            .await?
            .ok_or(PipelineError::PersonaNotConfigured(tenant_id))?;

        match self.answer(utterance, &persona, preferred).await {
            Ok(text) => Ok(text),
            Err(PipelineError::NoActiveCredential) => {
                warn!(tenant_id = %tenant_id, "No AI credentials configured, sending apology");
                Ok(apology(persona.tone, ApologyKind::NoCredentials).to_string())
            }
            Err(PipelineError::ProviderCallFailed { provider, message }) => {
                error!(tenant_id = %tenant_id, provider = %provider, "Provider failed: {}", message);
                Ok(apology(persona.tone, ApologyKind::Transient).to_string())
            }
            Err(other) => Err(other),
        }
    }

    /// The opening message a new chat session shows.
    pub async fn welcome(&self, tenant_id: Uuid) -> PipelineResult<String> {
        let persona = self
            .config
            .current(tenant_id)
            .await?
            .ok_or(PipelineError::PersonaNotConfigured(tenant_id))?;
        Ok(opening_message(&persona).to_string())
    }

    async fn answer(
        &self,
        utterance: &str,
        persona: &Persona,
        preferred: Option<ProviderKind>,
    ) -> PipelineResult<String> {
        let tenant_id = persona.tenant_id;
        let results = self.retriever.retrieve(utterance, tenant_id).await?;
        let company_info = self.config_store.get_company_info(tenant_id).await?;
        let context = assemble_context(
            company_info.as_deref(),
            persona.background_info.as_deref(),
            &results,
        );
        let system_prompt = self.prompts.build(persona, &context);

        let reply = self
            .router
            .respond(tenant_id, &system_prompt, utterance, preferred)
            .await?;
        info!(
            tenant_id = %tenant_id,
            provider = %reply.provider,
            snippets = results.len(),
            "Generated response"
        );
        Ok(reply.text)
    }
}

/// First message if set, otherwise the welcome message.
pub fn opening_message(persona: &Persona) -> &str {
    persona
        .first_message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(persona.welcome_message.as_str())
}
