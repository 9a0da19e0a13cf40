//! crates/chatbot_core/src/router.rs
//!
//! Chooses a provider/credential pair for a tenant and invokes it.
//!
//! Precedence between credentials is recency: the most recently created active
//! credential of a kind is the one used, and without an explicit preference the
//! kind whose newest credential is most recent wins. A runtime failure of the
//! selected provider is returned to the caller; there is no failover to the
//! next candidate.

use crate::domain::{Credential, ProviderKind};
use crate::embedding::newest_active;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{ChatProvider, ChatRequest, CredentialStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The provider and credential chosen for one call.
#[derive(Debug, Clone)]
pub struct Selection {
    pub provider: ProviderKind,
    pub credential: Credential,
}

/// The text returned by a provider, tagged with who produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub provider: ProviderKind,
}

#[derive(Clone)]
pub struct ProviderRouter {
    credentials: Arc<dyn CredentialStore>,
    providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
}

impl ProviderRouter {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        providers: impl IntoIterator<Item = Arc<dyn ChatProvider>>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.kind(), p))
            .collect::<HashMap<_, _>>();
        Self {
            credentials,
            providers,
        }
    }

    pub fn registered(&self) -> Vec<ProviderKind> {
        ProviderKind::DEFAULT_ORDER
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }

    /// Picks the provider/credential pair for `tenant_id`.
    pub async fn select(
        &self,
        tenant_id: Uuid,
        preferred: Option<ProviderKind>,
    ) -> PipelineResult<Selection> {
        let mut newest: Vec<Credential> = Vec::new();
        for kind in self.registered() {
            if let Some(credential) =
                newest_active(self.credentials.list_active(tenant_id, kind).await)?
            {
                newest.push(credential);
            }
        }

        let selection = order_candidates(newest, preferred)
            .into_iter()
            .next()
            .map(|credential| Selection {
                provider: credential.provider,
                credential,
            })
            .ok_or(PipelineError::NoActiveCredential)?;

        if let Some(p) = preferred.filter(|p| *p != selection.provider) {
            debug!(tenant_id = %tenant_id, preferred = %p, "Preferred provider has no usable credential");
        }
        Ok(selection)
    }

    /// Selects a provider and runs one chat completion.
    pub async fn respond(
        &self,
        tenant_id: Uuid,
        system_prompt: &str,
        utterance: &str,
        preferred: Option<ProviderKind>,
    ) -> PipelineResult<Reply> {
        let selection = self.select(tenant_id, preferred).await?;
        let provider = self
            .providers
            .get(&selection.provider)
            .ok_or(PipelineError::NoActiveCredential)?;

        let request = ChatRequest::new(system_prompt, utterance);
        let started = Instant::now();
        let text = provider
            .complete_chat(&request, &selection.credential)
            .await
            .map_err(|e| {
                warn!(tenant_id = %tenant_id, provider = %selection.provider, "Provider call failed: {}", e);
                PipelineError::ProviderCallFailed {
                    provider: selection.provider,
                    message: e.to_string(),
                }
            })?;

        info!(
            tenant_id = %tenant_id,
            provider = %selection.provider,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Provider call completed"
        );
        Ok(Reply {
            text,
            provider: selection.provider,
        })
    }
}

/// Orders one-per-kind candidates: the preferred kind first, the rest newest
/// first, ties broken by the default kind order.
fn order_candidates(
    mut candidates: Vec<Credential>,
    preferred: Option<ProviderKind>,
) -> Vec<Credential> {
    let rank = |kind: ProviderKind| {
        ProviderKind::DEFAULT_ORDER
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(usize::MAX)
    };
    candidates.sort_by(|a, b| {
        let a_pref = Some(a.provider) == preferred;
        let b_pref = Some(b.provider) == preferred;
        b_pref
            .cmp(&a_pref)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| rank(a.provider).cmp(&rank(b.provider)))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Secret;
    use chrono::{DateTime, Duration, Utc};

    fn credential(kind: ProviderKind, created_at: DateTime<Utc>) -> Credential {
        Credential {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            provider: kind,
            secret: Secret::new("k"),
            active: true,
            created_at,
        }
    }

    fn kinds(creds: &[Credential]) -> Vec<ProviderKind> {
        creds.iter().map(|c| c.provider).collect()
    }

    #[test]
    fn newest_credential_wins_without_preference() {
        let t1 = Utc::now() - Duration::minutes(10);
        let t2 = Utc::now();
        let ordered = order_candidates(
            vec![
                credential(ProviderKind::OpenAi, t1),
                credential(ProviderKind::Claude, t2),
            ],
            None,
        );
        assert_eq!(kinds(&ordered), vec![ProviderKind::Claude, ProviderKind::OpenAi]);
    }

    #[test]
    fn preference_goes_first_then_recency() {
        let now = Utc::now();
        let ordered = order_candidates(
            vec![
                credential(ProviderKind::OpenAi, now - Duration::minutes(5)),
                credential(ProviderKind::Claude, now),
                credential(ProviderKind::Groq, now - Duration::minutes(1)),
            ],
            Some(ProviderKind::OpenAi),
        );
        assert_eq!(
            kinds(&ordered),
            vec![ProviderKind::OpenAi, ProviderKind::Claude, ProviderKind::Groq]
        );
    }

    #[test]
    fn ties_fall_back_to_default_order() {
        let now = Utc::now();
        let ordered = order_candidates(
            vec![
                credential(ProviderKind::Groq, now),
                credential(ProviderKind::OpenAi, now),
                credential(ProviderKind::Claude, now),
            ],
            None,
        );
        assert_eq!(kinds(&ordered), ProviderKind::DEFAULT_ORDER.to_vec());
    }
}
