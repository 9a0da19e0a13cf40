//! crates/chatbot_core/src/retrieval.rs
//!
//! Multi-strategy knowledge search with graceful degradation.
//!
//! Strategies run one at a time in a fixed order and the first non-empty result
//! set wins. The vector strategy is best-effort: when the tenant has no embedding
//! credential, or embedding fails, the retriever falls through to text search.
//! An empty result is a valid outcome, not an error.

use crate::domain::{KnowledgeDocument, SearchResult, EMBEDDING_DIMENSION};
use crate::embedding::EmbeddingClient;
use crate::error::PipelineResult;
use crate::ports::KnowledgeStore;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    pub limit: usize,
    pub similarity_threshold: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// The search strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Vector,
    FullText,
    PartialMatch,
    KeywordAny,
}

impl SearchStrategy {
    pub const ORDER: [SearchStrategy; 4] = [
        SearchStrategy::Vector,
        SearchStrategy::FullText,
        SearchStrategy::PartialMatch,
        SearchStrategy::KeywordAny,
    ];
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchStrategy::Vector => "vector",
            SearchStrategy::FullText => "full_text",
            SearchStrategy::PartialMatch => "partial_match",
            SearchStrategy::KeywordAny => "keyword_any",
        };
        f.write_str(name)
    }
}

/// Search results together with the strategy that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub strategy: Option<SearchStrategy>,
    pub results: Vec<SearchResult>,
}

#[derive(Clone)]
pub struct KnowledgeRetriever {
    store: Arc<dyn KnowledgeStore>,
    embeddings: Option<EmbeddingClient>,
}

impl KnowledgeRetriever {
    /// `embeddings` is optional; without it only the text strategies run.
    pub fn new(store: Arc<dyn KnowledgeStore>, embeddings: Option<EmbeddingClient>) -> Self {
        Self { store, embeddings }
    }

    /// Retrieves with the default limit of 5 and threshold of 0.7.
    pub async fn retrieve(&self, query: &str, tenant_id: Uuid) -> PipelineResult<Vec<SearchResult>> {
        Ok(self
            .retrieve_with(query, tenant_id, RetrievalOptions::default())
            .await?
            .results)
    }

    pub async fn retrieve_with(
        &self,
        query: &str,
        tenant_id: Uuid,
        options: RetrievalOptions,
    ) -> PipelineResult<Retrieved> {
        let query = query.trim();
        if query.is_empty() || options.limit == 0 {
            return Ok(Retrieved {
                strategy: None,
                results: Vec::new(),
            });
        }

        for strategy in SearchStrategy::ORDER {
            let results = self.run(strategy, query, tenant_id, options).await?;
            if !results.is_empty() {
                info!(
                    tenant_id = %tenant_id,
                    strategy = %strategy,
                    hits = results.len(),
                    "Knowledge search matched"
                );
                return Ok(Retrieved {
                    strategy: Some(strategy),
                    results,
                });
            }
            debug!(tenant_id = %tenant_id, strategy = %strategy, "No hits, trying next strategy");
        }

        Ok(Retrieved {
            strategy: None,
            results: Vec::new(),
        })
    }

    async fn run(
        &self,
        strategy: SearchStrategy,
        query: &str,
        tenant_id: Uuid,
        options: RetrievalOptions,
    ) -> PipelineResult<Vec<SearchResult>> {
        let docs = match strategy {
            SearchStrategy::Vector => return Ok(self.vector_search(query, tenant_id, options).await),
            SearchStrategy::FullText => {
                self.store
                    .full_text_search(tenant_id, query, options.limit)
                    .await?
            }
            SearchStrategy::PartialMatch => {
                self.store
                    .substring_search(tenant_id, query, options.limit)
                    .await?
            }
            SearchStrategy::KeywordAny => {
                let tokens = keyword_tokens(query);
                if tokens.is_empty() {
                    return Ok(Vec::new());
                }
                self.store
                    .any_substring_search(tenant_id, &tokens, options.limit)
                    .await?
            }
        };

        Ok(docs
            .into_iter()
            .take(options.limit)
            .map(SearchResult::from)
            .collect())
    }

    /// Best-effort: every failure in here degrades to "no results".
    async fn vector_search(
        &self,
        query: &str,
        tenant_id: Uuid,
        options: RetrievalOptions,
    ) -> Vec<SearchResult> {
        let Some(client) = &self.embeddings else {
            return Vec::new();
        };

        let query_vector = match client.embed(tenant_id, query).await {
            Ok(v) => v,
            Err(e) => {
                debug!(tenant_id = %tenant_id, "Vector search skipped: {}", e);
                return Vec::new();
            }
        };

        let documents = match self.store.embedded_documents(tenant_id).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(tenant_id = %tenant_id, "Could not load embedded documents: {}", e);
                return Vec::new();
            }
        };

        rank_by_similarity(&query_vector, documents, options)
    }
}

/// Scores every document with a usable embedding against `query`, keeps the
/// ones strictly above the threshold, best first.
pub fn rank_by_similarity(
    query: &[f32],
    documents: Vec<KnowledgeDocument>,
    options: RetrievalOptions,
) -> Vec<SearchResult> {
    if query.len() != EMBEDDING_DIMENSION {
        return Vec::new();
    }

    let mut scored: Vec<(f32, KnowledgeDocument)> = documents
        .into_iter()
        .filter_map(|doc| {
            let score = cosine_similarity(query, doc.usable_embedding()?)?;
            (score > options.similarity_threshold).then_some((score, doc))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(options.limit);

    scored
        .into_iter()
        .map(|(score, doc)| SearchResult {
            similarity: Some(score),
            ..SearchResult::from(doc)
        })
        .collect()
}

/// Cosine similarity of two equal-length vectors. `None` when the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Lowercased whitespace-delimited tokens, duplicates removed, order kept.
pub fn keyword_tokens(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in query.split_whitespace() {
        let token = token.to_lowercase();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc_with(embedding: Option<Vec<f32>>, content: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            content: content.to_string(),
            embedding,
            source: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIMENSION];
        v[i] = 1.0;
        v
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        let score = cosine_similarity(&v, &v).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_rejects_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
    }

    #[test]
    fn ranking_filters_sorts_and_truncates() {
        let query = axis(0);
        let mut close = axis(0);
        close[1] = 0.2;
        let mut closer = axis(0);
        closer[1] = 0.05;
        let docs = vec![
            doc_with(Some(close), "close"),
            doc_with(Some(axis(1)), "orthogonal"),
            doc_with(Some(closer), "closer"),
            doc_with(Some(vec![1.0; 3]), "wrong dimension"),
            doc_with(None, "no embedding"),
        ];

        let ranked = rank_by_similarity(&query, docs.clone(), RetrievalOptions::default());
        let contents: Vec<&str> = ranked.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["closer", "close"]);
        assert!(ranked.iter().all(|r| r.similarity.unwrap() > 0.7));

        let one = rank_by_similarity(
            &query,
            docs,
            RetrievalOptions {
                limit: 1,
                ..RetrievalOptions::default()
            },
        );
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].content, "closer");
    }

    #[test]
    fn threshold_is_exclusive() {
        let query = axis(0);
        let docs = vec![doc_with(Some(axis(0)), "exact")];
        let ranked = rank_by_similarity(
            &query,
            docs,
            RetrievalOptions {
                limit: 5,
                similarity_threshold: 1.0,
            },
        );
        assert!(ranked.is_empty());
    }

    #[test]
    fn keyword_tokens_lowercase_and_dedupe() {
        assert_eq!(
            keyword_tokens("  Opening Hours  opening\tprices "),
            vec!["opening", "hours", "prices"]
        );
        assert!(keyword_tokens("   ").is_empty());
    }
}
