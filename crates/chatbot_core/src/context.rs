//! crates/chatbot_core/src/context.rs
//!
//! Builds the context block handed to the prompt builder.

use crate::domain::SearchResult;
use std::fmt::Write;
use tracing::warn;

pub const COMPANY_INFO_HEADING: &str = "COMPANY INFORMATION:";
pub const KNOWLEDGE_BASE_HEADING: &str = "RELEVANT INFORMATION FROM KNOWLEDGE BASE:";
pub const ADDITIONAL_INFO_HEADING: &str = "ADDITIONAL COMPANY INFO:";

/// Merges tenant-level company text, retrieved snippets and the persona's own
/// background text into one block. Empty sections are left out entirely.
///
/// The persona background is dropped when it repeats the company text
/// verbatim, and the repeat is logged. No size cap is applied; retrieval
/// already limits the snippets.
pub fn assemble_context(
    tenant_background: Option<&str>,
    persona_background: Option<&str>,
    results: &[SearchResult],
) -> String {
    let company = non_empty(tenant_background);
    let additional = non_empty(persona_background);
    let mut sections: Vec<String> = Vec::with_capacity(3);

    if let Some(info) = company {
        sections.push(format!("{}\n{}", COMPANY_INFO_HEADING, info));
    }

    let snippets: Vec<&SearchResult> = results
        .iter()
        .filter(|r| !r.content.trim().is_empty())
        .collect();
    if !snippets.is_empty() {
        let mut block = String::from(KNOWLEDGE_BASE_HEADING);
        for (index, result) in snippets.iter().enumerate() {
            let _ = write!(block, "\n{}. {}", index + 1, result.content.trim());
            if let Some(similarity) = result.similarity {
                let _ = write!(block, " (relevance: {}%)", relevance_percent(similarity));
            }
        }
        sections.push(block);
    }

    if let Some(info) = additional {
        if company == Some(info) {
            warn!("Persona background repeats the company information verbatim, omitting it");
        } else {
            sections.push(format!("{}\n{}", ADDITIONAL_INFO_HEADING, info));
        }
    }

    sections.join("\n\n")
}

/// Similarity as a rounded whole percentage.
pub fn relevance_percent(similarity: f32) -> i64 {
    (similarity * 100.0).round() as i64
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}
