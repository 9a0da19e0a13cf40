//! crates/chatbot_core/src/prompt.rs
//!
//! Renders the system prompt for a persona. The output depends only on the
//! persona fields, the context block and the configured response language.

use crate::domain::{Persona, Tone};

pub const DEFAULT_RESPONSE_LANGUAGE: &str = "English";

const FRIENDLY: &str =
    "Friendly and welcoming. Use a warm, personal tone with approachable phrasing.";
const PROFESSIONAL: &str =
    "Professional and factual. Keep a formal but helpful tone and focus on the facts.";
const CASUAL: &str = "Relaxed and informal. Talk like a friend in a conversational way.";
const FORMAL: &str =
    "Strictly formal and correct. Use a traditional business register and professional language.";

/// Fixed description of each tone.
pub fn tone_description(tone: Tone) -> &'static str {
    match tone {
        Tone::Friendly => FRIENDLY,
        Tone::Professional => PROFESSIONAL,
        Tone::Casual => CASUAL,
        Tone::Formal => FORMAL,
    }
}

/// Description for a raw tone label; unknown labels get the friendly text.
pub fn tone_description_for(label: &str) -> &'static str {
    tone_description(Tone::from_label(label))
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_LANGUAGE)
    }
}

impl PromptBuilder {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    pub fn build(&self, persona: &Persona, context: &str) -> String {
        let mut prompt = format!(
            "You are {name}, a professional AI assistant with:\n\n\
             MAIN INSTRUCTION: {instruction}\n\n\
             TONE AND PERSONALITY: {tone}\n\n",
            name = persona.name,
            instruction = persona.system_instruction,
            tone = tone_description(persona.tone),
        );

        let context = context.trim();
        if !context.is_empty() {
            prompt.push_str("AVAILABLE CONTEXT:\n");
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }

        prompt.push_str(&format!(
            "IMPORTANT GUIDELINES:\n\
             1. Always respond in {language}.\n\
             2. Use the available context when it is relevant to the question.\n\
             3. If the available information does not contain the answer, say honestly that you do not know.\n\
             4. Stay in character as {name} at all times.\n\
             5. Reference the company information when it is appropriate.\n\
             6. Keep your answers consistent with each other.\n\
             7. Acknowledge the limits of your knowledge.\n\
             8. Always prioritize the user's safety and privacy.\n\n\
             RESPONSE STYLE: Give concrete, actionable answers.",
            language = self.language,
            name = persona.name,
        ));

        prompt
    }
}
