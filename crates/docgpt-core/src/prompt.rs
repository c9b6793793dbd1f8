//! Prompt assembly for document-grounded answers.
//!
//! The system message pins three rules: answer in a fixed language, use only
//! the supplied context, and admit not knowing instead of inventing an
//! answer. The human message is the user's question, unmodified.

use serde::Serialize;

use crate::models::ScoredChunk;

/// Language answers are requested in unless configured otherwise.
pub const DEFAULT_RESPONSE_LANGUAGE: &str = "Korean";

/// Separator placed between retrieved chunks in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A two-part chat prompt ready for a completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatPrompt {
    pub system: String,
    pub human: String,
}

/// Join retrieved chunk texts in the order received (relevance order).
pub fn format_context(context: &[ScoredChunk]) -> String {
    context
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Build the system instruction around a context block.
pub fn system_message(context_block: &str, language: &str) -> String {
    format!(
        "All answer in {language}.\n\
         Answer the question using ONLY the following context.\n\
         If you don't know the answer just say you don't know.\n\
         Don't make anything up.\n\
         \n\
         Context: {context_block}\n"
    )
}

/// Assemble the prompt for `question` from retrieved chunks.
pub fn assemble(context: &[ScoredChunk], question: &str, language: &str) -> ChatPrompt {
    ChatPrompt {
        system: system_message(&format_context(context), language),
        human: question.to_string(),
    }
}
