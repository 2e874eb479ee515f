//! Knowledge-base loading and system-instruction rendering.
//!
//! The knowledge base is a CSV file with `question` and `answer` columns,
//! rendered into `Q:`/`A:` blocks and substituted into the instruction
//! template before the speech session is configured. A missing or malformed
//! file degrades to an empty knowledge section; it never fails a call.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// The fixed system instructions for the assistant, with `{knowledge_base}`
/// as the single substitution point.
pub const INSTRUCTIONS_TEMPLATE: &str = "\
I am SAGE, the voice assistant for this call. My responses are brief and \
clear (two to three sentences where possible), natural and conversational, \
and easy to follow over the phone.

Below is my specialized knowledge base:

{knowledge_base}

When a question matches my knowledge base, I take the core information from \
the relevant answer and rephrase it naturally in my own words, adding brief \
context where it helps. When a question partially matches, I combine the \
knowledge base with my general knowledge, giving the knowledge base priority. \
For unrelated questions I draw on general knowledge in the same concise, \
conversational style.

If asked about my name, I explain that SAGE stands for Snakescript's Advanced \
Guidance Expert. I speak as if having a friendly phone conversation, avoid \
technical jargon unless asked for it, keep any list to three key points, and \
use natural acknowledgments such as \"I see\" or \"Great question\".";

#[derive(Debug, Deserialize)]
struct KnowledgeRow {
    question: String,
    answer: String,
}

/// Renders CSV knowledge data into question/answer blocks.
///
/// Rows that fail to deserialize are skipped with a warning so one bad line
/// cannot take the whole knowledge base down.
pub fn format_knowledge<R: Read>(reader: R) -> String {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut blocks = Vec::new();
    for record in csv_reader.deserialize::<KnowledgeRow>() {
        match record {
            Ok(row) => blocks.push(format!("Q: {}\nA: {}", row.question, row.answer)),
            Err(e) => warn!(error = %e, "Skipping malformed knowledge base row"),
        }
    }
    blocks.join("\n\n")
}

/// Loads and renders the knowledge base from a CSV file.
pub fn load_knowledge_base(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open knowledge base at {}", path.display()))?;
    Ok(format_knowledge(file))
}

/// Substitutes the rendered knowledge base into the instruction template.
pub fn build_instructions(knowledge_base: &str) -> String {
    INSTRUCTIONS_TEMPLATE.replace("{knowledge_base}", knowledge_base)
}

/// Produces the full system instructions for a session, falling back to an
/// empty knowledge section when the source file is unavailable.
pub fn load_instructions(path: &Path) -> String {
    let knowledge = match load_knowledge_base(path) {
        Ok(knowledge) => knowledge,
        Err(e) => {
            warn!(error = %e, "Knowledge base unavailable; continuing with an empty knowledge section");
            String::new()
        }
    };
    build_instructions(&knowledge)
}
