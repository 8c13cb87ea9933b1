//! Prompt assembly for the sufficiency gate and the final answer.

use crate::chat_history::format_history;
use crate::models::*;

pub const SUFFICIENCY_HEADER: &str = "You are judging whether retrieved documents are enough to answer a question.";

pub const HISTORY_SECTION: &str = "## CONVERSATION HISTORY:";
pub const CONTEXT_SECTION: &str = "## RETRIEVED CONTEXT:";
pub const WEB_SECTION: &str = "## WEB SEARCH RESULTS:";
pub const QUESTION_SECTION: &str = "## USER QUESTION:";

const NO_DOCUMENTS: &str = "No relevant documents found in the knowledge base.";

pub fn format_documents(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_DOCUMENTS.to_string();
    }

    let mut context = String::new();
    for (i, scored) in chunks.iter().enumerate() {
        let source = scored
            .chunk
            .metadata
            .source_file
            .as_deref()
            .unwrap_or("unknown source");
        let page = scored
            .chunk
            .metadata
            .page_number
            .map(|p| format!(", page {}", p))
            .unwrap_or_default();
        context.push_str(&format!(
            "--- Document {}: {}{} (Relevance: {:.3}) ---\n{}\n\n",
            i + 1,
            source,
            page,
            scored.score,
            scored.chunk.content
        ));
    }
    context.trim_end().to_string()
}

pub fn format_web_results(results: &[WebResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "--- Web result {}: {} ---\nSource: {}\n{}",
                i + 1,
                r.title,
                r.url,
                r.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_sufficiency_prompt(query: &str, chunks: &[ScoredChunk]) -> String {
    format!(
        r#"{SUFFICIENCY_HEADER}
Reply with exactly one word: YES if the documents contain enough information to answer the question, NO otherwise.

{CONTEXT_SECTION}
{context}

{QUESTION_SECTION}
{query}

VERDICT (YES or NO):"#,
        context = format_documents(chunks),
    )
}

/// Reads the model's verdict from the first alphabetic word of its reply.
/// Anything other than yes/no counts as unclear.
pub fn parse_sufficiency(reply: &str) -> Sufficiency {
    let first_word: String = reply
        .trim_start_matches(|c: char| !c.is_alphabetic())
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();

    match first_word.to_ascii_uppercase().as_str() {
        "YES" => Sufficiency::Sufficient,
        "NO" => Sufficiency::Insufficient,
        _ => Sufficiency::Unclear,
    }
}

/// Final prompt: history, local context, optional web results, then the question.
pub fn build_answer_prompt(
    query: &str,
    history: &[MessagePair],
    chunks: &[ScoredChunk],
    web_results: &[WebResult],
) -> String {
    let mut prompt = String::from(
        "You are a helpful AI assistant with access to a knowledge base.\n\
         Using the information contained in the context, give a comprehensive answer to the question.\n\
         Respond only to the question asked; keep the response concise and relevant.\n\
         Cite the number of the source document or web result you used.\n\
         If the context does not contain the answer, say so clearly and answer from general knowledge only when you are confident.\n\n",
    );

    if !history.is_empty() {
        prompt.push_str(HISTORY_SECTION);
        prompt.push('\n');
        prompt.push_str(&format_history(history));
        prompt.push('\n');
    }

    prompt.push_str(CONTEXT_SECTION);
    prompt.push('\n');
    prompt.push_str(&format_documents(chunks));
    prompt.push_str("\n\n");

    if !web_results.is_empty() {
        prompt.push_str(WEB_SECTION);
        prompt.push('\n');
        prompt.push_str(&format_web_results(web_results));
        prompt.push_str("\n\n");
    }

    prompt.push_str(QUESTION_SECTION);
    prompt.push('\n');
    prompt.push_str(query);
    prompt.push('\n');
    prompt
}

/// History-only prompt, no retrieval.
pub fn build_conversation_prompt(message: &str, history: &[MessagePair]) -> String {
    let mut prompt = String::from("You are a helpful AI assistant. Continue the conversation.\n\n");
    if !history.is_empty() {
        prompt.push_str(HISTORY_SECTION);
        prompt.push('\n');
        prompt.push_str(&format_history(history));
        prompt.push('\n');
    }
    prompt.push_str(QUESTION_SECTION);
    prompt.push('\n');
    prompt.push_str(message);
    prompt.push('\n');
    prompt
}
