//! Answer orchestration.
//!
//! Coordinates the strictly sequential chain encode → search → compose →
//! generate for one question, and shapes the attributed result. Concurrency
//! exists only across independent calls; within one call no step begins
//! before its predecessor completes.
//!
//! The orchestrator performs no persistence — writing the conversation
//! audit record after a successful answer is the caller's job. Any step
//! failure propagates as the umbrella [`AnswerError`]; there is no retry
//! and no fallback to the ungrounded prompt on a search failure, so a
//! returned answer is always fully attributable to its stated references.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::AnswerError;
use crate::llm::GenerationBackend;
use crate::models::{ReferencedDocument, RetrievedChunk};
use crate::prompt::{self, SYSTEM_INSTRUCTION};
use crate::search::Retriever;

/// Characters of chunk content kept in a reference preview.
const PREVIEW_CHARS: usize = 200;
/// Appended to every preview, whether or not truncation occurred.
const PREVIEW_SUFFIX: &str = "...";

pub struct RagService {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn GenerationBackend>,
    top_k: usize,
    temperature: f32,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn GenerationBackend>,
        top_k: usize,
        temperature: f32,
    ) -> Self {
        Self {
            embedder,
            retriever,
            generator,
            top_k,
            temperature,
        }
    }

    /// Encode the question as a query and retrieve the most similar
    /// eligible chunks. Also usable on its own, outside `answer`.
    pub async fn search_relevant_chunks(
        &self,
        question: &str,
        top_k: Option<usize>,
        subject_filter: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, AnswerError> {
        let top_k = top_k.unwrap_or(self.top_k);
        let query_vector = self.embedder.encode_query(question).await?;
        let chunks = self
            .retriever
            .search(&query_vector, top_k, subject_filter)
            .await?;
        Ok(chunks)
    }

    /// Answer a question, optionally grounded in retrieved course material.
    ///
    /// With `use_retrieval = false` no encoder or index call occurs: the
    /// prompt uses the ungrounded template and the reference list is empty.
    pub async fn answer(
        &self,
        question: &str,
        use_retrieval: bool,
        subject_filter: Option<&str>,
    ) -> Result<(String, Vec<ReferencedDocument>), AnswerError> {
        let chunks = if use_retrieval {
            self.search_relevant_chunks(question, None, subject_filter)
                .await?
        } else {
            Vec::new()
        };

        tracing::debug!(
            retrieved = chunks.len(),
            use_retrieval,
            "composing prompt"
        );

        let referenced_docs: Vec<ReferencedDocument> = chunks
            .iter()
            .map(|chunk| ReferencedDocument {
                document_id: chunk.document_id.clone(),
                filename: chunk.filename.clone(),
                subject: chunk.subject.clone(),
                chunk_content: preview(&chunk.content),
            })
            .collect();

        let prompt_text = prompt::compose(question, &chunks);

        let answer = self
            .generator
            .generate(&prompt_text, Some(SYSTEM_INSTRUCTION), self.temperature, None)
            .await
            .map_err(AnswerError::from)?;

        Ok((answer, referenced_docs))
    }
}

/// First [`PREVIEW_CHARS`] characters of the content with the fixed suffix.
/// The suffix is unconditional — callers must not read it as "was truncated".
fn preview(content: &str) -> String {
    let mut s: String = content.chars().take(PREVIEW_CHARS).collect();
    s.push_str(PREVIEW_SUFFIX);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_content() {
        let content = "x".repeat(500);
        let p = preview(&content);
        assert_eq!(p.chars().count(), 203);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_preview_suffix_is_unconditional() {
        let p = preview("short");
        assert_eq!(p, "short...");
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        // 250 multibyte chars must truncate at 200 chars, not 200 bytes.
        let content = "あ".repeat(250);
        let p = preview(&content);
        assert_eq!(p.chars().count(), 203);
        assert!(p.starts_with("あ"));
    }
}
