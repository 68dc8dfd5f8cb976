//! Tagged error types for each component boundary.
//!
//! Every component raises its most specific error kind; the answer
//! orchestrator wraps any of them into [`AnswerError`] without degrading
//! the pipeline (a search failure is a hard failure of the whole
//! operation, never a silent fallback to the ungrounded prompt).
//!
//! Callers can match on the variant to distinguish fatal causes (a model
//! that failed to load stays broken until restart) from upstream ones
//! (a generation backend that returned a malformed payload) without
//! parsing message strings.

use thiserror::Error;

/// Embedding encoder failures.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The embedding model could not be loaded or initialized. Fatal for
    /// the process's embedding capability until restarted.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// The encode call itself failed (provider returned a malformed
    /// response or the blocking task was aborted).
    #[error("embedding failed: {0}")]
    EncodeFailed(String),
}

/// OCR text-extraction failures (malformed input or backend error).
#[derive(Debug, Error)]
#[error("text extraction failed: {0}")]
pub struct ExtractionFailed(pub String);

/// Generation backend failures (unreachable backend or malformed/missing
/// response payload).
#[derive(Debug, Error)]
#[error("generation failed: {0}")]
pub struct GenerationFailed(pub String);

/// Vector index / storage query failures.
#[derive(Debug, Error)]
#[error("search failed: {0}")]
pub struct SearchFailed(#[from] pub sqlx::Error);

/// Umbrella error raised by the answer orchestrator, wrapping whichever
/// pipeline step failed. No retries, no partial answers.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer generation failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("answer generation failed: {0}")]
    Search(#[from] SearchFailed),
    #[error("answer generation failed: {0}")]
    Generation(#[from] GenerationFailed),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_error_preserves_cause() {
        let err = AnswerError::from(GenerationFailed("missing 'response' field".into()));
        assert!(matches!(err, AnswerError::Generation(_)));
        assert!(err.to_string().contains("answer generation failed"));
        assert!(err.to_string().contains("missing 'response' field"));
    }

    #[test]
    fn test_model_unavailable_is_distinguishable() {
        let err = AnswerError::from(EmbedError::ModelUnavailable("download failed".into()));
        assert!(matches!(
            err,
            AnswerError::Embed(EmbedError::ModelUnavailable(_))
        ));
    }
}
