//! Document ingestion pipeline.
//!
//! Register → extract → chunk → embed (passage convention, one batch) →
//! store. The document is created with status `processing` before any work
//! happens; it moves to `completed` only after its chunks are committed in
//! one transaction, or to `failed` with the error recorded. A document is
//! therefore never partially searchable.
//!
//! When no subject is supplied, the generation backend classifies the
//! extracted text into one of the fixed subjects.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::documents;
use crate::embedding::Embedder;
use crate::error::{ExtractionFailed, GenerationFailed};
use crate::extract;
use crate::llm::{classify_subject, GenerationBackend};
use crate::models::{Chunk, DocumentStatus};
use crate::ocr::TextExtractor;
use crate::search::SqliteIndex;

/// Outcome of one successful ingestion.
#[derive(Debug)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_written: usize,
    pub subject: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionFailed),
    #[error(transparent)]
    Embed(#[from] crate::error::EmbedError),
    #[error(transparent)]
    Storage(#[from] crate::error::SearchFailed),
    #[error(transparent)]
    Classification(#[from] GenerationFailed),
    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),
}

/// Ingest one uploaded file. On failure the document row is kept with
/// status `failed` and the error message recorded, so the upload remains
/// visible and diagnosable.
pub async fn ingest_file(
    pool: &SqlitePool,
    config: &Config,
    embedder: &dyn Embedder,
    ocr: &dyn TextExtractor,
    classifier: &dyn GenerationBackend,
    filename: &str,
    bytes: Vec<u8>,
    subject: Option<&str>,
) -> Result<IngestReport, IngestError> {
    let mime_type = extract::mime_from_filename(filename)
        .ok_or_else(|| IngestError::UnsupportedFile(filename.to_string()))?;

    let document_id = documents::create_document(
        pool,
        filename,
        subject,
        bytes.len() as i64,
        mime_type,
    )
    .await?;

    tracing::info!(%document_id, filename, mime_type, "ingestion started");

    match ingest_content(pool, config, embedder, ocr, classifier, &document_id, mime_type, bytes, subject)
        .await
    {
        Ok(report) => {
            documents::update_status(pool, &document_id, DocumentStatus::Completed, None).await?;
            tracing::info!(
                %document_id,
                chunks = report.chunks_written,
                "ingestion completed"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!(%document_id, error = %e, "ingestion failed");
            documents::update_status(
                pool,
                &document_id,
                DocumentStatus::Failed,
                Some(&e.to_string()),
            )
            .await?;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn ingest_content(
    pool: &SqlitePool,
    config: &Config,
    embedder: &dyn Embedder,
    ocr: &dyn TextExtractor,
    classifier: &dyn GenerationBackend,
    document_id: &str,
    mime_type: &str,
    bytes: Vec<u8>,
    subject: Option<&str>,
) -> Result<IngestReport, IngestError> {
    let text = extract::extract_document_text(bytes, mime_type, ocr).await?;

    let drafts = chunk_text(
        &text,
        config.chunking.max_chars,
        config.chunking.overlap_chars,
    );

    // One batch for the whole document; order matches the drafts.
    let contents: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
    let embeddings = embedder.encode_passages(&contents).await?;

    let chunks: Vec<Chunk> = drafts
        .into_iter()
        .zip(embeddings)
        .map(|(draft, embedding)| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: draft.chunk_index,
            content: draft.content,
            embedding,
            metadata_json: "{}".to_string(),
            hash: draft.hash,
        })
        .collect();

    let index = SqliteIndex::new(pool.clone());
    index.create_batch(&chunks).await?;

    let resolved_subject = match subject {
        Some(s) => Some(s.to_string()),
        None => {
            let classified = classify_subject(classifier, &text).await?;
            documents::update_subject(pool, document_id, &classified).await?;
            Some(classified)
        }
    };

    Ok(IngestReport {
        document_id: document_id.to_string(),
        chunks_written: chunks.len(),
        subject: resolved_subject,
    })
}
