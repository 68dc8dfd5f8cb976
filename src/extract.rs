//! Text extraction for uploaded course material.
//!
//! PDFs are extracted in-process (CPU-bound, offloaded to the blocking
//! pool); problem photos go through the external OCR service. Both paths
//! return plain UTF-8 text for the chunker.

use crate::error::ExtractionFailed;
use crate::ocr::TextExtractor;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";

/// Map an upload filename extension to a supported MIME type.
pub fn mime_from_filename(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "png" => Some(MIME_PNG),
        "jpg" | "jpeg" => Some(MIME_JPEG),
        _ => None,
    }
}

/// Extract text from uploaded bytes according to their MIME type.
pub async fn extract_document_text(
    bytes: Vec<u8>,
    mime_type: &str,
    ocr: &dyn TextExtractor,
) -> Result<String, ExtractionFailed> {
    match mime_type {
        MIME_PDF => extract_pdf(bytes).await,
        MIME_PNG | MIME_JPEG => ocr.extract_text(bytes).await,
        other => Err(ExtractionFailed(format!(
            "unsupported content type: {}",
            other
        ))),
    }
}

async fn extract_pdf(bytes: Vec<u8>) -> Result<String, ExtractionFailed> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractionFailed(e.to_string()))
    })
    .await
    .map_err(|e| ExtractionFailed(format!("extraction task aborted: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_filename() {
        assert_eq!(mime_from_filename("calculus.pdf"), Some(MIME_PDF));
        assert_eq!(mime_from_filename("photo.JPG"), Some(MIME_JPEG));
        assert_eq!(mime_from_filename("scan.jpeg"), Some(MIME_JPEG));
        assert_eq!(mime_from_filename("fig.png"), Some(MIME_PNG));
        assert_eq!(mime_from_filename("notes.docx"), None);
        assert_eq!(mime_from_filename("noextension"), None);
    }
}
