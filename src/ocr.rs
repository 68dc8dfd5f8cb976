//! OCR text-extraction client.
//!
//! Posts problem images to the OCR service's `/api/ocr` endpoint and
//! returns the extracted Markdown. The service is opaque to this crate —
//! malformed input, backend errors, and missing payload fields all surface
//! as [`ExtractionFailed`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::OcrConfig;
use crate::error::ExtractionFailed;

/// Image-to-text seam. The production implementation is [`OcrClient`].
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract Markdown text from an image.
    async fn extract_text(&self, image_bytes: Vec<u8>) -> Result<String, ExtractionFailed>;
}

pub struct OcrClient {
    client: reqwest::Client,
    url: String,
}

impl OcrClient {
    pub fn new(config: &OcrConfig) -> Result<Self, ExtractionFailed> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionFailed(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/health", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl TextExtractor for OcrClient {
    async fn extract_text(&self, image_bytes: Vec<u8>) -> Result<String, ExtractionFailed> {
        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| ExtractionFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(format!("{}/api/ocr", self.url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractionFailed(format!("OCR service connection error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ExtractionFailed(format!(
                "OCR failed with status {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExtractionFailed(e.to_string()))?;

        json.get("markdown")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ExtractionFailed("OCR response missing 'markdown' field".to_string()))
    }
}
