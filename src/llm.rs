//! Text-generation backend (Ollama).
//!
//! Calls `POST /api/generate` on the configured Ollama URL, non-streaming.
//! A non-200 status, a connection error, or a payload without the
//! `response` field all surface as [`GenerationFailed`]; there are no
//! retries here — the caller decides what a failed generation means.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::GenerationFailed;

/// Generation seam used by the answer orchestrator and the subject
/// classifier. The production implementation is [`OllamaClient`]; tests
/// substitute scripted doubles.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, GenerationFailed>;
}

pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationFailed> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationFailed(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
        })
    }

    /// Check that Ollama is reachable and has the configured model pulled.
    pub async fn health_check(&self) -> bool {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        let Ok(response) = resp else {
            return false;
        };
        if !response.status().is_success() {
            return false;
        }

        let Ok(json) = response.json::<serde_json::Value>().await else {
            return false;
        };
        json.get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .any(|m| m.get("name").and_then(|n| n.as_str()) == Some(self.model.as_str()))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, GenerationFailed> {
        let mut payload = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "temperature": temperature,
            "stream": false,
        });

        if let Some(system) = system {
            payload["system"] = serde_json::Value::String(system.to_string());
        }
        if let Some(max_tokens) = max_tokens {
            payload["options"] = serde_json::json!({ "num_predict": max_tokens });
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GenerationFailed(format!("Ollama connection error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerationFailed(format!(
                "Ollama generate failed with status {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationFailed(e.to_string()))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| GenerationFailed("Ollama response missing 'response' field".to_string()))
    }
}

/// Classify course material into one of the fixed subjects using the first
/// 2000 characters. Low temperature — this is a labeling task.
pub async fn classify_subject(
    backend: &dyn GenerationBackend,
    text: &str,
) -> Result<String, GenerationFailed> {
    let sample: String = text.chars().take(2000).collect();

    let prompt = format!(
        "以下の授業資料の内容を分析し、最も適切な科目を1つ選んでください。

資料内容:
{sample}

科目リスト:
- 数学
- 物理(力学)
- 物理(電磁気)
- 物理(熱力学)
- 物理(量子力学)
- 化学
- 生物学
- 情報科学
- 工学
- その他

回答は科目名のみを出力してください。"
    );

    let system = "あなたは授業資料を分類する専門家です。与えられた資料の内容から科目を特定してください。";

    let result = backend.generate(&prompt, Some(system), 0.3, None).await?;
    Ok(result.trim().trim_end_matches(['。', '、']).to_string())
}
