//! Asymmetric embedding encoder.
//!
//! Texts are encoded with the multilingual-e5 convention: queries are
//! prefixed with `"query: "` and stored passages with `"passage: "` before
//! they reach the model. The model was trained on this asymmetry — encoding
//! a query without its prefix and comparing it against prefixed passages is
//! a correctness bug, not a style choice, so the prefixes are applied here
//! and nowhere else.
//!
//! All output vectors are L2-normalized, so cosine similarity reduces to a
//! dot product; consumers may rely on this.
//!
//! Two providers:
//! - **local** — fastembed, model loaded lazily on first call and cached
//!   for the life of the [`Encoder`]. Inference is CPU-bound and runs on
//!   the tokio blocking pool, gated by a bounded semaphore so a burst of
//!   requests cannot pile unbounded work onto the pool.
//! - **ollama** — a local Ollama instance's `/api/embed` endpoint.
//!
//! Failure mode: if the model cannot be loaded, every encode call fails
//! with [`EmbedError::ModelUnavailable`]; the error is not retried here.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Prefix applied to search queries before encoding.
pub const QUERY_PREFIX: &str = "query: ";
/// Prefix applied to stored passages before encoding.
pub const PASSAGE_PREFIX: &str = "passage: ";

/// Text-to-vector encoding seam. The production implementation is
/// [`Encoder`]; tests substitute counting doubles.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode one search query (`"query: "` convention).
    async fn encode_query(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Encode a batch of passages (`"passage: "` convention) as a single
    /// unit of work. Output order matches input order.
    async fn encode_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Encode one passage.
    async fn encode_passage(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vecs = self.encode_passages(&[text.to_string()]).await?;
        vecs.pop()
            .ok_or_else(|| EmbedError::EncodeFailed("empty embedding response".to_string()))
    }
}

enum Provider {
    #[cfg(feature = "local-embeddings")]
    Local {
        /// Lazily-initialized model, loaded once and reused. fastembed's
        /// inference takes `&mut`, so calls are serialized through the lock;
        /// the semaphore bounds how many tasks wait on it.
        model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
    },
    Ollama {
        client: reqwest::Client,
        url: String,
    },
}

/// Explicitly-owned embedding resource handle. Constructed once at process
/// start and passed by reference into everything that encodes text — there
/// is no hidden global model cache.
pub struct Encoder {
    config: EmbeddingConfig,
    provider: Provider,
    inflight: Semaphore,
}

impl Encoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let provider = match config.provider.as_str() {
            #[cfg(feature = "local-embeddings")]
            "local" => Provider::Local {
                model: Arc::new(std::sync::Mutex::new(None)),
            },
            #[cfg(not(feature = "local-embeddings"))]
            "local" => {
                return Err(EmbedError::ModelUnavailable(
                    "local embedding provider requires --features local-embeddings".to_string(),
                ))
            }
            "ollama" => Provider::Ollama {
                client: reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(config.timeout_secs))
                    .build()
                    .map_err(|e| EmbedError::ModelUnavailable(e.to_string()))?,
                url: config
                    .url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
            },
            other => {
                return Err(EmbedError::ModelUnavailable(format!(
                    "unknown embedding provider: {}",
                    other
                )))
            }
        };

        Ok(Self {
            config: config.clone(),
            provider,
            inflight: Semaphore::new(config.max_inflight),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    pub fn dims(&self) -> usize {
        self.config.dims
    }

    async fn encode_prefixed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError> {
        let expected = texts.len();

        let mut vectors = match &self.provider {
            #[cfg(feature = "local-embeddings")]
            Provider::Local { model } => self.encode_local(model.clone(), texts).await?,
            Provider::Ollama { client, url } => self.encode_ollama(client, url, &texts).await?,
        };

        if vectors.len() != expected {
            return Err(EmbedError::EncodeFailed(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                expected
            )));
        }

        for v in &mut vectors {
            l2_normalize(v);
        }
        Ok(vectors)
    }

    #[cfg(feature = "local-embeddings")]
    async fn encode_local(
        &self,
        model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let _permit = self
            .inflight
            .acquire()
            .await
            .map_err(|e| EmbedError::EncodeFailed(e.to_string()))?;

        let model_name = self.config.model.clone();
        let batch_size = self.config.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| EmbedError::ModelUnavailable("model mutex poisoned".to_string()))?;

            if guard.is_none() {
                let fastembed_model = local_model_id(&model_name)?;
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
                )
                .map_err(|e| EmbedError::ModelUnavailable(e.to_string()))?;
                *guard = Some(loaded);
            }

            // Unreachable None: just initialized above.
            let model = guard
                .as_mut()
                .ok_or_else(|| EmbedError::ModelUnavailable("model not loaded".to_string()))?;

            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbedError::EncodeFailed(e.to_string()))
        })
        .await
        .map_err(|e| EmbedError::EncodeFailed(format!("embedding task aborted: {}", e)))?
    }

    async fn encode_ollama(
        &self,
        client: &reqwest::Client,
        url: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let response = client
            .post(format!("{}/api/embed", url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                EmbedError::ModelUnavailable(format!(
                    "Ollama unreachable at {}: {}",
                    url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EmbedError::EncodeFailed(format!(
                "Ollama embed error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::EncodeFailed(e.to_string()))?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EmbedError::EncodeFailed("Ollama response missing 'embeddings' array".to_string())
            })?;

        let mut result = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            let vec: Vec<f32> = embedding
                .as_array()
                .ok_or_else(|| {
                    EmbedError::EncodeFailed("Ollama embedding is not an array".to_string())
                })?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            result.push(vec);
        }
        Ok(result)
    }
}

#[async_trait]
impl Embedder for Encoder {
    async fn encode_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vecs = self.encode_prefixed(vec![prefix_query(text)]).await?;
        vecs.pop()
            .ok_or_else(|| EmbedError::EncodeFailed("empty embedding response".to_string()))
    }

    async fn encode_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.encode_prefixed(prefix_passages(texts)).await
    }
}

/// Literal text sent to the model for a query.
pub fn prefix_query(text: &str) -> String {
    format!("{}{}", QUERY_PREFIX, text)
}

/// Literal texts sent to the model for a passage batch, in input order.
pub fn prefix_passages(texts: &[String]) -> Vec<String> {
    texts
        .iter()
        .map(|t| format!("{}{}", PASSAGE_PREFIX, t))
        .collect()
}

#[cfg(feature = "local-embeddings")]
fn local_model_id(name: &str) -> Result<fastembed::EmbeddingModel, EmbedError> {
    match name {
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(EmbedError::ModelUnavailable(format!(
            "unknown local embedding model: '{}'. Supported models: \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}

// ============ Vector utilities ============

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes) for SQLite storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
