//! Text embedding backends.
//!
//! The [`Embedder`] trait is the only seam between the index and whatever
//! turns text into vectors. [`HashingEmbedder`] is a deterministic local
//! default; [`VoyageEmbedder`] calls the Voyage AI embeddings API using
//! `input_type: "document"` for indexing and `input_type: "query"` for search.

use std::sync::Arc;
use std::time::Duration;

use dossier_core::{DossierError, EmbeddingConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Turns text into fixed-dimension vectors.
///
/// Implementations must be deterministic for a given `model_id` and return
/// exactly one vector of [`dimensions`](Embedder::dimensions) per input.
pub trait Embedder: Send + Sync {
    /// Stable identifier stored alongside built indexes.
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed texts for indexing, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Embedding`] if the backend fails.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DossierError>;

    /// Embed a single search query.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Embedding`] if the backend fails.
    fn embed_query(&self, query: &str) -> Result<Vec<f32>, DossierError>;
}

/// Model id of [`HashingEmbedder`]. Bump when the hashing scheme changes.
pub const HASHING_MODEL_ID: &str = "hashing-v1";

/// Deterministic bag-of-words embedder using SHA-256 feature hashing.
///
/// Each lowercase alphanumeric token is hashed to a bucket and a sign; the
/// bucket counts are L2-normalised. Texts sharing vocabulary land close
/// together, which is enough for offline builds and tests.
///
/// # Examples
///
/// ```
/// use dossier_index::embedding::{Embedder, HashingEmbedder};
///
/// let embedder = HashingEmbedder::new(64);
/// let a = embedder.embed_query("YOLO detection").unwrap();
/// let b = embedder.embed_query("yolo  DETECTION!").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-long vectors.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default().dimensions)
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        HASHING_MODEL_ID
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DossierError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>, DossierError> {
        Ok(self.embed(query))
    }
}

const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";
const BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;
const REQUEST_TIMEOUT_SECS: u64 = 60;
/// Vector size Voyage models return when no `output_dimension` is sent.
const VOYAGE_NATIVE_DIMENSIONS: usize = 1024;

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    input_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimension: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
}

/// Blocking client for the Voyage AI embeddings API.
pub struct VoyageEmbedder {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl std::fmt::Debug for VoyageEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoyageEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl VoyageEmbedder {
    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the `VOYAGE_API_KEY` env var if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Config`] if no API key is available, or
    /// [`DossierError::Embedding`] if the HTTP client cannot be built.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, DossierError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("VOYAGE_API_KEY").ok())
            .ok_or_else(|| {
                DossierError::Config(
                    "embedding API key not found: set embedding.api_key in .dossier.toml or VOYAGE_API_KEY env var".into(),
                )
            })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DossierError::Embedding(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    fn request(&self, input: Vec<String>, input_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            input,
            input_type: input_type.to_string(),
            output_dimension: (self.dimensions != VOYAGE_NATIVE_DIMENSIONS)
                .then_some(self.dimensions),
        }
    }

    fn post(&self, request: &EmbedRequest) -> Result<Vec<Vec<f32>>, DossierError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .map_err(|e| DossierError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(DossierError::Embedding(format!(
                "Voyage API returned {status}: {body}"
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .map_err(|e| DossierError::Embedding(format!("failed to parse response: {e}")))?;

        Ok(embed_response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect())
    }
}

impl Embedder for VoyageEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Voyage accepts up to 128 texts per call; this sends sub-batches of 64
    /// with a short delay between them for rate limiting.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DossierError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                std::thread::sleep(Duration::from_millis(BATCH_DELAY_MS));
            }
            let request = self.request(batch.to_vec(), "document");
            all_embeddings.extend(self.post(&request)?);
        }

        Ok(all_embeddings)
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>, DossierError> {
        let request = self.request(vec![query.to_string()], "query");
        self.post(&request)?
            .into_iter()
            .next()
            .ok_or_else(|| DossierError::Embedding("empty response from Voyage API".into()))
    }
}

/// Build the embedder named by `config.provider`.
///
/// # Errors
///
/// Returns [`DossierError::Config`] for an unknown provider or a missing
/// API key.
///
/// # Examples
///
/// ```
/// use dossier_core::EmbeddingConfig;
/// use dossier_index::embedding::embedder_from_config;
///
/// let embedder = embedder_from_config(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(embedder.model_id(), "hashing-v1");
/// assert_eq!(embedder.dimensions(), 384);
/// ```
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, DossierError> {
    match config.provider.as_str() {
        "hashing" => {
            if config.model != HASHING_MODEL_ID {
                tracing::warn!(
                    "hashing provider ignores model '{}', using {HASHING_MODEL_ID}",
                    config.model
                );
            }
            Ok(Arc::new(HashingEmbedder::new(config.dimensions)))
        }
        "voyage" => Ok(Arc::new(VoyageEmbedder::with_config(config)?)),
        other => Err(DossierError::Config(format!(
            "unknown embedding provider '{other}' (expected \"hashing\" or \"voyage\")"
        ))),
    }
}

/// Cosine similarity of two vectors; `0.0` on length mismatch or zero norm.
///
/// # Examples
///
/// ```
/// use dossier_index::embedding::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
/// assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}
