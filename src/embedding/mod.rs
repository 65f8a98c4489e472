//! Embedding generation for chunk text and search queries.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised while generating embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Embedding service responded with a non-success status.
    #[error("Embedding service error ({status}): {body}")]
    Upstream {
        /// HTTP status returned by the service.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The service returned a different number of vectors than requested.
    #[error("Embedding response had {actual} vectors, expected {expected}")]
    MismatchedResponse {
        /// Number of inputs submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
}

/// Produces dense vectors for text. Implementations normalize each input by
/// replacing newlines with spaces and trimming before embedding.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts in one request, preserving input order.
    ///
    /// Inputs that are empty after normalization map to empty vectors and are
    /// never sent upstream. An empty batch returns immediately with no request.
    /// The batch is atomic: any upstream failure fails the whole call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

fn normalize(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingClient {
    /// Construct a client for the given embedding endpoint.
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().user_agent("cividex/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    async fn request_embeddings(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "input": inputs }));
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Upstream { status, body });
        }

        let payload: EmbeddingsResponse = response.json().await?;
        if payload.data.len() != inputs.len() {
            return Err(EmbeddingError::MismatchedResponse {
                expected: inputs.len(),
                actual: payload.data.len(),
            });
        }

        // services may return items out of order; the index field is canonical
        let mut vectors = vec![Vec::new(); inputs.len()];
        for item in payload.data {
            if item.index >= vectors.len() {
                return Err(EmbeddingError::MismatchedResponse {
                    expected: inputs.len(),
                    actual: item.index + 1,
                });
            }
            vectors[item.index] = item.embedding;
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        Ok(vectors.pop().unwrap_or_default())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut inputs = Vec::new();
        let mut positions = Vec::new();
        for (position, text) in texts.iter().enumerate() {
            let normalized = normalize(text);
            if normalized.is_empty() {
                tracing::warn!(position, "Skipping empty text in embedding batch");
            } else {
                positions.push(position);
                inputs.push(normalized);
            }
        }

        let mut result = vec![Vec::new(); texts.len()];
        if inputs.is_empty() {
            return Ok(result);
        }

        let vectors = self.request_embeddings(&inputs).await?;
        for (position, vector) in positions.into_iter().zip(vectors) {
            result[position] = vector;
        }
        Ok(result)
    }
}

/// Deterministic local embedder used when no embedding service is configured.
///
/// Vectors are derived from byte content alone, so identical texts always map
/// to identical unit vectors. Useful for development and offline tests; the
/// geometry carries no semantic meaning.
pub struct LocalHashEmbedder {
    dimension: usize,
}

impl LocalHashEmbedder {
    /// Build an embedder producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for (offset, byte) in text.bytes().enumerate() {
            state = state.wrapping_mul(0x100_0000_01b3) ^ u64::from(byte);
            let slot = (state as usize) % self.dimension;
            vector[slot] += if offset % 2 == 0 { 1.0 } else { -1.0 };
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for LocalHashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.hash_vector(&normalized))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
