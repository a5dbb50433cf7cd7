//! Embedding generation collaborators.
//!
//! The real embedding work happens in an external service behind
//! [`HttpEmbedder`]; the store only consumes its output. When the service is
//! unreachable or times out, [`EmbeddingProvider`] falls back to
//! [`HashEmbedder`], a deterministic feature-hashing substitute, so
//! retrieval stays available in degraded-accuracy mode.

use std::time::Duration;

use serde_json::json;

/// Default request timeout for the remote embedding service.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Model label reported for fallback vectors. Clearly not a learned model.
pub const FALLBACK_MODEL: &str = "fnv1a-hash-fallback";

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding client initialization failed: {0}")]
    InitFailed(String),
}

/// Maps a text to a fixed-length numeric vector.
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Client for a remote embedding HTTP API.
///
/// Posts `{"model": ..., "input": ...}` and accepts either a bare
/// `{"embedding": [...]}` object or the OpenAI-style
/// `{"data": [{"embedding": [...]}]}` envelope.
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    timeout_secs: u64,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str, model: &str, timeout_secs: u64) -> Result<Self, EmbeddingError> {
        let timeout_secs = if timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            timeout_secs
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            timeout_secs,
        })
    }

    fn parse_response(value: serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
        let embedding = value
            .get("embedding")
            .or_else(|| {
                value
                    .get("data")
                    .and_then(|d| d.get(0))
                    .and_then(|first| first.get("embedding"))
            })
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EmbeddingError::MalformedResponse("no embedding array in response".to_string())
            })?;

        embedding
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    EmbeddingError::MalformedResponse("non-numeric embedding element".to_string())
                })
            })
            .collect()
    }
}

impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout(self.timeout_secs)
                } else {
                    EmbeddingError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Request(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        Self::parse_response(value)
    }
}

/// Deterministic degraded-mode embedder.
///
/// FNV-1a feature hashing: each word token (and adjacent-word bigram) is
/// hashed into one of `dimension` buckets with a hash-derived sign, and the
/// result is L2-normalized. Identical text always yields identical vectors;
/// lexically overlapping texts land near each other. This is a fallback
/// strategy, not a semantic model.
pub struct HashEmbedder {
    dimension: usize,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn accumulate(&self, token: &str, vector: &mut [f32]) {
        let hash = fnv1a(token.as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        FALLBACK_MODEL
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            self.accumulate(token, &mut vector);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&format!("{} {}", pair[0], pair[1]), &mut vector);
        }

        Ok(crate::retrieval::similarity::normalize(&vector))
    }
}

/// Output of a provider call: the vector plus the model that produced it.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
    /// True when the local fallback stood in for the remote service.
    pub degraded: bool,
}

/// Wraps the optional remote embedder and the local fallback.
///
/// A remote failure is logged as a warning and recovered through the
/// fallback, unless the fallback is disabled, in which case the error
/// propagates to the caller.
pub struct EmbeddingProvider {
    primary: Option<Box<dyn Embedder>>,
    fallback: HashEmbedder,
    fallback_enabled: bool,
}

impl EmbeddingProvider {
    pub fn new(
        primary: Option<Box<dyn Embedder>>,
        dimension: usize,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            primary,
            fallback: HashEmbedder::new(dimension),
            fallback_enabled,
        }
    }

    /// Name of the model that nominally produces vectors; identifies the
    /// snapshot.
    pub fn model_name(&self) -> &str {
        self.primary
            .as_deref()
            .map(Embedder::model_name)
            .unwrap_or(FALLBACK_MODEL)
    }

    pub fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if let Some(primary) = &self.primary {
            match primary.embed(text) {
                Ok(vector) => {
                    return Ok(Embedding {
                        vector,
                        model: primary.model_name().to_string(),
                        degraded: false,
                    })
                }
                Err(err) if self.fallback_enabled => {
                    log::warn!(
                        "embedding model '{}' unavailable, using local fallback: {err}",
                        primary.model_name()
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let vector = self.fallback.embed(text)?;
        Ok(Embedding {
            vector,
            model: FALLBACK_MODEL.to_string(),
            degraded: self.primary.is_some(),
        })
    }
}

/// SHA-256 hash of a model name, identifying snapshots on disk.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}
