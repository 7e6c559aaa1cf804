//! Embedding provider interface and the OpenAI-compatible HTTP client.
//!
//! The engine treats embedding as a black box: texts in, fixed-width
//! vectors out. Queries and passages may be formatted differently (e5-style
//! models want a `query:` / `passage:` prefix), so callers state which side
//! they are embedding.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    settings::EmbeddingSettings,
};

/// Which side of the retrieval pair a text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Query,
    Passage,
}

/// An opaque embedding provider.
///
/// Implementations must be scale-comparable across calls: vectors from one
/// call can be dotted against vectors from another. Identity (`provider` +
/// `model`) is recorded in the store's config descriptor so mismatched
/// stores are never silently mixed.
pub trait Embedder {
    /// Embed a batch of texts. A failure aborts the whole batch; the
    /// engine never retries internally.
    fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>>;

    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Whether returned vectors are already unit length. When false the
    /// engine normalizes before indexing so inner product equals cosine.
    fn pre_normalized(&self) -> bool {
        false
    }
}

/// Scale a vector to unit length in place. Zero vectors are left alone.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Longest text sent to the embedding endpoint, in characters.
const MAX_EMBED_CHARS: usize = 8000;

/// Blocking client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    settings: EmbeddingSettings,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(settings: EmbeddingSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Provider(format!("http client: {e}")))?;

        let api_key = std::env::var(&settings.api_key_env).ok();

        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    fn prepare(&self, text: &str, kind: InputKind) -> String {
        let trimmed = text.trim();
        let body = if trimmed.is_empty() { " " } else { trimmed };
        let body: String = body.chars().take(MAX_EMBED_CHARS).collect();

        let prefix = match kind {
            InputKind::Query => &self.settings.query_prefix,
            InputKind::Passage => &self.settings.passage_prefix,
        };
        if prefix.is_empty() {
            body
        } else {
            format!("{prefix}{body}")
        }
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let input: Vec<String> =
            texts.iter().map(|t| self.prepare(t, kind)).collect();

        let url = format!("{}/embeddings", self.settings.base_url);
        let body = serde_json::json!({
            "model": self.settings.model,
            "input": input,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Provider(format!("embeddings request: {e}")))?;

        let parsed: EmbeddingsResponse = response
            .json()
            .map_err(|e| Error::Provider(format!("embeddings response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Provider(format!(
                "embeddings response returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let dim = self.settings.dimension;
        let mut vectors = Vec::with_capacity(parsed.data.len());
        for row in parsed.data {
            if row.embedding.len() != dim {
                return Err(Error::Provider(format!(
                    "embedding dimension mismatch: got {}, expected {dim}",
                    row.embedding.len()
                )));
            }
            vectors.push(row.embedding);
        }

        Ok(vectors)
    }

    fn provider(&self) -> &str {
        &self.settings.provider
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    fn pre_normalized(&self) -> bool {
        self.settings.pre_normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize_l2(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize_l2(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn prepare_trims_clips_and_prefixes() {
        let mut settings = EmbeddingSettings::default();
        settings.query_prefix = "query: ".to_string();
        let embedder = HttpEmbedder::new(settings).unwrap();

        assert_eq!(
            embedder.prepare("  merhaba  ", InputKind::Query),
            "query: merhaba"
        );
        // Empty text becomes a single space so the endpoint accepts it.
        assert_eq!(embedder.prepare("   ", InputKind::Passage), " ");

        let long = "a".repeat(MAX_EMBED_CHARS + 100);
        let prepared = embedder.prepare(&long, InputKind::Passage);
        assert_eq!(prepared.chars().count(), MAX_EMBED_CHARS);
    }
}
