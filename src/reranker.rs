//! Optional relevance re-ranking over the top candidate slice.
//!
//! A joint (query, passage) relevance model scores a bounded slice of the
//! candidate list; the scores are min-max normalized within the slice and
//! blended into the vector scores. The re-ranker is strictly best-effort:
//! any failure leaves the vector ranking untouched.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::{
    error::{Error, Result},
    retriever::Candidate,
    settings::RerankSettings,
};

/// Maximum characters of a passage sent to the relevance model.
const PASSAGE_CLIP_CHARS: usize = 1200;

/// An opaque joint query-passage relevance model.
pub trait RelevanceModel {
    /// Score each passage against the query; one score per passage, in
    /// input order. Higher is more relevant; no scale is assumed.
    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// Blend relevance-model scores into the top slice of `candidates`.
///
/// Only the first `top_n` candidates are scored; the rest pass through
/// untouched. Model scores are normalized to [0,1] within the slice (a
/// degenerate all-equal slice normalizes to 1.0) and combined as
/// `(1-weight)·vector + weight·normalized`. The list is re-sorted by the
/// blended score. On any model failure the input is returned unchanged.
pub fn apply_reranker(
    model: &dyn RelevanceModel,
    query: &str,
    candidates: Vec<Candidate>,
    texts: &[String],
    top_n: usize,
    weight: f32,
) -> Vec<Candidate> {
    if candidates.is_empty() || top_n == 0 {
        return candidates;
    }

    let slice_len = top_n.min(candidates.len());
    let passages: Vec<String> = candidates[..slice_len]
        .iter()
        .map(|c| texts[c.pos].chars().take(PASSAGE_CLIP_CHARS).collect())
        .collect();

    let raw = match model.score(query, &passages) {
        Ok(scores) if scores.len() == slice_len => scores,
        Ok(scores) => {
            warn!(
                got = scores.len(),
                expected = slice_len,
                "relevance model returned wrong score count, keeping vector order"
            );
            return candidates;
        }
        Err(err) => {
            warn!(error = %err, "relevance model failed, keeping vector order");
            return candidates;
        }
    };

    let min = raw.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = raw.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    let mut updated = candidates;
    for (i, candidate) in updated[..slice_len].iter_mut().enumerate() {
        let normalized = if range < 1e-9 {
            1.0
        } else {
            (raw[i] - min) / range
        };
        candidate.rerank_score = Some(raw[i]);
        candidate.score =
            (1.0 - weight) * candidate.score + weight * normalized;
    }

    updated.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    updated
}

/// Blocking client for a `/rerank`-style HTTP endpoint.
///
/// Request body is `{model, query, documents}`; the response carries a
/// `results` (or `data`) array of `{index, relevance_score | score}`.
pub struct HttpReranker {
    client: reqwest::blocking::Client,
    settings: RerankSettings,
    api_key: Option<String>,
}

impl HttpReranker {
    pub fn new(settings: RerankSettings) -> Result<Self> {
        if settings.base_url.is_empty() {
            return Err(Error::Config(
                "rerank endpoint not configured".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Provider(format!("http client: {e}")))?;
        let api_key = std::env::var(&settings.api_key_env).ok();

        Ok(Self {
            client,
            settings,
            api_key,
        })
    }
}

impl RelevanceModel for HttpReranker {
    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let url = format!("{}/rerank", self.settings.base_url);
        let body = serde_json::json!({
            "model": self.settings.model,
            "query": query,
            "documents": passages,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: Value = request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Provider(format!("rerank request: {e}")))?
            .json()
            .map_err(|e| Error::Provider(format!("rerank response: {e}")))?;

        parse_rerank_response(&response, passages.len())
    }
}

fn parse_rerank_response(json: &Value, doc_count: usize) -> Result<Vec<f32>> {
    let results = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            Error::Provider("rerank response missing results array".to_string())
        })?;

    let mut scores = vec![0.0f32; doc_count];
    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                Error::Provider("rerank result missing index".to_string())
            })? as usize;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                Error::Provider("rerank result missing score".to_string())
            })? as f32;
        if index < doc_count {
            scores[index] = score;
        }
    }

    Ok(scores)
}
