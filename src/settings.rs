//! Runtime configuration resolved from environment variables with
//! sensible defaults.
//!
//! Nothing here is persisted; the subset of settings that must stay
//! consistent across runs (provider, model, dimensionality, chunk strategy)
//! is recorded in the store's config descriptor at build time.

use crate::chunking::ChunkStrategy;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MMR_LAMBDA: f32 = 0.72;
pub const DEFAULT_RERANK_TOP_N: usize = 30;
pub const DEFAULT_RERANK_WEIGHT: f32 = 0.25;
pub const DEFAULT_CATEGORY_MIN_CHUNKS: usize = 10;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Filtered searches over candidate sets up to this size go through an
/// exact temporary sub-index; larger sets fall back to the expanding
/// global scan, which may under-return when the filter covers a small
/// fraction of a huge corpus. Raise it to force the exact path.
pub const DEFAULT_SUBSET_SEARCH_LIMIT: usize = 12_000;

/// Embedding provider connection settings.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Provider label recorded in the store config (e.g. "openai").
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Prefix prepended to query texts (e5-style models served over an
    /// OpenAI-compatible endpoint need "query: " / "passage: ").
    pub query_prefix: String,
    pub passage_prefix: String,
    /// Whether the endpoint already returns unit-length vectors.
    pub pre_normalized: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            query_prefix: String::new(),
            passage_prefix: String::new(),
            pre_normalized: false,
        }
    }
}

/// Re-ranker endpoint settings. `base_url` empty means no re-ranker is
/// configured; search requests asking for one fall back to vector order.
#[derive(Debug, Clone, Default)]
pub struct RerankSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

#[derive(Debug, Clone)]
pub struct ChunkingSettings {
    pub strategy: ChunkStrategy,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_paragraph_len: usize,
    pub max_paragraph_len: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Paragraph,
            chunk_size: 1000,
            chunk_overlap: 200,
            min_paragraph_len: 100,
            max_paragraph_len: 3000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub rerank: RerankSettings,
    pub chunking: ChunkingSettings,
    pub mmr_lambda: f32,
    pub rerank_top_n: usize,
    pub rerank_weight: f32,
    pub category_min_chunks: usize,
    pub embed_batch_size: usize,
    pub subset_search_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedding: EmbeddingSettings::default(),
            rerank: RerankSettings::default(),
            chunking: ChunkingSettings::default(),
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            rerank_top_n: DEFAULT_RERANK_TOP_N,
            rerank_weight: DEFAULT_RERANK_WEIGHT,
            category_min_chunks: DEFAULT_CATEGORY_MIN_CHUNKS,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            subset_search_limit: DEFAULT_SUBSET_SEARCH_LIMIT,
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    /// Build settings from `DERLEM_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        let emb = &mut settings.embedding;
        emb.provider = env_or("DERLEM_EMBED_PROVIDER", &emb.provider);
        emb.model = env_or("DERLEM_EMBED_MODEL", &emb.model);
        emb.base_url = env_or("DERLEM_EMBED_BASE_URL", &emb.base_url);
        emb.api_key_env = env_or("DERLEM_EMBED_API_KEY_ENV", &emb.api_key_env);
        emb.query_prefix = env_or("DERLEM_QUERY_PREFIX", &emb.query_prefix);
        emb.passage_prefix =
            env_or("DERLEM_PASSAGE_PREFIX", &emb.passage_prefix);
        if let Ok(dim) = std::env::var("DERLEM_EMBED_DIM")
            && let Ok(dim) = dim.parse()
        {
            emb.dimension = dim;
        }
        if let Ok(val) = std::env::var("DERLEM_EMBED_NORMALIZED") {
            emb.pre_normalized = val == "1" || val.eq_ignore_ascii_case("true");
        }

        settings.rerank.base_url = env_or("DERLEM_RERANK_URL", "");
        settings.rerank.model = env_or("DERLEM_RERANK_MODEL", "");
        settings.rerank.api_key_env =
            env_or("DERLEM_RERANK_API_KEY_ENV", &settings.embedding.api_key_env);

        if let Ok(val) = std::env::var("DERLEM_CHUNK_STRATEGY")
            && let Some(strategy) = ChunkStrategy::parse(&val)
        {
            settings.chunking.strategy = strategy;
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tuning() {
        let s = Settings::default();
        assert_eq!(s.mmr_lambda, 0.72);
        assert_eq!(s.rerank_top_n, 30);
        assert_eq!(s.rerank_weight, 0.25);
        assert_eq!(s.chunking.max_paragraph_len, 3000);
        assert_eq!(s.subset_search_limit, 12_000);
        assert!(s.rerank.base_url.is_empty());
    }
}
