//! The retrieval session: owns the loaded store and its derived caches,
//! and runs the search pipeline end to end.
//!
//! Pipeline per query: plan filters -> gather vector candidates ->
//! optional relevance re-rank -> optional MMR diversification -> source
//! dedup -> top-k. Multi-query search runs the pipeline once per query
//! variant and fuses by source.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::{
    categories::CategoryCatalog,
    data_dir::DataDir,
    embedding::{Embedder, InputKind, normalize_l2},
    error::{Error, Result},
    filter::{FilterCaches, FilterPlan, plan_filters},
    meta::{ChunkMeta, source_key},
    mmr::apply_mmr,
    reranker::{RelevanceModel, apply_reranker},
    settings::{DEFAULT_MMR_LAMBDA, DEFAULT_TOP_K, Settings},
    store::{IndexStore, StoreConfig},
    vector_index::{FlatIpIndex, dot},
};

/// Candidate pool sizing: headroom for re-ranking, MMR and dedup.
const CANDIDATE_MULTIPLIER: usize = 8;
const MIN_EXTRA_CANDIDATES: usize = 30;

/// Per-query budget clamp for multi-query fusion.
const MIN_PER_QUERY_K: usize = 4;
const MAX_PER_QUERY_K: usize = 14;

/// Score bonus per additional query variant that surfaced a source.
const FUSION_HIT_BONUS: f32 = 0.03;

/// Expanding-scan start K is at least this, and grows by this factor.
const EXPANDING_SCAN_FLOOR: usize = 200;
const EXPANDING_SCAN_GROWTH: f64 = 1.8;

/// An internal pipeline entry: a store position with its running score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pos: usize,
    pub score: f32,
    /// Raw relevance-model score, when the re-ranker touched this entry.
    pub rerank_score: Option<f32>,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDoc {
    pub content: String,
    pub metadata: ChunkMeta,
    pub score: f32,
    pub rerank_score: f32,
}

/// A category suggestion with its similarity and live chunk count.
#[derive(Debug, Clone, Serialize)]
pub struct CategorySuggestion {
    pub category: String,
    pub score: f32,
    pub chunk_count: usize,
}

/// Parameters for one search. `new` fills the defaults; callers override
/// fields directly.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub category: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub diversify_by_source: bool,
    pub use_mmr: bool,
    pub mmr_lambda: f32,
    pub use_reranker: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            category: None,
            date_from: None,
            date_to: None,
            diversify_by_source: true,
            use_mmr: true,
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            use_reranker: false,
        }
    }
}

/// Everything derived from one loaded store image. Rebuilt wholesale on
/// reload; never patched in place after a write.
struct SessionState {
    store_dir: PathBuf,
    index: FlatIpIndex,
    texts: Vec<String>,
    metas: Vec<ChunkMeta>,
    config: StoreConfig,
    filters: FilterCaches,
    /// Grow-only cache of exact sub-indexes for pure category filters.
    category_subindex: HashMap<String, (FlatIpIndex, Vec<usize>)>,
}

pub struct Retriever {
    data_dir: DataDir,
    settings: Settings,
    embedder: Box<dyn Embedder>,
    relevance: Option<Box<dyn RelevanceModel>>,
    catalog: CategoryCatalog,
    /// Category-description embeddings live for the whole process; a
    /// store reload does not invalidate them.
    description_vectors: Option<HashMap<String, Vec<f32>>>,
    state: Option<SessionState>,
}

impl Retriever {
    pub fn new(
        data_dir: DataDir,
        settings: Settings,
        embedder: Box<dyn Embedder>,
        relevance: Option<Box<dyn RelevanceModel>>,
        catalog: CategoryCatalog,
    ) -> Self {
        Self {
            data_dir,
            settings,
            embedder,
            relevance,
            catalog,
            description_vectors: None,
            state: None,
        }
    }

    /// The store directory this session resolves to.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir
            .store_dir(self.embedder.provider(), self.embedder.model())
    }

    /// Load the store, reusing the in-memory image unless forced or the
    /// resolved path changed. Search results only reflect writes made
    /// after the last load once the caller forces a reload.
    pub fn load(&mut self, force_reload: bool) -> Result<()> {
        let dir = self.store_dir();
        if !force_reload
            && self.state.as_ref().is_some_and(|s| s.store_dir == dir)
        {
            return Ok(());
        }

        let data = IndexStore::at(&dir).load()?;
        if data.config.embedding_dim != self.embedder.dimension() {
            return Err(Error::Config(format!(
                "store was built with dim {} but the provider reports dim {}",
                data.config.embedding_dim,
                self.embedder.dimension()
            )));
        }

        let filters = FilterCaches::build(&data.metas);
        self.state = Some(SessionState {
            store_dir: dir,
            index: data.index,
            texts: data.texts,
            metas: data.metas,
            config: data.config,
            filters,
            category_subindex: HashMap::new(),
        });
        Ok(())
    }

    /// Drop the in-memory image; the next operation reloads from disk.
    pub fn invalidate(&mut self) {
        self.state = None;
    }

    pub fn reload(&mut self) -> Result<()> {
        self.load(true)
    }

    /// The loaded store's config descriptor.
    pub fn config(&mut self) -> Result<StoreConfig> {
        self.load(false)?;
        Ok(self.state.as_ref().unwrap().config.clone())
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors =
            self.embedder.embed(&[query.to_string()], InputKind::Query)?;
        let mut vector = vectors.pop().ok_or_else(|| {
            Error::Provider("provider returned no query vector".to_string())
        })?;
        if !self.embedder.pre_normalized() {
            normalize_l2(&mut vector);
        }
        Ok(vector)
    }

    /// Run the full pipeline for one query.
    ///
    /// Returns an empty list (never an error) when the query is blank,
    /// `top_k` is zero, a filter eliminates every candidate, or the
    /// search exhausts without hits.
    pub fn search(&mut self, request: &SearchRequest) -> Result<Vec<RetrievedDoc>> {
        let query = clean_query(&request.query);
        if query.is_empty() || request.top_k == 0 {
            return Ok(vec![]);
        }

        self.load(false)?;
        let query_vector = self.embed_query(&query)?;

        let subset_limit = self.settings.subset_search_limit;
        let rerank_top_n = self.settings.rerank_top_n;
        let rerank_weight = self.settings.rerank_weight;

        let state = self.state.as_mut().unwrap();
        let plan = plan_filters(
            &state.filters,
            request.category.as_deref(),
            request.date_from.as_deref(),
            request.date_to.as_deref(),
        );
        if plan == FilterPlan::Empty {
            debug!(query = %query, "filters eliminated all candidates");
            return Ok(vec![]);
        }

        let candidate_n =
            candidate_pool(request.top_k, plan.eligible(state.index.len()));
        if candidate_n == 0 {
            return Ok(vec![]);
        }

        let mut ranked = vector_candidates(
            &state.index,
            &mut state.category_subindex,
            &query_vector,
            candidate_n,
            &plan,
            subset_limit,
        );
        if ranked.is_empty() {
            return Ok(vec![]);
        }

        if request.use_reranker {
            if let Some(model) = &self.relevance {
                ranked = apply_reranker(
                    model.as_ref(),
                    &query,
                    ranked,
                    &state.texts,
                    rerank_top_n,
                    rerank_weight,
                );
            } else {
                debug!("re-ranker requested but none is configured");
            }
        }

        if request.use_mmr {
            ranked = apply_mmr(
                &state.index,
                &ranked,
                (request.top_k * 2).max(request.top_k),
                request.mmr_lambda,
            );
        }

        let ranked = dedupe_by_source(
            ranked,
            &state.texts,
            &state.metas,
            request.top_k,
            request.diversify_by_source,
        );

        Ok(ranked
            .into_iter()
            .take(request.top_k)
            .map(|c| RetrievedDoc {
                content: state.texts[c.pos].clone(),
                metadata: state.metas[c.pos].clone(),
                score: c.score,
                rerank_score: c.rerank_score.unwrap_or(0.0),
            })
            .collect())
    }

    /// Search once per distinct query variant and fuse the results.
    ///
    /// The `template` supplies every parameter except the query string;
    /// per-query results are always source-diversified before fusion.
    pub fn multi_search(
        &mut self,
        queries: &[String],
        template: &SearchRequest,
    ) -> Result<Vec<RetrievedDoc>> {
        if template.top_k == 0 {
            return Ok(vec![]);
        }

        let unique = unique_preserve_order(queries);
        if unique.is_empty() {
            return Ok(vec![]);
        }

        let per_query_k = per_query_budget(template.top_k, unique.len());

        let mut result_lists = Vec::with_capacity(unique.len());
        for query in &unique {
            let mut request = template.clone();
            request.query = query.clone();
            request.top_k = per_query_k;
            request.diversify_by_source = true;
            result_lists.push(self.search(&request)?);
        }

        Ok(fuse_by_source(result_lists, template.top_k))
    }

    /// Categories whose scope description is semantically closest to the
    /// query, with their live chunk counts.
    pub fn suggest_categories(
        &mut self,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<CategorySuggestion>> {
        let query = clean_query(query);
        if query.is_empty() || top_n == 0 {
            return Ok(vec![]);
        }

        self.load(false)?;
        let counts: HashMap<String, usize> =
            self.get_categories(0)?.into_iter().collect();

        if self.description_vectors.is_none() {
            let mut vectors = HashMap::new();
            for (label, description) in self.catalog.iter() {
                vectors
                    .insert(label.to_string(), self.embed_query(description)?);
            }
            self.description_vectors = Some(vectors);
        }

        let query_vector = self.embed_query(&query)?;
        let descriptions = self.description_vectors.as_ref().unwrap();

        let mut scored: Vec<CategorySuggestion> = descriptions
            .iter()
            .map(|(label, vector)| CategorySuggestion {
                category: label.clone(),
                score: dot(&query_vector, vector),
                chunk_count: counts.get(label).copied().unwrap_or(0),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.category.cmp(&b.category))
        });
        scored.truncate(top_n);
        Ok(scored)
    }

    /// Chunk counts per catalog category, highest first.
    ///
    /// Multi-valued labels are split on `,` and `/`; only labels present
    /// in the catalog are counted.
    pub fn get_categories(
        &mut self,
        min_chunks: usize,
    ) -> Result<Vec<(String, usize)>> {
        self.load(false)?;
        let state = self.state.as_ref().unwrap();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for meta in &state.metas {
            let raw = &meta.doc.category;
            if raw.is_empty() {
                continue;
            }
            for part in raw.replace('/', ",").split(',') {
                let label = part.trim();
                if !label.is_empty() && self.catalog.contains(label) {
                    *counts.entry(label.to_string()).or_default() += 1;
                }
            }
        }

        let mut out: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, n)| *n >= min_chunks)
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }
}

fn clean_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Candidate pool size for a `top_k` request over `eligible` chunks.
fn candidate_pool(top_k: usize, eligible: usize) -> usize {
    if eligible == 0 {
        return 0;
    }
    eligible.min((top_k * CANDIDATE_MULTIPLIER).max(top_k + MIN_EXTRA_CANDIDATES))
}

fn per_query_budget(top_k: usize, query_count: usize) -> usize {
    MIN_PER_QUERY_K
        .max(MAX_PER_QUERY_K.min(top_k / query_count + 3))
}

/// Gather top-`top_n` (position, score) candidates under the filter plan.
///
/// Three strategies: unrestricted direct search; an exact temporary
/// sub-index for restriction sets up to `subset_limit` (cached per
/// category when the restriction is a pure category); and for larger sets
/// an expanding global scan that may under-return when the filter covers
/// a small fraction of a huge store.
fn vector_candidates(
    index: &FlatIpIndex,
    subindex_cache: &mut HashMap<String, (FlatIpIndex, Vec<usize>)>,
    query: &[f32],
    top_n: usize,
    plan: &FilterPlan,
    subset_limit: usize,
) -> Vec<Candidate> {
    let hits: Vec<(usize, f32)> = match plan {
        FilterPlan::Empty => vec![],
        FilterPlan::Unrestricted => index.search(query, top_n),
        FilterPlan::Restricted {
            positions,
            category_key,
        } => {
            if positions.is_empty() {
                vec![]
            } else if positions.len() <= subset_limit {
                let owned;
                let (sub, mapping) = match category_key {
                    Some(key) => {
                        let entry = subindex_cache
                            .entry(key.clone())
                            .or_insert_with(|| {
                                (index.subset(positions), positions.clone())
                            });
                        (&entry.0, &entry.1)
                    }
                    None => {
                        owned = (index.subset(positions), positions.clone());
                        (&owned.0, &owned.1)
                    }
                };
                sub.search(query, top_n)
                    .into_iter()
                    .map(|(local, score)| (mapping[local], score))
                    .collect()
            } else {
                expanding_scan(index, query, top_n, positions)
            }
        }
    };

    hits.into_iter()
        .map(|(pos, score)| Candidate {
            pos,
            score,
            rerank_score: None,
        })
        .collect()
}

fn expanding_scan(
    index: &FlatIpIndex,
    query: &[f32],
    top_n: usize,
    positions: &[usize],
) -> Vec<(usize, f32)> {
    let allowed: HashSet<usize> = positions.iter().copied().collect();
    let total = index.len();
    let mut k = total.min((top_n * 4).max(EXPANDING_SCAN_FLOOR));
    let mut found: HashMap<usize, f32> = HashMap::new();

    loop {
        for (pos, score) in index.search(query, k) {
            if allowed.contains(&pos) {
                found.insert(pos, score);
            }
        }
        if found.len() >= top_n || k >= total {
            break;
        }
        k = total.min(((k as f64 * EXPANDING_SCAN_GROWTH) as usize).max(k + 1));
    }

    let mut hits: Vec<(usize, f32)> = found.into_iter().collect();
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    hits.truncate(top_n);
    hits
}

/// Keep only the best-ranked chunk per source, preserving relative order,
/// until `top_k` distinct sources are collected.
fn dedupe_by_source(
    candidates: Vec<Candidate>,
    texts: &[String],
    metas: &[ChunkMeta],
    top_k: usize,
    diversify: bool,
) -> Vec<Candidate> {
    if !diversify {
        let mut out = candidates;
        out.truncate(top_k);
        return out;
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for candidate in candidates {
        let key = source_key(&metas[candidate.pos], &texts[candidate.pos]);
        if seen.insert(key) {
            out.push(candidate);
            if out.len() >= top_k {
                break;
            }
        }
    }
    out
}

/// Case-insensitive dedup of cleaned queries, first occurrence wins.
fn unique_preserve_order(queries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for query in queries {
        let cleaned = clean_query(query);
        let key = cleaned.to_lowercase();
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push(cleaned);
    }
    out
}

/// Merge per-query result lists by source key.
///
/// The best score seen for a source is kept; every additional query that
/// surfaced the source adds a small bonus to its ranking score. Returned
/// documents keep their original scores; only the ordering uses the
/// combined value.
fn fuse_by_source(
    result_lists: Vec<Vec<RetrievedDoc>>,
    top_k: usize,
) -> Vec<RetrievedDoc> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, RetrievedDoc> = HashMap::new();
    let mut hits: HashMap<String, usize> = HashMap::new();

    for docs in result_lists {
        for doc in docs {
            let key = source_key(&doc.metadata, &doc.content);

            let count = hits.entry(key.clone()).or_insert(0);
            if *count == 0 {
                order.push(key.clone());
            }
            *count += 1;

            let improves = best
                .get(&key)
                .is_none_or(|existing| doc.score > existing.score);
            if improves {
                best.insert(key, doc);
            }
        }
    }

    let mut ranked: Vec<(f32, RetrievedDoc)> = order
        .into_iter()
        .map(|key| {
            let doc = best.remove(&key).expect("key recorded on first sight");
            let bonus = FUSION_HIT_BONUS * (hits[&key] - 1) as f32;
            (doc.score + bonus, doc)
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.into_iter().take(top_k).map(|(_, doc)| doc).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::DocMeta;

    fn doc(url: &str, score: f32) -> RetrievedDoc {
        RetrievedDoc {
            content: format!("content for {url}"),
            metadata: ChunkMeta::new(
                DocMeta {
                    url: url.to_string(),
                    ..DocMeta::default()
                },
                0,
                0,
            ),
            score,
            rerank_score: 0.0,
        }
    }

    #[test]
    fn candidate_pool_sizing() {
        assert_eq!(candidate_pool(5, 0), 0);
        // max(5*8, 5+30) = 40, clamped by eligible count.
        assert_eq!(candidate_pool(5, 1000), 40);
        assert_eq!(candidate_pool(5, 20), 20);
        // Small top_k still gets the +30 headroom.
        assert_eq!(candidate_pool(2, 1000), 32);
    }

    #[test]
    fn per_query_budget_clamps() {
        assert_eq!(per_query_budget(5, 1), 8);
        assert_eq!(per_query_budget(5, 3), 4);
        assert_eq!(per_query_budget(60, 2), 14);
        assert_eq!(per_query_budget(1, 10), 4);
    }

    #[test]
    fn unique_preserve_order_dedupes_case_insensitively() {
        let queries = vec![
            "  Özgür   irade ".to_string(),
            "özgür irade".to_string(),
            "".to_string(),
            "determinizm".to_string(),
        ];
        assert_eq!(
            unique_preserve_order(&queries),
            vec!["Özgür irade".to_string(), "determinizm".to_string()]
        );
    }

    #[test]
    fn fusion_bonus_breaks_score_ties() {
        // Source A surfaces in 2 of 3 query results, B in 1; both at 0.80.
        let lists = vec![
            vec![doc("https://e.org/a", 0.80)],
            vec![doc("https://e.org/b", 0.80)],
            vec![doc("https://e.org/a", 0.78)],
        ];
        let fused = fuse_by_source(lists, 2);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].metadata.doc.url, "https://e.org/a");
        // The returned doc keeps its own best score; the 0.83 combined
        // value is only used for ordering.
        assert!((fused[0].score - 0.80).abs() < 1e-6);
        assert_eq!(fused[1].metadata.doc.url, "https://e.org/b");
    }

    #[test]
    fn fusion_keeps_best_score_per_source() {
        let lists = vec![
            vec![doc("https://e.org/a", 0.60)],
            vec![doc("https://e.org/a", 0.90)],
        ];
        let fused = fuse_by_source(lists, 5);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 0.90).abs() < 1e-6);
    }

    #[test]
    fn dedupe_collapses_same_source() {
        let texts: Vec<String> =
            (0..4).map(|i| format!("chunk {i}")).collect();
        let meta = |url: &str| {
            ChunkMeta::new(
                DocMeta {
                    url: url.to_string(),
                    ..DocMeta::default()
                },
                0,
                0,
            )
        };
        let metas = vec![
            meta("https://e.org/a"),
            meta("https://e.org/a"),
            meta("https://e.org/b"),
            meta("https://e.org/c"),
        ];
        let candidates: Vec<Candidate> = (0..4)
            .map(|pos| Candidate {
                pos,
                score: 1.0 - pos as f32 * 0.1,
                rerank_score: None,
            })
            .collect();

        let out =
            dedupe_by_source(candidates.clone(), &texts, &metas, 2, true);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].pos, 0);
        assert_eq!(out[1].pos, 2);

        // Dedup disabled: plain truncation.
        let out = dedupe_by_source(candidates, &texts, &metas, 2, false);
        assert_eq!(out[1].pos, 1);
    }

    #[test]
    fn expanding_scan_finds_filtered_hits() {
        // Unit vectors fanned over [0, 5) radians; the query points at
        // angle 0, so positions near π score worst.
        let mut index = FlatIpIndex::new(2);
        for i in 0..250 {
            let angle = i as f32 * 0.02;
            index.add(&[angle.cos(), angle.sin()]).unwrap();
        }
        // The allowed set sits squarely in the bottom 50 scores, outside
        // the initial K=200 window, forcing an expansion round.
        let positions: Vec<usize> = (150..160).collect();
        let hits = expanding_scan(&index, &[1.0, 0.0], 5, &positions);
        assert_eq!(hits.len(), 5);
        for (pos, _) in &hits {
            assert!(positions.contains(pos));
        }
        // Best allowed hit is the one farthest from π.
        assert_eq!(hits[0].0, 150);
    }

    #[test]
    fn vector_candidates_subset_uses_category_cache() {
        let mut index = FlatIpIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[0.7, 0.7]).unwrap();

        let mut cache = HashMap::new();
        let plan = FilterPlan::Restricted {
            positions: vec![1, 2],
            category_key: Some("etik".to_string()),
        };

        let hits = vector_candidates(
            &index,
            &mut cache,
            &[1.0, 0.0],
            2,
            &plan,
            12_000,
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].pos, 2);
        assert_eq!(hits[1].pos, 1);
        assert!(cache.contains_key("etik"), "sub-index should be cached");

        // Second call hits the cache (same mapping, same results).
        let again = vector_candidates(
            &index,
            &mut cache,
            &[1.0, 0.0],
            2,
            &plan,
            12_000,
        );
        assert_eq!(again[0].pos, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clean_query_collapses_whitespace() {
        assert_eq!(clean_query("  a\t b\n  c "), "a b c");
        assert_eq!(clean_query("   "), "");
    }
}
