//! Maximal Marginal Relevance selection.
//!
//! Trades relevance against redundancy: after seeding with the single most
//! relevant candidate, each round picks the unselected candidate maximizing
//! `λ·relevance − (1−λ)·max_similarity_to_selected`. Selection order is not
//! the output order; the chosen set is re-sorted by original relevance.

use crate::{
    embedding::normalize_l2,
    retriever::Candidate,
    vector_index::{FlatIpIndex, dot},
};

/// Cap on how many top candidates MMR actually processes.
fn pool_size(candidate_count: usize, top_k: usize) -> usize {
    candidate_count.min((top_k * 8).max(40))
}

/// Select up to `top_k` candidates, diversity-aware.
///
/// No-op when the candidate list already fits in `top_k`. If the working
/// pool is smaller than `top_k`, the remainder is padded with the next
/// candidates by relevance, unprocessed by MMR.
pub fn apply_mmr(
    index: &FlatIpIndex,
    candidates: &[Candidate],
    top_k: usize,
    lambda: f32,
) -> Vec<Candidate> {
    if top_k == 0 {
        return vec![];
    }
    if candidates.len() <= top_k {
        return candidates.to_vec();
    }

    let pool_len = pool_size(candidates.len(), top_k);
    let pool = &candidates[..pool_len];

    // Similarity is computed over unit vectors regardless of what the
    // index holds.
    let vectors: Vec<Vec<f32>> = pool
        .iter()
        .map(|c| {
            let mut v = index.reconstruct(c.pos).to_vec();
            normalize_l2(&mut v);
            v
        })
        .collect();

    let mut selected: Vec<usize> = Vec::new();
    let mut chosen = vec![false; pool_len];

    // Seed with the highest relevance; earliest index wins ties.
    let first = (0..pool_len)
        .max_by(|&a, &b| {
            pool[a]
                .score
                .partial_cmp(&pool[b].score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.cmp(&a))
        })
        .unwrap_or(0);
    selected.push(first);
    chosen[first] = true;

    while selected.len() < top_k.min(pool_len) {
        let mut best_idx = None;
        let mut best_score = f32::NEG_INFINITY;

        for i in 0..pool_len {
            if chosen[i] {
                continue;
            }
            let redundancy = selected
                .iter()
                .map(|&s| dot(&vectors[i], &vectors[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let mmr_score =
                lambda * pool[i].score - (1.0 - lambda) * redundancy;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(i) => {
                selected.push(i);
                chosen[i] = true;
            }
            None => break,
        }
    }

    let mut picked: Vec<Candidate> =
        selected.iter().map(|&i| pool[i].clone()).collect();
    picked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Pad from beyond the pool only when the pool could not fill top_k.
    let mut extras = pool_len;
    while picked.len() < top_k && extras < candidates.len() {
        picked.push(candidates[extras].clone());
        extras += 1;
    }

    picked.truncate(top_k);
    picked
}
