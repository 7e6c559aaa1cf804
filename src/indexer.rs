//! Index building: full rebuild and incremental update.
//!
//! Both paths share the same shape: chunk documents, embed the chunks in
//! batches, normalize when the provider does not, and persist the store
//! wholesale. The incremental path additionally skips documents whose
//! identity is already present, so re-running it over an unchanged corpus
//! is a no-op.

use std::collections::HashSet;

use kdam::{BarExt, tqdm};
use tracing::info;

use crate::{
    chunking::chunk_text,
    corpus::{DocumentSource, SourceDocument},
    embedding::{Embedder, InputKind, normalize_l2},
    error::Result,
    meta::{ChunkMeta, doc_identity},
    settings::Settings,
    store::{IndexStore, StoreConfig, StoreData},
    vector_index::FlatIpIndex,
};

/// Outcome of a build or update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    /// Chunks added by this run.
    pub added_chunks: usize,
    /// Total chunks in the store after the run.
    pub total_chunks: usize,
    /// Documents skipped because they were already indexed.
    pub skipped_documents: usize,
}

/// Chunk a document set, tagging each chunk with its ordinals.
/// `base_doc_idx` offsets document ordinals for incremental appends.
fn chunk_documents(
    documents: &[SourceDocument],
    settings: &Settings,
    base_doc_idx: usize,
) -> Result<(Vec<String>, Vec<ChunkMeta>)> {
    let mut texts = Vec::new();
    let mut metas = Vec::new();

    let mut progress = tqdm!(total = documents.len(), desc = "chunking");
    for (doc_idx, doc) in documents.iter().enumerate() {
        let chunks = chunk_text(&doc.body, &settings.chunking);
        for (chunk_idx, chunk) in chunks.into_iter().enumerate() {
            metas.push(ChunkMeta::new(
                doc.meta.clone(),
                chunk_idx,
                base_doc_idx + doc_idx,
            ));
            texts.push(chunk);
        }
        progress.update(1)?;
    }

    Ok((texts, metas))
}

/// Embed chunk texts in fixed-size batches.
///
/// A provider failure aborts the in-flight batch and propagates; partial
/// results are discarded and nothing is retried here.
fn embed_chunks(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());

    let mut progress = tqdm!(total = texts.len(), desc = "embedding");
    for batch in texts.chunks(batch_size.max(1)) {
        let mut batch_vectors = embedder.embed(batch, InputKind::Passage)?;
        if !embedder.pre_normalized() {
            for v in &mut batch_vectors {
                normalize_l2(v);
            }
        }
        vectors.extend(batch_vectors);
        progress.update(batch.len())?;
    }

    Ok(vectors)
}

fn store_config(
    embedder: &dyn Embedder,
    settings: &Settings,
    num_chunks: usize,
) -> StoreConfig {
    StoreConfig {
        embedding_provider: embedder.provider().to_string(),
        embedding_model: embedder.model().to_string(),
        embedding_dim: embedder.dimension(),
        chunk_strategy: settings.chunking.strategy.as_str().to_string(),
        num_chunks,
    }
}

/// Full rebuild: chunk and embed every document, then replace the store.
pub fn build_index(
    source: &dyn DocumentSource,
    embedder: &dyn Embedder,
    store: &IndexStore,
    settings: &Settings,
) -> Result<BuildReport> {
    let documents = source.load()?;
    info!(documents = documents.len(), "loaded corpus");

    let (texts, metas) = chunk_documents(&documents, settings, 0)?;
    info!(chunks = texts.len(), "chunked corpus");

    if texts.is_empty() {
        return Ok(BuildReport {
            added_chunks: 0,
            total_chunks: 0,
            skipped_documents: 0,
        });
    }

    let vectors = embed_chunks(embedder, &texts, settings.embed_batch_size)?;

    let mut index = FlatIpIndex::new(embedder.dimension());
    for v in &vectors {
        index.add(v)?;
    }

    let total = texts.len();
    let data = StoreData {
        index,
        texts,
        metas,
        config: store_config(embedder, settings, total),
    };
    store.save(&data)?;

    info!(chunks = total, dir = %store.dir().display(), "index built");
    Ok(BuildReport {
        added_chunks: total,
        total_chunks: total,
        skipped_documents: 0,
    })
}

/// Incremental update: append chunks for documents not yet indexed.
///
/// Degrades to a full build when no store exists. Returns a zero-added
/// report when every loaded document is already present.
pub fn update_index(
    source: &dyn DocumentSource,
    embedder: &dyn Embedder,
    store: &IndexStore,
    settings: &Settings,
) -> Result<BuildReport> {
    if !store.exists() {
        info!("no existing store, building from scratch");
        return build_index(source, embedder, store, settings);
    }

    let mut data = store.load()?;

    let indexed: HashSet<String> =
        data.metas.iter().map(|m| doc_identity(&m.doc)).collect();

    let documents = source.load()?;
    let total_seen = documents.len();
    let new_docs: Vec<SourceDocument> = documents
        .into_iter()
        .filter(|d| !indexed.contains(&doc_identity(&d.meta)))
        .collect();
    let skipped = total_seen - new_docs.len();

    if new_docs.is_empty() {
        info!(indexed = indexed.len(), "index already up to date");
        return Ok(BuildReport {
            added_chunks: 0,
            total_chunks: data.texts.len(),
            skipped_documents: skipped,
        });
    }

    info!(
        new = new_docs.len(),
        skipped, "indexing new documents"
    );

    let (new_texts, new_metas) =
        chunk_documents(&new_docs, settings, indexed.len())?;
    if new_texts.is_empty() {
        return Ok(BuildReport {
            added_chunks: 0,
            total_chunks: data.texts.len(),
            skipped_documents: skipped,
        });
    }

    let vectors =
        embed_chunks(embedder, &new_texts, settings.embed_batch_size)?;
    for v in &vectors {
        data.index.add(v)?;
    }

    let added = new_texts.len();
    data.texts.extend(new_texts);
    data.metas.extend(new_metas);
    data.config = store_config(embedder, settings, data.texts.len());
    store.save(&data)?;

    info!(
        added,
        total = data.texts.len(),
        dir = %store.dir().display(),
        "index updated"
    );
    Ok(BuildReport {
        added_chunks: added,
        total_chunks: data.texts.len(),
        skipped_documents: skipped,
    })
}
