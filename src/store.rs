//! Durable index store: one directory per provider+model holding the
//! vector blob, the position-aligned text and metadata tables, and a
//! config descriptor.
//!
//! Layout inside the store directory:
//! - `vectors.bin`: 16-byte header (magic, dim u32 LE, count u64 LE)
//!   followed by row-major f32 LE values
//! - `store.redb`: redb tables `texts: u64 -> &str` and
//!   `metadata: u64 -> &[u8]` (JSON), keyed by row position
//! - `config.json`: provider/model identity, dimensionality, chunk
//!   strategy and chunk count
//!
//! Saves are wholesale and non-transactional: a crash mid-save can leave
//! the three artifacts mutually inconsistent. Positions are append-only
//! and never reused, so readers loaded before a save simply see a prefix.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    meta::ChunkMeta,
    vector_index::FlatIpIndex,
};

const TEXTS: TableDefinition<u64, &str> = TableDefinition::new("texts");
const METADATA: TableDefinition<u64, &[u8]> = TableDefinition::new("metadata");

const VECTORS_MAGIC: &[u8; 4] = b"DVEC";
const VECTORS_HEADER: usize = 16;

/// Descriptor persisted alongside the store so later runs can verify they
/// are talking to the same embedding space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub chunk_strategy: String,
    pub num_chunks: usize,
}

/// The full in-memory image of a store: three position-aligned sequences
/// plus the descriptor.
#[derive(Debug)]
pub struct StoreData {
    pub index: FlatIpIndex,
    pub texts: Vec<String>,
    pub metas: Vec<ChunkMeta>,
    pub config: StoreConfig,
}

/// Handle to a store directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a built store exists at this location.
    pub fn exists(&self) -> bool {
        self.dir.join("vectors.bin").exists()
    }

    /// Load all four artifacts, validating position alignment.
    pub fn load(&self) -> Result<StoreData> {
        if !self.exists() {
            return Err(Error::IndexNotFound(self.dir.clone()));
        }

        let index = read_vectors(&self.dir.join("vectors.bin"))?;

        let db = Database::create(self.dir.join("store.redb"))?;
        let txn = db.begin_read()?;

        let texts_table = txn.open_table(TEXTS)?;
        let mut texts = Vec::new();
        for entry in texts_table.iter()? {
            let (_, v) = entry?;
            texts.push(v.value().to_string());
        }

        let meta_table = txn.open_table(METADATA)?;
        let mut metas = Vec::new();
        for entry in meta_table.iter()? {
            let (_, v) = entry?;
            metas.push(serde_json::from_slice(v.value())?);
        }

        let config_raw = std::fs::read_to_string(self.dir.join("config.json"))?;
        let config: StoreConfig = serde_json::from_str(&config_raw)?;

        if texts.len() != index.len() || metas.len() != index.len() {
            return Err(Error::Corrupt(format!(
                "misaligned sequences: {} vectors, {} texts, {} metadata records",
                index.len(),
                texts.len(),
                metas.len()
            )));
        }

        Ok(StoreData {
            index,
            texts,
            metas,
            config,
        })
    }

    /// Persist all four artifacts wholesale, replacing any previous state.
    pub fn save(&self, data: &StoreData) -> Result<()> {
        if data.texts.len() != data.index.len()
            || data.metas.len() != data.index.len()
        {
            return Err(Error::Corrupt(format!(
                "refusing to save misaligned sequences: {} vectors, {} texts, {} metadata records",
                data.index.len(),
                data.texts.len(),
                data.metas.len()
            )));
        }

        std::fs::create_dir_all(&self.dir)?;

        write_vectors(&self.dir.join("vectors.bin"), &data.index)?;

        // Rewrite the table file from scratch; the previous image is fully
        // contained in `data` anyway.
        let db_path = self.dir.join("store.redb");
        if db_path.exists() {
            std::fs::remove_file(&db_path)?;
        }
        let db = Database::create(&db_path)?;
        let txn = db.begin_write()?;
        {
            let mut texts_table = txn.open_table(TEXTS)?;
            for (i, text) in data.texts.iter().enumerate() {
                texts_table.insert(i as u64, text.as_str())?;
            }
            let mut meta_table = txn.open_table(METADATA)?;
            for (i, meta) in data.metas.iter().enumerate() {
                let bytes = serde_json::to_vec(meta)?;
                meta_table.insert(i as u64, bytes.as_slice())?;
            }
        }
        txn.commit()?;

        let config_json = serde_json::to_string_pretty(&data.config)?;
        std::fs::write(self.dir.join("config.json"), config_json)?;

        Ok(())
    }
}

fn write_vectors(path: &Path, index: &FlatIpIndex) -> Result<()> {
    let data = index.as_slice();
    let mut bytes = Vec::with_capacity(VECTORS_HEADER + data.len() * 4);
    bytes.extend_from_slice(VECTORS_MAGIC);
    bytes.extend_from_slice(&(index.dim() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend_from_slice(bytemuck::cast_slice(data));
    std::fs::write(path, bytes)?;
    Ok(())
}

fn read_vectors(path: &Path) -> Result<FlatIpIndex> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < VECTORS_HEADER || &bytes[0..4] != VECTORS_MAGIC {
        return Err(Error::Corrupt(format!(
            "{} is not a vector blob",
            path.display()
        )));
    }

    let dim = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let count = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;

    let expected = VECTORS_HEADER + count * dim * 4;
    if bytes.len() != expected || dim == 0 {
        return Err(Error::Corrupt(format!(
            "vector blob {} has {} bytes, expected {expected}",
            path.display(),
            bytes.len()
        )));
    }

    let floats: Vec<f32> = bytes[VECTORS_HEADER..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect();

    FlatIpIndex::from_rows(dim, floats)
}
