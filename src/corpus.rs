//! Document loading from a scraped content dump.
//!
//! The dump is a directory tree of `.txt` files, one per article, each
//! starting with a header block (`TITLE:` / `URL:` / `DATE:` / `AUTHOR:` /
//! `CATEGORIES:`) terminated by a `-----` line; everything after the
//! separator is the body. The immediate parent directory doubles as the
//! document's primary category label.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::warn;

use crate::{error::Result, meta::DocMeta};

/// A (body, metadata) pair produced by a document source.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub body: String,
    pub meta: DocMeta,
}

/// Anything that can yield documents for indexing.
pub trait DocumentSource {
    fn load(&self) -> Result<Vec<SourceDocument>>;
}

/// Document source over a content dump directory.
#[derive(Debug, Clone)]
pub struct DumpDir {
    root: PathBuf,
}

impl DumpDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DocumentSource for DumpDir {
    /// Load every `.txt` file under the root.
    ///
    /// Files are read in parallel but returned in path order, so repeated
    /// scans of an unchanged dump yield an identical document sequence.
    /// A file that cannot be read or decoded is logged and skipped; it
    /// never aborts the pass.
    fn load(&self) -> Result<Vec<SourceDocument>> {
        let files = discover_txt_files(&self.root)?;

        let documents: Vec<SourceDocument> = files
            .par_iter()
            .filter_map(|path| match std::fs::read_to_string(path) {
                Ok(content) => Some(parse_dump_file(&self.root, path, &content)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable document");
                    None
                }
            })
            .collect();

        Ok(documents)
    }
}

/// Recursively collect `.txt` files, skipping hidden entries, sorted by
/// path for deterministic ordering.
fn discover_txt_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    walk_dir(root, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(current: &Path, results: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_dir(&path, results)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("txt") {
            results.push(path);
        }
    }
    Ok(())
}

/// Parse one dump file into body + metadata.
fn parse_dump_file(root: &Path, path: &Path, content: &str) -> SourceDocument {
    let mut meta = DocMeta::default();
    let lines: Vec<&str> = content.split('\n').collect();
    let mut body_start = 0;

    for (i, line) in lines.iter().enumerate() {
        if let Some(v) = line.strip_prefix("TITLE:") {
            meta.title = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("URL:") {
            meta.url = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("DATE:") {
            meta.date = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("AUTHOR:") {
            meta.author = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("CATEGORIES:") {
            meta.categories = v.trim().to_string();
        } else if line.trim() == "-----" {
            body_start = i + 1;
            break;
        }
    }

    let body = lines[body_start..].join("\n").trim().to_string();

    meta.category = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    meta.filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    meta.relative_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    SourceDocument { body, meta }
}
