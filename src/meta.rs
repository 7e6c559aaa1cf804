use serde::{Deserialize, Serialize};

/// Metadata parsed from a source document's header block.
///
/// All fields default to empty strings; the dump format is lenient and a
/// missing header line simply leaves its field blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub author: String,
    /// Raw multi-valued label string from the `CATEGORIES:` header.
    #[serde(default)]
    pub categories: String,
    /// Primary label, derived from the source directory name.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub relative_path: String,
}

/// One store row's metadata: the owning document's fields plus the chunk's
/// ordinals. Positions in the store are implicit (the row index); these
/// records are what filters and result formatting read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    #[serde(flatten)]
    pub doc: DocMeta,
    /// Zero-based chunk ordinal within the owning document.
    #[serde(default)]
    pub chunk_idx: usize,
    /// Ordinal of the owning document within the corpus scan.
    #[serde(default)]
    pub doc_idx: usize,
}

impl ChunkMeta {
    pub fn new(doc: DocMeta, chunk_idx: usize, doc_idx: usize) -> Self {
        Self {
            doc,
            chunk_idx,
            doc_idx,
        }
    }
}

/// Stable identity used to decide whether a document is already indexed.
///
/// Derived from content-independent metadata so a re-ordered re-scan of the
/// same corpus never duplicates rows: URL+category when a URL exists, else
/// the relative path, else filename+category.
///
/// # Examples
///
/// ```
/// use derlem::meta::{DocMeta, doc_identity};
///
/// let mut meta = DocMeta::default();
/// meta.url = "https://example.org/yazi/1".to_string();
/// meta.category = "Etik".to_string();
/// assert_eq!(
///     doc_identity(&meta),
///     "url::https://example.org/yazi/1::cat::etik"
/// );
/// ```
pub fn doc_identity(meta: &DocMeta) -> String {
    let url = meta.url.trim();
    let category = meta.category.trim().to_lowercase();
    if !url.is_empty() {
        return format!("url::{url}::cat::{category}");
    }

    let rel = meta.relative_path.trim();
    if !rel.is_empty() {
        return format!("path::{rel}");
    }

    format!("file::{}::cat::{category}", meta.filename.trim())
}

/// Source key for deduplication and fusion: URL, else filename, else a
/// text prefix. Chunks of one document share the key; unrelated documents
/// almost never collide.
pub fn source_key(meta: &ChunkMeta, content: &str) -> String {
    let url = meta.doc.url.trim();
    if !url.is_empty() {
        return format!("url::{url}");
    }
    let filename = meta.doc.filename.trim();
    if !filename.is_empty() {
        return format!("file::{filename}");
    }
    let prefix: String = content.chars().take(120).collect();
    format!("text::{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, rel: &str, filename: &str, cat: &str) -> DocMeta {
        DocMeta {
            url: url.to_string(),
            relative_path: rel.to_string(),
            filename: filename.to_string(),
            category: cat.to_string(),
            ..DocMeta::default()
        }
    }

    #[test]
    fn identity_prefers_url() {
        let m = doc("https://e.org/a", "Etik/a.txt", "a.txt", "Etik");
        assert_eq!(doc_identity(&m), "url::https://e.org/a::cat::etik");
    }

    #[test]
    fn identity_falls_back_to_path_then_filename() {
        let m = doc("", "Etik/a.txt", "a.txt", "Etik");
        assert_eq!(doc_identity(&m), "path::Etik/a.txt");

        let m = doc("", "", "a.txt", "Etik");
        assert_eq!(doc_identity(&m), "file::a.txt::cat::etik");
    }

    #[test]
    fn identity_independent_of_scan_order() {
        let a = doc("https://e.org/a", "x/1.txt", "1.txt", "Etik");
        let b = doc("https://e.org/a", "y/9.txt", "9.txt", "Etik");
        assert_eq!(doc_identity(&a), doc_identity(&b));
    }

    #[test]
    fn source_key_precedence() {
        let with_url = ChunkMeta::new(doc("https://e.org/a", "", "a.txt", ""), 0, 0);
        assert_eq!(source_key(&with_url, "body"), "url::https://e.org/a");

        let with_file = ChunkMeta::new(doc("", "", "a.txt", ""), 0, 0);
        assert_eq!(source_key(&with_file, "body"), "file::a.txt");

        let bare = ChunkMeta::new(DocMeta::default(), 0, 0);
        assert_eq!(source_key(&bare, "some body text"), "text::some body text");
    }

    #[test]
    fn source_key_text_prefix_is_char_bounded() {
        let bare = ChunkMeta::new(DocMeta::default(), 0, 0);
        let long = "ş".repeat(500);
        let key = source_key(&bare, &long);
        assert_eq!(key, format!("text::{}", "ş".repeat(120)));
    }

    #[test]
    fn chunk_meta_serde_roundtrip() {
        let meta = ChunkMeta::new(
            doc("https://e.org/a", "Etik/a.txt", "a.txt", "Etik"),
            2,
            7,
        );
        let bytes = serde_json::to_vec(&meta).unwrap();
        let back: ChunkMeta = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(meta, back);
    }
}
