//! Chunking strategies for splitting document bodies into retrieval units.
//!
//! Three strategies are supported: whole-document, fixed character windows
//! with overlap, and paragraph packing. Output is deterministic for
//! identical input and settings, which incremental updates rely on to keep
//! document identity stable across runs.

use crate::settings::ChunkingSettings;

/// How a document body is split before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ChunkStrategy {
    /// The whole body as a single chunk (unless empty).
    Document,
    /// Fixed windows with overlap, snapped to sentence ends.
    Character,
    /// Blank-line paragraphs, re-split and merged towards a target size.
    Paragraph,
}

impl ChunkStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Some(Self::Document),
            "character" => Some(Self::Character),
            "paragraph" => Some(Self::Paragraph),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Character => "character",
            Self::Paragraph => "paragraph",
        }
    }
}

/// Split `text` according to the configured strategy.
///
/// # Examples
///
/// ```
/// use derlem::chunking::{chunk_text, ChunkStrategy};
/// use derlem::settings::ChunkingSettings;
///
/// let mut settings = ChunkingSettings::default();
/// settings.strategy = ChunkStrategy::Document;
/// let chunks = chunk_text("One short document.", &settings);
/// assert_eq!(chunks, vec!["One short document.".to_string()]);
/// ```
pub fn chunk_text(text: &str, settings: &ChunkingSettings) -> Vec<String> {
    match settings.strategy {
        ChunkStrategy::Document => chunk_document(text),
        ChunkStrategy::Character => {
            chunk_character(text, settings.chunk_size, settings.chunk_overlap)
        }
        ChunkStrategy::Paragraph => chunk_paragraph(
            text,
            settings.min_paragraph_len,
            settings.max_paragraph_len,
        ),
    }
}

fn chunk_document(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        vec![]
    } else {
        vec![trimmed.to_string()]
    }
}

/// Fixed-size windows measured in characters.
///
/// When a window boundary falls mid-sentence, it is pulled back to the last
/// sentence end inside the window, provided that end lies in the back half
/// of the window. Consecutive windows overlap by `overlap` characters.
fn chunk_character(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = start + size;

        if end < chars.len()
            && let Some(rel) = chars[start..end]
                .iter()
                .rposition(|c| matches!(c, '.' | '?' | '!'))
        {
            let sentence_end = start + rel;
            if sentence_end > start + size / 2 {
                end = sentence_end + 1;
            }
        }

        let slice_end = end.min(chars.len());
        let chunk: String = chars[start..slice_end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        let next = end.saturating_sub(overlap);
        if next >= chars.len() {
            break;
        }
        // Guard against non-advancing windows under degenerate settings.
        start = if next > start { next } else { slice_end };
    }

    chunks
}

/// Paragraph packing: split on blank lines, re-split oversized paragraphs
/// at sentence boundaries, greedily merge undersized neighbours, and fold
/// any still-tiny chunk into its predecessor when it fits.
fn chunk_paragraph(text: &str, min_len: usize, max_len: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = split_blank_lines(text);
    if paragraphs.is_empty() {
        return vec![];
    }

    let mut segments = Vec::new();
    for para in &paragraphs {
        segments.extend(split_long_paragraph(para, max_len));
    }

    // Greedy merge towards max_len, joining with a blank line.
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for segment in segments {
        if current.is_empty() {
            current = segment;
            continue;
        }
        if char_len(&current) + 2 + char_len(&segment) <= max_len {
            current.push_str("\n\n");
            current.push_str(&segment);
        } else {
            chunks.push(std::mem::replace(&mut current, segment));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    // Fold chunks below the minimum into their predecessor when it fits.
    let mut merged: Vec<String> = Vec::new();
    for chunk in chunks {
        if let Some(prev) = merged.last_mut()
            && char_len(&chunk) < min_len
            && char_len(prev) + 2 + char_len(&chunk) <= max_len
        {
            prev.push_str("\n\n");
            prev.push_str(&chunk);
        } else {
            merged.push(chunk);
        }
    }

    merged.retain(|c| !c.trim().is_empty());
    merged
}

fn split_blank_lines(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(pos) = find_blank_line(rest) {
        let (head, tail) = rest.split_at(pos.0);
        let head = head.trim();
        if !head.is_empty() {
            out.push(head);
        }
        rest = &tail[pos.1 - pos.0..];
    }
    let tail = rest.trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Locate the next blank-line separator (`\n`, optional horizontal
/// whitespace, one or more further `\n`). Returns (start, end) byte
/// offsets of the separator.
fn find_blank_line(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let start = i;
            let mut j = i + 1;
            let mut newlines = 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\n' => {
                        newlines += 1;
                        j += 1;
                    }
                    b' ' | b'\t' | b'\r' => j += 1,
                    _ => break,
                }
            }
            if newlines >= 2 {
                return Some((start, j));
            }
            i = j;
        } else {
            i += 1;
        }
    }
    None
}

fn split_long_paragraph(paragraph: &str, max_len: usize) -> Vec<String> {
    if char_len(paragraph) <= max_len {
        return vec![paragraph.to_string()];
    }

    let sentences = split_sentences(paragraph);
    if sentences.is_empty() {
        return hard_cut(paragraph, max_len);
    }

    // Pack sentences greedily up to max_len.
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    for sentence in sentences {
        if current.is_empty() {
            current = sentence;
            continue;
        }
        if char_len(&current) + 1 + char_len(&sentence) <= max_len {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            parts.push(std::mem::replace(&mut current, sentence));
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    // A single sentence can still exceed the budget (no punctuation at
    // all, or one enormous sentence); hard-cut those so no chunk ever
    // leaves here oversized.
    parts
        .into_iter()
        .flat_map(|p| {
            if char_len(&p) > max_len {
                hard_cut(&p, max_len)
            } else {
                vec![p]
            }
        })
        .collect()
}

/// Split after `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|n| n.is_whitespace())
        {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            let s = current.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
            current.clear();
        }
    }

    let s = current.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
    out
}

fn hard_cut(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len.max(1))
        .map(|window| window.iter().collect())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ChunkingSettings;

    fn paragraph_settings() -> ChunkingSettings {
        ChunkingSettings {
            strategy: ChunkStrategy::Paragraph,
            ..ChunkingSettings::default()
        }
    }

    #[test]
    fn document_strategy_single_chunk() {
        assert_eq!(chunk_document("  hello  "), vec!["hello".to_string()]);
        assert!(chunk_document("   \n ").is_empty());
    }

    #[test]
    fn character_short_text_unsplit() {
        let chunks = chunk_character("Hello, world!", 1000, 200);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn character_snaps_to_sentence_end() {
        // One sentence end well past the midpoint of the window.
        let text = format!("{} Sonra devam eder.{}", "a".repeat(700), "b".repeat(600));
        let chunks = chunk_character(&text, 1000, 200);
        assert!(chunks.len() >= 2);
        assert!(
            chunks[0].ends_with('.'),
            "first window should snap to the sentence end"
        );
    }

    #[test]
    fn character_windows_overlap() {
        let text = "kelime ".repeat(400); // 2800 chars, no sentence ends
        let chunks = chunk_character(&text, 1000, 200);
        assert!(chunks.len() >= 3);
        // Overlap means the tail of one window reappears in the next.
        let tail: String = chunks[0].chars().rev().take(50).collect();
        let tail: String = tail.chars().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn character_multibyte_safe() {
        let text = "şiir ve müzik üzerine ".repeat(100);
        let chunks = chunk_character(&text, 300, 50);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 300);
        }
    }

    #[test]
    fn paragraph_merges_small_paragraphs() {
        let text = "Kısa paragraf bir.\n\nKısa paragraf iki.\n\nKısa paragraf üç.";
        let chunks = chunk_paragraph(text, 100, 3000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("bir.") && chunks[0].contains("üç."));
    }

    #[test]
    fn paragraph_splits_oversized_at_sentences() {
        let sentence = "Bu cümle tam olarak kırk karakter içerir!!! ";
        let text = sentence.repeat(100); // ~4400 chars, one paragraph
        let chunks = chunk_paragraph(&text, 100, 3000);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.chars().count() <= 3000, "chunk exceeds max length");
        }
    }

    #[test]
    fn paragraph_hard_cuts_unsplittable_text() {
        // 5000 chars, no punctuation, no blank lines: the sentence splitter
        // finds nothing and the hard cut must bound every chunk.
        let text = "a".repeat(5000);
        let chunks = chunk_paragraph(&text, 100, 3000);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(
                c.chars().count() <= 3000,
                "hard cut must bound chunk length"
            );
        }
    }

    #[test]
    fn paragraph_folds_trailing_fragment() {
        let big = "Cümle. ".repeat(400); // ~2800 chars
        let text = format!("{}\n\nKüçük ek.", big.trim());
        let chunks = chunk_paragraph(&text, 100, 3000);
        // The 10-char tail is below min length and fits the predecessor.
        assert!(chunks.last().unwrap().ends_with("Küçük ek."));
    }

    #[test]
    fn paragraph_empty_input() {
        assert!(chunk_paragraph("", 100, 3000).is_empty());
        assert!(chunk_paragraph("\n\n  \n\n", 100, 3000).is_empty());
    }

    #[test]
    fn deterministic_output() {
        let settings = paragraph_settings();
        let text = "Paragraf bir burada.\n\nParagraf iki burada.\n\n".repeat(30);
        let a = chunk_text(&text, &settings);
        let b = chunk_text(&text, &settings);
        assert_eq!(a, b);
    }

    #[test]
    fn strategy_parse_roundtrip() {
        for s in [
            ChunkStrategy::Document,
            ChunkStrategy::Character,
            ChunkStrategy::Paragraph,
        ] {
            assert_eq!(ChunkStrategy::parse(s.as_str()), Some(s));
        }
        assert_eq!(ChunkStrategy::parse("sentence"), None);
    }
}
