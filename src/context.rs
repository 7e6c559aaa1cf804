//! Rendering ranked results into prompt-ready context blocks.

use crate::retriever::RetrievedDoc;

pub const CONTEXT_MAX_CHARS: usize = 12_000;
pub const CONTEXT_MAX_CHARS_PER_DOC: usize = 1500;

const UNTITLED: &str = "Bilinmiyor";

/// Clip `text` to at most `max_chars`, backing up to the last word
/// boundary and appending an ellipsis.
fn clip_at_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(' ') {
        Some(pos) => cut[..pos].trim_end(),
        None => cut.trim_end(),
    };
    format!("{trimmed}...")
}

/// Render documents into a single numbered context block.
///
/// Each entry gets a `[Kaynak N]` header carrying title, author, category
/// and date when present. The total output never exceeds `max_total_chars`;
/// rendering stops at the first document that would overflow the budget.
pub fn format_context(
    docs: &[RetrievedDoc],
    max_total_chars: usize,
    max_chars_per_doc: usize,
) -> String {
    if docs.is_empty() {
        return String::new();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut total_chars = 0;

    for (i, doc) in docs.iter().enumerate() {
        let md = &doc.metadata.doc;
        let title = if md.title.is_empty() { UNTITLED } else { &md.title };
        let content = clip_at_word(doc.content.trim(), max_chars_per_doc);

        let mut header = format!("[Kaynak {}] {title}", i + 1);
        if !md.author.is_empty() {
            header.push_str(&format!(" - {}", md.author));
        }
        if !md.category.is_empty() {
            header.push_str(&format!(" ({})", md.category));
        }
        if !md.date.is_empty() {
            header.push_str(&format!(" [{}]", md.date));
        }

        let part = format!("{header}\n{content}");
        let projected = total_chars + part.chars().count();
        if projected > max_total_chars {
            break;
        }

        parts.push(part);
        total_chars = projected;
    }

    parts.join("\n\n---\n\n")
}

/// Short quoted snippets for the cited sources.
///
/// `cited` holds 1-based source numbers as they appear in the context
/// block; out-of-range citations are ignored, and an empty or fully
/// invalid citation list falls back to the top documents.
pub fn evidence_snippets(
    docs: &[RetrievedDoc],
    cited: &[usize],
    max_items: usize,
    snippet_chars: usize,
) -> String {
    if docs.is_empty() {
        return String::new();
    }

    let mut selected: Vec<(usize, &RetrievedDoc)> = cited
        .iter()
        .filter(|&&n| n >= 1 && n <= docs.len())
        .map(|&n| (n, &docs[n - 1]))
        .collect();
    if selected.is_empty() {
        selected = docs.iter().take(max_items).enumerate().map(|(i, d)| (i + 1, d)).collect();
    }

    let mut lines = vec!["\nKanıtlar:".to_string()];
    for (n, doc) in selected.into_iter().take(max_items) {
        let text = doc.content.replace('\n', " ");
        let text = clip_at_word(text.trim(), snippet_chars);
        let md = &doc.metadata.doc;
        let title = if md.title.is_empty() { UNTITLED } else { &md.title };
        lines.push(format!("- [Kaynak {n}] {title}: {text}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{ChunkMeta, DocMeta};

    fn doc(title: &str, content: &str) -> RetrievedDoc {
        RetrievedDoc {
            content: content.to_string(),
            metadata: ChunkMeta::new(
                DocMeta {
                    title: title.to_string(),
                    author: "Yazar".to_string(),
                    category: "Etik".to_string(),
                    date: "2021".to_string(),
                    ..DocMeta::default()
                },
                0,
                0,
            ),
            score: 0.9,
            rerank_score: 0.0,
        }
    }

    #[test]
    fn renders_headers_and_separators() {
        let docs = vec![doc("Bir", "içerik bir"), doc("İki", "içerik iki")];
        let out = format_context(&docs, 12_000, 1500);

        assert!(out.contains("[Kaynak 1] Bir - Yazar (Etik) [2021]"));
        assert!(out.contains("[Kaynak 2] İki"));
        assert!(out.contains("\n\n---\n\n"));
    }

    #[test]
    fn respects_total_budget() {
        let docs: Vec<RetrievedDoc> =
            (0..10).map(|i| doc(&format!("D{i}"), &"kelime ".repeat(100))).collect();
        let out = format_context(&docs, 800, 1500);
        assert!(out.chars().count() <= 800);
        assert!(out.contains("[Kaynak 1]"));
        assert!(!out.contains("[Kaynak 10]"));
    }

    #[test]
    fn clips_per_doc_at_word_boundary() {
        let long = "kelime ".repeat(500);
        let docs = vec![doc("Uzun", &long)];
        let out = format_context(&docs, 12_000, 100);

        assert!(out.ends_with("..."));
        assert!(!out.contains(&"kelime ".repeat(30)));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(format_context(&[], 12_000, 1500), "");
        assert_eq!(evidence_snippets(&[], &[1], 3, 220), "");
    }

    #[test]
    fn snippets_follow_citations() {
        let docs = vec![doc("Bir", "a"), doc("İki", "b"), doc("Üç", "c")];
        let out = evidence_snippets(&docs, &[3, 1], 3, 220);
        assert!(out.starts_with("\nKanıtlar:"));
        assert!(out.contains("[Kaynak 3] Üç: c"));
        assert!(out.contains("[Kaynak 1] Bir: a"));
        assert!(!out.contains("[Kaynak 2]"));
    }

    #[test]
    fn invalid_citations_fall_back_to_top_docs() {
        let docs = vec![doc("Bir", "a"), doc("İki", "b")];
        let out = evidence_snippets(&docs, &[99], 1, 220);
        assert!(out.contains("[Kaynak 1] Bir"));
    }
}
