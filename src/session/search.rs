//! Full-text search over a document's pages.

use serde::Serialize;
use tracing::warn;

use super::PdfDocument;

/// Characters of context kept on each side of a match
const SNIPPET_CONTEXT: usize = 30;

/// One match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// 1-indexed page
    pub page: u32,
    /// Character offset of the match in the page text
    pub offset: usize,
    /// Match with surrounding context, whitespace collapsed
    pub snippet: String,
}

/// Case-insensitive search across every page, in page order.
///
/// A blank query matches nothing. Pages whose text cannot be extracted are
/// skipped with a warning.
pub fn search(document: &dyn PdfDocument, query: &str) -> Vec<SearchHit> {
    let needle = fold(query.trim());
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for page in 1..=document.page_count() {
        let text = match document.page_text(page) {
            Ok(text) => text,
            Err(err) => {
                warn!(page, error = %err, "skipping page in search");
                continue;
            }
        };
        let original: Vec<char> = text.chars().collect();
        let haystack: Vec<char> = original.iter().map(|c| fold_char(*c)).collect();

        let mut offset = 0;
        while offset + needle.len() <= haystack.len() {
            if haystack[offset..offset + needle.len()] == needle[..] {
                hits.push(SearchHit {
                    page,
                    offset,
                    snippet: snippet(&original, offset, needle.len()),
                });
                offset += needle.len();
            } else {
                offset += 1;
            }
        }
    }
    hits
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn fold(text: &str) -> Vec<char> {
    text.chars().map(fold_char).collect()
}

fn snippet(text: &[char], start: usize, len: usize) -> String {
    let from = start.saturating_sub(SNIPPET_CONTEXT);
    let to = (start + len + SNIPPET_CONTEXT).min(text.len());
    let body: String = text[from..to].iter().collect();
    let body = body.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::new();
    if from > 0 {
        out.push_str("...");
    }
    out.push_str(&body);
    if to < text.len() {
        out.push_str("...");
    }
    out
}
