//! Page reference lists such as `1-3,5,7-8`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static PAGE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)(?:\s*-\s*(\d+))?$").expect("page token pattern is valid")
});

/// Errors in a page reference list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageRangeError {
    /// Token is neither a number nor a range
    #[error("invalid page reference '{token}': expected a page number or a range like 2-5")]
    InvalidToken {
        /// Offending token.
        token: String,
    },

    /// Empty entry between commas
    #[error("empty entry in page list")]
    EmptyToken,

    /// Page outside the document
    #[error("page {page} is out of range (document has {page_count} pages)")]
    OutOfRange {
        /// Offending page.
        page: u32,
        /// Pages in the document.
        page_count: u32,
    },

    /// Range whose end is before its start
    #[error("range '{token}' ends before it starts")]
    ReversedRange {
        /// Offending token.
        token: String,
    },

    /// Page listed twice where order matters
    #[error("page {0} is listed more than once")]
    Duplicate(u32),

    /// Reorder list does not mention every page
    #[error("page order must list all {page_count} pages, missing {missing}")]
    Incomplete {
        /// Pages in the document.
        page_count: u32,
        /// First page not listed.
        missing: u32,
    },
}

fn parse_token(token: &str, page_count: u32) -> Result<(u32, u32), PageRangeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(PageRangeError::EmptyToken);
    }
    let invalid = || PageRangeError::InvalidToken {
        token: token.to_string(),
    };

    let caps = PAGE_TOKEN.captures(token).ok_or_else(invalid)?;
    let start: u32 = caps[1].parse().map_err(|_| invalid())?;
    let end: u32 = match caps.get(2) {
        Some(end) => end.as_str().parse().map_err(|_| invalid())?,
        None => start,
    };

    if end < start {
        return Err(PageRangeError::ReversedRange {
            token: token.to_string(),
        });
    }
    for page in [start, end] {
        if page == 0 || page > page_count {
            return Err(PageRangeError::OutOfRange { page, page_count });
        }
    }
    Ok((start, end))
}

/// Parses a comma-separated list of pages and inclusive ranges.
///
/// An empty or blank input selects every page. The result is sorted and
/// free of duplicates.
///
/// # Errors
///
/// Returns the first malformed, reversed or out-of-range token.
pub fn parse_page_selection(input: &str, page_count: u32) -> Result<BTreeSet<u32>, PageRangeError> {
    if input.trim().is_empty() {
        return Ok((1..=page_count).collect());
    }

    let mut pages = BTreeSet::new();
    for token in input.split(',') {
        let (start, end) = parse_token(token, page_count)?;
        pages.extend(start..=end);
    }
    Ok(pages)
}

/// Parses a new page order, which must mention every page exactly once.
///
/// Ranges expand in order, so `3-1` is rejected but `3,2,1` is accepted. An
/// empty input keeps the current order.
///
/// # Errors
///
/// Returns an error for malformed tokens, duplicates or missing pages.
pub fn parse_page_order(input: &str, page_count: u32) -> Result<Vec<u32>, PageRangeError> {
    if input.trim().is_empty() {
        return Ok((1..=page_count).collect());
    }

    let mut order = Vec::with_capacity(page_count as usize);
    let mut seen = BTreeSet::new();
    for token in input.split(',') {
        let (start, end) = parse_token(token, page_count)?;
        for page in start..=end {
            if !seen.insert(page) {
                return Err(PageRangeError::Duplicate(page));
            }
            order.push(page);
        }
    }

    if let Some(missing) = (1..=page_count).find(|p| !seen.contains(p)) {
        return Err(PageRangeError::Incomplete {
            page_count,
            missing,
        });
    }
    Ok(order)
}

/// Formats a page set compactly, collapsing runs into ranges
#[must_use]
pub fn format_page_selection(pages: &BTreeSet<u32>) -> String {
    let mut parts = Vec::new();
    let mut iter = pages.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(",")
}
