//! `slixtools validate`, `pages` and `pdf info` - read-only commands

use anyhow::{Context, Result};
use slixtools::session::{LopdfDocument, PdfDocument, parse_page_order, parse_page_selection};
use slixtools::validation::{FileDescriptor, ValidationOptions, validate};
use std::path::Path;

/// Validates a file on disk and prints the verdict.
///
/// Fails with the first violation when the file is rejected.
pub fn validate_file(file: &Path, options: &ValidationOptions, json: bool) -> Result<()> {
    let descriptor = FileDescriptor::from_path(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let result = validate(Some(&descriptor), options);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for warning in &result.warnings {
            println!("warning: {warning}");
        }
        if result.is_valid {
            println!("{}: ok", file.display());
        }
    }

    match result.violations.first() {
        Some(violation) => Err(anyhow::Error::new(violation.clone())
            .context(format!("{} failed validation", file.display()))),
        None => Ok(()),
    }
}

/// Expands a page reference list into explicit page numbers
pub fn expand_pages(selection: &str, page_count: u32, as_order: bool) -> Result<String> {
    let pages: Vec<u32> = if as_order {
        parse_page_order(selection, page_count)?
    } else {
        parse_page_selection(selection, page_count)?
            .into_iter()
            .collect()
    };
    Ok(pages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

/// Page count and metadata of a PDF, as JSON
pub fn pdf_info(file: &Path) -> Result<String> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let document = LopdfDocument::from_bytes(&bytes)
        .with_context(|| format!("Failed to open PDF: {}", file.display()))?;
    Ok(serde_json::to_string_pretty(&document.properties())?)
}
