//! Plain-text extraction for stored documents (PDF, HTML, plain text).
//!
//! Dispatch is by file extension. Extraction only reads the file; callers
//! decide what a failure means for the document (the pipeline marks it
//! failed and moves on).

use std::path::{Path, PathBuf};

use scraper::{Html, Node};
use thiserror::Error;

/// Elements whose text content is never visible.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported file format: '{0}'")]
    UnsupportedFormat(String),
    #[error("failed to extract text from {}: {message}", path.display())]
    Extraction { path: PathBuf, message: String },
}

/// Formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Html,
    Text,
}

impl DocumentFormat {
    /// Resolve the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "html" | "htm" => Ok(DocumentFormat::Html),
            "txt" => Ok(DocumentFormat::Text),
            _ => Err(ExtractError::UnsupportedFormat(ext)),
        }
    }
}

/// Extract plain UTF-8 text from the file at `path`.
///
/// The format is checked before the filesystem is touched, so an
/// unsupported extension fails with [`ExtractError::UnsupportedFormat`]
/// even when the file does not exist.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let format = DocumentFormat::from_path(path)?;

    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }

    match format {
        DocumentFormat::Pdf => extract_pdf(path),
        DocumentFormat::Html => extract_html(path),
        DocumentFormat::Text => extract_txt(path),
    }
}

fn extraction_error(path: &Path, message: impl ToString) -> ExtractError {
    ExtractError::Extraction {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Page-by-page PDF text, newline-joined, skipping pages with no text.
///
/// Any page failure fails the whole file; partial text is never returned.
fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| extraction_error(path, e))?;

    // pdf-extract panics on some malformed inputs
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .map_err(|_| extraction_error(path, "PDF reader panicked"))?
        .map_err(|e| extraction_error(path, e))?;

    let text: Vec<&str> = pages
        .iter()
        .map(|page| page.as_str())
        .filter(|page| !page.trim().is_empty())
        .collect();
    Ok(text.join("\n"))
}

fn extract_html(path: &Path) -> Result<String, ExtractError> {
    let markup = std::fs::read_to_string(path).map_err(|e| extraction_error(path, e))?;
    Ok(html_to_text(&markup))
}

fn extract_txt(path: &Path) -> Result<String, ExtractError> {
    std::fs::read_to_string(path).map_err(|e| extraction_error(path, e))
}

/// Visible text of an HTML document, one text block per line.
pub fn html_to_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut blocks: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| INVISIBLE_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            blocks.push(trimmed);
        }
    }

    blocks.join("\n")
}
