//! Document handles and the rendering collaborator.

use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};

use super::SessionError;

/// Metadata shown in the properties tab
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProperties {
    /// Number of pages
    pub page_count: u32,
    /// PDF header version, e.g. `1.7`
    pub pdf_version: String,
    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Application that created the original
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    /// Application that produced the PDF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

/// A parsed document owned by a session
pub trait PdfDocument: Send + Sync {
    /// Number of pages
    fn page_count(&self) -> u32;

    /// Extracted text of a 1-indexed page
    ///
    /// # Errors
    ///
    /// Returns an error if the page does not exist or its content cannot be
    /// decoded.
    fn page_text(&self, page: u32) -> Result<String, SessionError>;

    /// Document metadata
    fn properties(&self) -> DocumentProperties;
}

/// A rasterized page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 1-indexed page
    pub page: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// RGBA8 pixels, row-major
    pub rgba: Vec<u8>,
}

/// Failure reported by a [`PageRenderer`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Rasterizes pages of a PDF at a scale factor.
///
/// The crate does not ship a rasterizer; embedders plug one in.
pub trait PageRenderer: Send + Sync {
    /// Renders one 1-indexed page of `document` at `scale` (1.0 = 72 dpi)
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] when the page cannot be rendered.
    fn render(&self, document: &[u8], page: u32, scale: f32) -> Result<RenderedPage, RenderError>;
}

/// [`PdfDocument`] backed by `lopdf`
#[derive(Debug)]
pub struct LopdfDocument {
    inner: Document,
    properties: DocumentProperties,
}

impl LopdfDocument {
    /// Parses a document from memory
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Document`] if the bytes are not a readable PDF.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SessionError> {
        let inner = Document::load_mem(data).map_err(|e| SessionError::Document(e.to_string()))?;
        let properties = read_properties(&inner);
        Ok(Self { inner, properties })
    }
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.properties.page_count
    }

    fn page_text(&self, page: u32) -> Result<String, SessionError> {
        if page == 0 || page > self.page_count() {
            return Err(SessionError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            });
        }
        self.inner
            .extract_text(&[page])
            .map_err(|e| SessionError::Document(e.to_string()))
    }

    fn properties(&self) -> DocumentProperties {
        self.properties.clone()
    }
}

/// Reads page count, version and the Info dictionary
#[must_use]
pub fn read_properties(doc: &Document) -> DocumentProperties {
    let page_count = u32::try_from(doc.get_pages().len()).unwrap_or(u32::MAX);
    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let field = |key: &[u8]| info.and_then(|dict| info_string(doc, dict, key));

    DocumentProperties {
        page_count,
        pdf_version: doc.version.clone(),
        title: field(b"Title"),
        author: field(b"Author"),
        subject: field(b"Subject"),
        creator: field(b"Creator"),
        producer: field(b"Producer"),
    }
}

fn info_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match dict.get(key).ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let Object::String(bytes, _) = value else {
        return None;
    };
    let text = decode_text_string(bytes);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Decodes a PDF text string: UTF-16BE with BOM, otherwise single-byte
fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_pdf;

    #[test]
    fn test_lopdf_document_page_count() {
        let doc = LopdfDocument::from_bytes(&sample_pdf(3)).unwrap();
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn test_properties_read_info() {
        let doc = LopdfDocument::from_bytes(&sample_pdf(2)).unwrap();
        let props = doc.properties();
        assert_eq!(props.page_count, 2);
        assert_eq!(props.title.as_deref(), Some("Sample"));
        assert_eq!(props.author.as_deref(), Some("sLixTOOLS"));
        assert_eq!(props.producer, None);
        assert_eq!(props.pdf_version, "1.5");
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = LopdfDocument::from_bytes(b"not a pdf").unwrap_err();
        assert!(matches!(err, SessionError::Document(_)));
    }

    #[test]
    fn test_page_text_out_of_range() {
        let doc = LopdfDocument::from_bytes(&sample_pdf(1)).unwrap();
        assert_eq!(
            doc.page_text(2).unwrap_err(),
            SessionError::PageOutOfRange {
                page: 2,
                page_count: 1
            }
        );
    }

    #[test]
    fn test_decode_utf16_text_string() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_text_string(&bytes), "Hi");
        assert_eq!(decode_text_string(b"Plain"), "Plain");
    }
}
