//! PDF document sessions.
//!
//! A session holds the view and edit state of one loaded document: current
//! page, zoom, per-page rotations and the annotation overlay. Edit actions
//! never touch the loaded bytes; each one becomes a PDF task whose output is
//! a new file.

mod document;
mod overlay;
mod pages;
mod search;
mod state;
mod thumbnails;

pub use document::{
    DocumentProperties, LopdfDocument, PageRenderer, PdfDocument, RenderError, RenderedPage,
    read_properties,
};
pub use overlay::{
    Annotation, AnnotationId, AnnotationKind, AnnotationStyle, Color, Overlay, Point, Rect,
    Rotation,
};
pub use pages::{PageRangeError, format_page_selection, parse_page_order, parse_page_selection};
pub use search::{SearchHit, search};
pub use state::{
    ActionPanel, ActionParams, ExportOutcome, MAX_ZOOM, MIN_ZOOM, PdfSession, SessionState,
    ViewTab, ZOOM_STEP,
};
pub use thumbnails::{CancellationToken, THUMBNAIL_SCALE, generate_thumbnails};

/// Errors raised by session operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Operation needs a loaded document
    #[error("no document loaded")]
    NoDocument,

    /// Action not allowed in the current state
    #[error("cannot {action} while the session is {state}")]
    InvalidTransition {
        /// What was attempted.
        action: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// Page number outside the document
    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange {
        /// Requested page.
        page: u32,
        /// Pages in the document.
        page_count: u32,
    },

    /// Page reference list could not be parsed
    #[error(transparent)]
    PageRange(#[from] PageRangeError),

    /// The document could not be read
    #[error("failed to read document: {0}")]
    Document(String),

    /// Parameters do not fit the open action panel
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A page failed to render
    #[error("failed to render page {page}: {reason}")]
    Render {
        /// Page that failed.
        page: u32,
        /// Renderer message.
        reason: String,
    },

    /// Thumbnail generation was cancelled
    #[error("thumbnail generation cancelled")]
    Cancelled,

    /// Annotation id not present in the overlay
    #[error("annotation {0} not found")]
    AnnotationNotFound(AnnotationId),

    /// The export task failed
    #[error("export failed: {0}")]
    ExportFailed(String),
}
