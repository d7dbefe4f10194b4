//! Thumbnail generation for the page sidebar.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::{PageRenderer, RenderedPage, SessionError};

/// Render scale of sidebar thumbnails
pub const THUMBNAIL_SCALE: f32 = 0.3;

/// Shared flag checked between pages
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a live token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Renders every page at [`THUMBNAIL_SCALE`], stopping as soon as `token`
/// is cancelled.
///
/// # Errors
///
/// Returns [`SessionError::Cancelled`] if the token fires before the last
/// page and [`SessionError::Render`] if a page fails to render.
pub fn generate_thumbnails(
    renderer: &dyn PageRenderer,
    document: &[u8],
    page_count: u32,
    token: &CancellationToken,
) -> Result<Vec<RenderedPage>, SessionError> {
    let mut thumbnails = Vec::with_capacity(page_count as usize);
    for page in 1..=page_count {
        if token.is_cancelled() {
            debug!(page, page_count, "thumbnail generation cancelled");
            return Err(SessionError::Cancelled);
        }
        let rendered = renderer
            .render(document, page, THUMBNAIL_SCALE)
            .map_err(|e| SessionError::Render {
                page,
                reason: e.to_string(),
            })?;
        thumbnails.push(rendered);
    }
    Ok(thumbnails)
}
