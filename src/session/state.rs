//! Session state machine and edit actions.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    AnnotationId, AnnotationKind, AnnotationStyle, CancellationToken, DocumentProperties,
    LopdfDocument, Overlay, PageRenderer, PdfDocument, RenderedPage, Rotation, SearchHit,
    SessionError, generate_thumbnails, parse_page_order, parse_page_selection, search,
};
use crate::output::generate_filename_now;
use crate::tasks::{ImageFormat, PdfRequest};
use crate::worker::{TaskManager, TaskOptions, TaskRequest, TaskResult};

/// Smallest zoom factor
pub const MIN_ZOOM: f32 = 0.5;
/// Largest zoom factor
pub const MAX_ZOOM: f32 = 2.0;
/// Zoom change per step
pub const ZOOM_STEP: f32 = 0.25;

/// Edit action panels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPanel {
    /// Extract a page subset into a new file
    Split,
    /// Remove pages
    DeletePages,
    /// Change page order
    Reorder,
    /// Append other documents
    Merge,
    /// Apply rotation overrides
    Rotate,
    /// Burn highlights into the file
    Highlight,
    /// Burn every annotation into the file
    Annotate,
    /// Rasterize pages to images
    ConvertToImages,
}

impl ActionPanel {
    /// Filename prefix for files produced by this action
    #[must_use]
    pub fn output_prefix(self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::DeletePages => "deleted",
            Self::Reorder => "reordered",
            Self::Merge => "merged",
            Self::Rotate => "rotated",
            Self::Highlight => "highlighted",
            Self::Annotate => "annotated",
            Self::ConvertToImages => "page",
        }
    }
}

impl fmt::Display for ActionPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Split => "split",
            Self::DeletePages => "delete pages",
            Self::Reorder => "reorder",
            Self::Merge => "merge",
            Self::Rotate => "rotate",
            Self::Highlight => "highlight",
            Self::Annotate => "annotate",
            Self::ConvertToImages => "convert to images",
        };
        f.write_str(name)
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "panel", rename_all = "snake_case")]
pub enum SessionState {
    /// No document
    Empty,
    /// Document loaded, no panel open
    Loaded,
    /// Action panel open
    Editing(ActionPanel),
    /// Reviewing an action before confirming it
    Previewing(ActionPanel),
    /// Export task running
    Exporting(ActionPanel),
}

impl SessionState {
    /// Open action panel, if any
    #[must_use]
    pub fn panel(self) -> Option<ActionPanel> {
        match self {
            Self::Editing(p) | Self::Previewing(p) | Self::Exporting(p) => Some(p),
            Self::Empty | Self::Loaded => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Loaded => f.write_str("loaded"),
            Self::Editing(p) => write!(f, "editing ({p})"),
            Self::Previewing(p) => write!(f, "previewing ({p})"),
            Self::Exporting(p) => write!(f, "exporting ({p})"),
        }
    }
}

/// Sidebar view tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewTab {
    /// Page thumbnails
    #[default]
    Thumbnails,
    /// Text search
    Search,
    /// Document metadata
    Properties,
}

/// Confirmed parameters for the open panel
#[derive(Debug, Clone, PartialEq)]
pub enum ActionParams {
    /// Page list to keep, e.g. `1-3,5`
    Split {
        /// Page reference list.
        pages: String,
    },
    /// Page list to remove
    DeletePages {
        /// Page reference list.
        pages: String,
    },
    /// New order listing every page
    Reorder {
        /// Page reference list.
        order: String,
    },
    /// Documents appended after the loaded one, in order
    Merge {
        /// Raw PDF bytes.
        documents: Vec<Vec<u8>>,
    },
    /// Apply the session's rotation overrides
    Rotate,
    /// Apply the session's highlights
    Highlight,
    /// Apply every annotation in the overlay
    Annotate,
    /// Rasterize a page list
    ConvertToImages {
        /// Page reference list.
        pages: String,
        /// Render scale.
        scale: f32,
        /// Output image format.
        format: ImageFormat,
    },
}

impl ActionParams {
    /// Panel these parameters belong to
    #[must_use]
    pub fn panel(&self) -> ActionPanel {
        match self {
            Self::Split { .. } => ActionPanel::Split,
            Self::DeletePages { .. } => ActionPanel::DeletePages,
            Self::Reorder { .. } => ActionPanel::Reorder,
            Self::Merge { .. } => ActionPanel::Merge,
            Self::Rotate => ActionPanel::Rotate,
            Self::Highlight => ActionPanel::Highlight,
            Self::Annotate => ActionPanel::Annotate,
            Self::ConvertToImages { .. } => ActionPanel::ConvertToImages,
        }
    }
}

/// Result of a finished export
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Task result, artifacts included
    pub result: TaskResult,
    /// One generated filename per artifact
    pub file_names: Vec<String>,
}

struct LoadedDocument {
    handle: Arc<dyn PdfDocument>,
    source: Arc<Vec<u8>>,
    file_name: String,
}

/// View and edit state of one document
pub struct PdfSession {
    state: SessionState,
    document: Option<LoadedDocument>,
    current_page: u32,
    zoom: f32,
    overlay: Overlay,
    view: ViewTab,
    thumbnail_token: CancellationToken,
}

impl fmt::Debug for PdfSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfSession")
            .field("state", &self.state)
            .field("file_name", &self.file_name())
            .field("page_count", &self.page_count())
            .field("current_page", &self.current_page)
            .field("zoom", &self.zoom)
            .finish_non_exhaustive()
    }
}

impl Default for PdfSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfSession {
    /// Creates an empty session
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            document: None,
            current_page: 0,
            zoom: 1.0,
            overlay: Overlay::new(),
            view: ViewTab::default(),
            thumbnail_token: CancellationToken::new(),
        }
    }

    /// Parses `bytes` and loads them, replacing any previous document
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Document`] if the bytes are not a readable PDF;
    /// the session is left untouched in that case.
    pub fn load(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) -> Result<(), SessionError> {
        let handle = LopdfDocument::from_bytes(&bytes)?;
        self.load_document(file_name, bytes, Arc::new(handle))
    }

    /// Loads an already parsed document
    ///
    /// # Errors
    ///
    /// Returns an error while an export is running or if the document has
    /// no pages.
    pub fn load_document(
        &mut self,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        handle: Arc<dyn PdfDocument>,
    ) -> Result<(), SessionError> {
        self.ensure_not_exporting("load a document")?;
        if handle.page_count() == 0 {
            return Err(SessionError::Document("document has no pages".to_string()));
        }

        self.clear();
        let file_name = file_name.into();
        info!(file = %file_name, pages = handle.page_count(), "document loaded");
        self.document = Some(LoadedDocument {
            handle,
            source: Arc::new(bytes),
            file_name,
        });
        self.current_page = 1;
        self.state = SessionState::Loaded;
        Ok(())
    }

    /// Drops the document and every edit, cancelling thumbnail generation
    pub fn clear(&mut self) {
        self.thumbnail_token.cancel();
        self.thumbnail_token = CancellationToken::new();
        self.document = None;
        self.overlay.clear();
        self.current_page = 0;
        self.zoom = 1.0;
        self.view = ViewTab::default();
        self.state = SessionState::Empty;
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Name of the loaded file
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.document.as_ref().map(|doc| doc.file_name.as_str())
    }

    /// Pages in the loaded document, 0 when empty
    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |doc| doc.handle.page_count())
    }

    /// Current 1-indexed page, 0 when empty
    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Jumps to a page
    ///
    /// # Errors
    ///
    /// Returns an error if no document is loaded or the page does not exist.
    pub fn go_to_page(&mut self, page: u32) -> Result<u32, SessionError> {
        let page_count = self.loaded()?.handle.page_count();
        if page == 0 || page > page_count {
            return Err(SessionError::PageOutOfRange { page, page_count });
        }
        self.current_page = page;
        Ok(page)
    }

    /// Moves forward one page, staying on the last page
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoDocument`] when empty.
    pub fn next_page(&mut self) -> Result<u32, SessionError> {
        let page_count = self.loaded()?.handle.page_count();
        self.current_page = (self.current_page + 1).min(page_count);
        Ok(self.current_page)
    }

    /// Moves back one page, staying on the first page
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoDocument`] when empty.
    pub fn previous_page(&mut self) -> Result<u32, SessionError> {
        self.loaded()?;
        self.current_page = self.current_page.saturating_sub(1).max(1);
        Ok(self.current_page)
    }

    /// Current zoom factor
    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Sets the zoom, clamped to [`MIN_ZOOM`]..=[`MAX_ZOOM`]
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        self.zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        self.zoom
    }

    /// Zooms in one step
    pub fn zoom_in(&mut self) -> f32 {
        self.set_zoom(self.zoom + ZOOM_STEP)
    }

    /// Zooms out one step
    pub fn zoom_out(&mut self) -> f32 {
        self.set_zoom(self.zoom - ZOOM_STEP)
    }

    /// Active view tab
    #[must_use]
    pub fn view(&self) -> ViewTab {
        self.view
    }

    /// Switches view tab
    pub fn set_view(&mut self, view: ViewTab) {
        self.view = view;
    }

    /// Opens an action panel
    ///
    /// # Errors
    ///
    /// Allowed from `Loaded` and `Editing`; any other state is an invalid
    /// transition.
    pub fn open_panel(&mut self, panel: ActionPanel) -> Result<(), SessionError> {
        match self.state {
            SessionState::Loaded | SessionState::Editing(_) => {
                debug!(%panel, "panel opened");
                self.state = SessionState::Editing(panel);
                Ok(())
            }
            state => Err(SessionError::InvalidTransition {
                action: "open a panel",
                state,
            }),
        }
    }

    /// Closes the open panel, returning to `Loaded`
    ///
    /// # Errors
    ///
    /// Fails when no panel is open or an export is running.
    pub fn close_panel(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Editing(_) | SessionState::Previewing(_) => {
                self.state = SessionState::Loaded;
                Ok(())
            }
            state => Err(SessionError::InvalidTransition {
                action: "close the panel",
                state,
            }),
        }
    }

    /// Moves from `Editing` to `Previewing`
    ///
    /// # Errors
    ///
    /// Fails outside `Editing`.
    pub fn preview(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Editing(panel) => {
                self.state = SessionState::Previewing(panel);
                Ok(())
            }
            state => Err(SessionError::InvalidTransition {
                action: "preview",
                state,
            }),
        }
    }

    /// Moves from `Previewing` back to `Editing`
    ///
    /// # Errors
    ///
    /// Fails outside `Previewing`.
    pub fn back_to_editing(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Previewing(panel) => {
                self.state = SessionState::Editing(panel);
                Ok(())
            }
            state => Err(SessionError::InvalidTransition {
                action: "return to editing",
                state,
            }),
        }
    }

    /// Confirms the open panel and builds its PDF task.
    ///
    /// On success the session is `Exporting`; the caller runs the request and
    /// reports back with [`finish_export`](Self::finish_export). On error the
    /// state is unchanged.
    ///
    /// # Errors
    ///
    /// Fails when no panel is open, when `params` belong to another panel,
    /// or when the parameters are invalid for the document.
    pub fn begin_export(&mut self, params: ActionParams) -> Result<TaskRequest, SessionError> {
        let panel = match self.state {
            SessionState::Editing(panel) | SessionState::Previewing(panel) => panel,
            state => {
                return Err(SessionError::InvalidTransition {
                    action: "export",
                    state,
                });
            }
        };
        if params.panel() != panel {
            return Err(SessionError::InvalidAction(format!(
                "{} parameters given while the {panel} panel is open",
                params.panel()
            )));
        }

        let request = self.build_request(params)?;
        info!(%panel, "export started");
        self.state = SessionState::Exporting(panel);
        Ok(TaskRequest::Pdf(request))
    }

    /// Ends a running export: back to `Loaded` on success, to `Editing` with
    /// the same panel on failure.
    ///
    /// # Errors
    ///
    /// Fails when no export is running.
    pub fn finish_export(&mut self, success: bool) -> Result<(), SessionError> {
        let SessionState::Exporting(panel) = self.state else {
            return Err(SessionError::InvalidTransition {
                action: "finish an export",
                state: self.state,
            });
        };
        if success {
            info!(%panel, "export finished");
            self.state = SessionState::Loaded;
        } else {
            warn!(%panel, "export failed, back to editing");
            self.state = SessionState::Editing(panel);
        }
        Ok(())
    }

    /// Runs the open panel's action on `manager` and names its outputs.
    ///
    /// Dropping the returned future before it completes counts as a failed
    /// export.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ExportFailed`] when the task is rejected or
    /// reports failure; the session goes back to `Editing` in that case.
    pub async fn export(
        &mut self,
        manager: &TaskManager,
        params: ActionParams,
        options: TaskOptions,
    ) -> Result<ExportOutcome, SessionError> {
        let panel = params.panel();
        let request = self.begin_export(params)?;
        let guard = ExportGuard {
            session: self,
            settled: false,
        };

        let result = match manager.execute(request, options).await {
            Ok(result) if result.success => result,
            Ok(result) => {
                guard.settle(false)?;
                let reason = result.error.unwrap_or_else(|| "task failed".to_string());
                return Err(SessionError::ExportFailed(reason));
            }
            Err(err) => {
                guard.settle(false)?;
                return Err(SessionError::ExportFailed(err.to_string()));
            }
        };
        guard.settle(true)?;

        let original = self.file_name().unwrap_or("document.pdf").to_string();
        let artifacts = result.data.as_ref().map_or(&[][..], |out| &out.artifacts[..]);
        let file_names = artifacts
            .iter()
            .enumerate()
            .map(|(index, artifact)| {
                let prefix = if artifacts.len() > 1 {
                    format!("{}-{}", panel.output_prefix(), index + 1)
                } else {
                    panel.output_prefix().to_string()
                };
                generate_filename_now(&prefix, &original, &artifact.extension)
            })
            .collect();

        Ok(ExportOutcome { result, file_names })
    }

    /// Adds an annotation to a page
    ///
    /// # Errors
    ///
    /// Fails when empty or the page does not exist.
    pub fn annotate(
        &mut self,
        page: u32,
        kind: AnnotationKind,
        style: AnnotationStyle,
    ) -> Result<AnnotationId, SessionError> {
        self.check_page(page)?;
        Ok(self.overlay.add(page, kind, style))
    }

    /// Removes an annotation
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AnnotationNotFound`] for unknown ids.
    pub fn remove_annotation(&mut self, id: AnnotationId) -> Result<(), SessionError> {
        self.overlay
            .remove(id)
            .map(|_| ())
            .ok_or(SessionError::AnnotationNotFound(id))
    }

    /// Rotates a page a quarter turn
    ///
    /// # Errors
    ///
    /// Fails when empty or the page does not exist.
    pub fn rotate_page(&mut self, page: u32, clockwise: bool) -> Result<Rotation, SessionError> {
        self.check_page(page)?;
        Ok(self.overlay.rotate_page(page, clockwise))
    }

    /// Annotations and rotation overrides
    #[must_use]
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Searches the document text, skipping unreadable pages
    ///
    /// # Errors
    ///
    /// Fails when no document is loaded.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, SessionError> {
        Ok(search(self.loaded()?.handle.as_ref(), query))
    }

    /// Document metadata
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoDocument`] when empty.
    pub fn properties(&self) -> Result<DocumentProperties, SessionError> {
        Ok(self.loaded()?.handle.properties())
    }

    /// Token cancelled when the document is cleared or replaced
    #[must_use]
    pub fn thumbnail_token(&self) -> CancellationToken {
        self.thumbnail_token.clone()
    }

    /// Renders every page thumbnail
    ///
    /// # Errors
    ///
    /// Fails when empty, when a page fails to render, or when the session is
    /// cleared mid-way.
    pub fn generate_thumbnails(
        &self,
        renderer: &dyn PageRenderer,
    ) -> Result<Vec<RenderedPage>, SessionError> {
        let doc = self.loaded()?;
        generate_thumbnails(
            renderer,
            &doc.source,
            doc.handle.page_count(),
            &self.thumbnail_token,
        )
    }

    fn loaded(&self) -> Result<&LoadedDocument, SessionError> {
        self.document.as_ref().ok_or(SessionError::NoDocument)
    }

    fn check_page(&self, page: u32) -> Result<(), SessionError> {
        let page_count = self.loaded()?.handle.page_count();
        if page == 0 || page > page_count {
            return Err(SessionError::PageOutOfRange { page, page_count });
        }
        Ok(())
    }

    fn ensure_not_exporting(&self, action: &'static str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Exporting(_) => Err(SessionError::InvalidTransition {
                action,
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    fn build_request(&self, params: ActionParams) -> Result<PdfRequest, SessionError> {
        let doc = self.loaded()?;
        let page_count = doc.handle.page_count();
        let data = doc.source.as_ref().clone();

        let request = match params {
            ActionParams::Split { pages } => PdfRequest::Extract {
                data,
                pages: parse_page_selection(&pages, page_count)?.into_iter().collect(),
            },
            ActionParams::DeletePages { pages } => {
                let pages = parse_page_selection(&pages, page_count)?;
                if pages.len() as u32 >= page_count {
                    return Err(SessionError::InvalidAction(
                        "cannot delete every page of the document".to_string(),
                    ));
                }
                PdfRequest::DeletePages {
                    data,
                    pages: pages.into_iter().collect(),
                }
            }
            ActionParams::Reorder { order } => PdfRequest::Reorder {
                data,
                order: parse_page_order(&order, page_count)?,
            },
            ActionParams::Merge { documents } => {
                if documents.is_empty() {
                    return Err(SessionError::InvalidAction(
                        "merge needs at least one other document".to_string(),
                    ));
                }
                let mut all = Vec::with_capacity(documents.len() + 1);
                all.push(data);
                all.extend(documents);
                PdfRequest::Merge { documents: all }
            }
            ActionParams::Rotate => {
                if self.overlay.rotations().is_empty() {
                    return Err(SessionError::InvalidAction(
                        "no page has been rotated".to_string(),
                    ));
                }
                PdfRequest::Rotate {
                    data,
                    rotations: self.overlay.rotations().clone(),
                }
            }
            ActionParams::Highlight => {
                let annotations: Vec<_> = self
                    .overlay
                    .annotations()
                    .iter()
                    .filter(|a| a.kind.is_highlight())
                    .cloned()
                    .collect();
                if annotations.is_empty() {
                    return Err(SessionError::InvalidAction("no highlights to apply".to_string()));
                }
                PdfRequest::Annotate { data, annotations }
            }
            ActionParams::Annotate => {
                if self.overlay.annotations().is_empty() {
                    return Err(SessionError::InvalidAction(
                        "no annotations to apply".to_string(),
                    ));
                }
                PdfRequest::Annotate {
                    data,
                    annotations: self.overlay.annotations().to_vec(),
                }
            }
            ActionParams::ConvertToImages {
                pages,
                scale,
                format,
            } => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(SessionError::InvalidAction(format!(
                        "render scale must be positive, got {scale}"
                    )));
                }
                PdfRequest::Rasterize {
                    data,
                    pages: parse_page_selection(&pages, page_count)?.into_iter().collect(),
                    scale,
                    format,
                }
            }
        };
        Ok(request)
    }
}

/// Puts a session back into `Editing` if its export is abandoned
struct ExportGuard<'a> {
    session: &'a mut PdfSession,
    settled: bool,
}

impl ExportGuard<'_> {
    fn settle(mut self, success: bool) -> Result<(), SessionError> {
        self.settled = true;
        self.session.finish_export(success)
    }
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("export abandoned before it finished");
            let _ = self.session.finish_export(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Point, Rect};
    use crate::tasks::{ExecutionError, FamilyHandler, PdfHandler};
    use crate::test_support::{TextDocument, sample_pdf};
    use crate::worker::{TaskFamily, TaskOutput};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn loaded(pages: u32) -> PdfSession {
        let mut session = PdfSession::new();
        session.load("report.pdf", sample_pdf(pages)).unwrap();
        session
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = PdfSession::new();
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.page_count(), 0);
        assert_eq!(session.properties().unwrap_err(), SessionError::NoDocument);
    }

    #[test]
    fn test_load_moves_to_loaded() {
        let session = loaded(3);
        assert_eq!(session.state(), SessionState::Loaded);
        assert_eq!(session.page_count(), 3);
        assert_eq!(session.current_page(), 1);
        assert_eq!(session.file_name(), Some("report.pdf"));
    }

    #[test]
    fn test_failed_load_keeps_previous_document() {
        let mut session = loaded(2);
        assert!(session.load("broken.pdf", b"nope".to_vec()).is_err());
        assert_eq!(session.file_name(), Some("report.pdf"));
        assert_eq!(session.state(), SessionState::Loaded);
    }

    #[test]
    fn test_navigation_is_bounded() {
        let mut session = loaded(3);
        assert_eq!(session.previous_page().unwrap(), 1);
        assert_eq!(session.next_page().unwrap(), 2);
        assert_eq!(session.next_page().unwrap(), 3);
        assert_eq!(session.next_page().unwrap(), 3);
        assert_eq!(session.go_to_page(2).unwrap(), 2);
        assert!(matches!(
            session.go_to_page(4),
            Err(SessionError::PageOutOfRange { page: 4, .. })
        ));
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut session = PdfSession::new();
        assert_eq!(session.zoom_in(), 1.25);
        assert_eq!(session.set_zoom(9.0), MAX_ZOOM);
        assert_eq!(session.zoom_in(), MAX_ZOOM);
        assert_eq!(session.set_zoom(0.1), MIN_ZOOM);
        assert_eq!(session.zoom_out(), MIN_ZOOM);
        assert_eq!(session.set_zoom(f32::NAN), 1.0);
    }

    #[test]
    fn test_panel_transitions() {
        let mut session = loaded(2);
        session.open_panel(ActionPanel::Split).unwrap();
        assert_eq!(session.state(), SessionState::Editing(ActionPanel::Split));

        session.preview().unwrap();
        assert_eq!(session.state(), SessionState::Previewing(ActionPanel::Split));
        assert!(session.open_panel(ActionPanel::Merge).is_err());

        session.back_to_editing().unwrap();
        session.open_panel(ActionPanel::Merge).unwrap();
        assert_eq!(session.state(), SessionState::Editing(ActionPanel::Merge));

        session.close_panel().unwrap();
        assert_eq!(session.state(), SessionState::Loaded);
    }

    #[test]
    fn test_empty_session_cannot_open_panel() {
        let mut session = PdfSession::new();
        let err = session.open_panel(ActionPanel::Split).unwrap_err();
        assert_eq!(err.to_string(), "cannot open a panel while the session is empty");
    }

    #[test]
    fn test_export_success_returns_to_loaded() {
        let mut session = loaded(8);
        session.open_panel(ActionPanel::Split).unwrap();

        let request = session
            .begin_export(ActionParams::Split {
                pages: "1-3,5,7-8".to_string(),
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::Exporting(ActionPanel::Split));
        let TaskRequest::Pdf(PdfRequest::Extract { pages, .. }) = request else {
            panic!("expected an extract request, got {request:?}");
        };
        assert_eq!(pages, vec![1, 2, 3, 5, 7, 8]);

        session.finish_export(true).unwrap();
        assert_eq!(session.state(), SessionState::Loaded);
    }

    #[test]
    fn test_export_failure_returns_to_editing() {
        let mut session = loaded(2);
        session.open_panel(ActionPanel::Reorder).unwrap();
        session
            .begin_export(ActionParams::Reorder {
                order: "2,1".to_string(),
            })
            .unwrap();
        session.finish_export(false).unwrap();
        assert_eq!(session.state(), SessionState::Editing(ActionPanel::Reorder));
    }

    #[test]
    fn test_invalid_params_leave_state_unchanged() {
        let mut session = loaded(8);
        session.open_panel(ActionPanel::Split).unwrap();

        let err = session
            .begin_export(ActionParams::Split {
                pages: "9".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::PageRange(_)));
        assert_eq!(session.state(), SessionState::Editing(ActionPanel::Split));

        let err = session.begin_export(ActionParams::Rotate).unwrap_err();
        assert!(matches!(err, SessionError::InvalidAction(_)));
    }

    #[test]
    fn test_cannot_delete_every_page() {
        let mut session = loaded(3);
        session.open_panel(ActionPanel::DeletePages).unwrap();
        let err = session
            .begin_export(ActionParams::DeletePages {
                pages: "1-3".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidAction(_)));
    }

    #[test]
    fn test_merge_prepends_loaded_document() {
        let mut session = loaded(1);
        session.open_panel(ActionPanel::Merge).unwrap();
        let request = session
            .begin_export(ActionParams::Merge {
                documents: vec![sample_pdf(2)],
            })
            .unwrap();
        let TaskRequest::Pdf(PdfRequest::Merge { documents }) = request else {
            panic!("expected a merge request");
        };
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0], sample_pdf(1));
    }

    #[test]
    fn test_highlight_only_sends_highlights() {
        let mut session = loaded(2);
        session
            .annotate(
                1,
                AnnotationKind::Highlight {
                    rect: Rect::new(10.0, 10.0, 100.0, 12.0),
                },
                AnnotationStyle::highlighter(),
            )
            .unwrap();
        session
            .annotate(
                2,
                AnnotationKind::Text {
                    at: Point::new(5.0, 5.0),
                    text: "note".to_string(),
                    font_size: 12.0,
                },
                AnnotationStyle::default(),
            )
            .unwrap();

        session.open_panel(ActionPanel::Highlight).unwrap();
        let request = session.begin_export(ActionParams::Highlight).unwrap();
        let TaskRequest::Pdf(PdfRequest::Annotate { annotations, .. }) = request else {
            panic!("expected an annotate request");
        };
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].page, 1);
    }

    #[test]
    fn test_annotation_lifecycle() {
        let mut session = loaded(1);
        let id = session
            .annotate(
                1,
                AnnotationKind::Rectangle {
                    rect: Rect::new(0.0, 0.0, 5.0, 5.0),
                },
                AnnotationStyle::default(),
            )
            .unwrap();
        let stroke = AnnotationKind::Freehand { points: vec![] };
        assert!(session.annotate(2, stroke, AnnotationStyle::default()).is_err());

        session.remove_annotation(id).unwrap();
        assert_eq!(
            session.remove_annotation(id).unwrap_err(),
            SessionError::AnnotationNotFound(id)
        );
    }

    #[test]
    fn test_rotate_page_accumulates() {
        let mut session = loaded(2);
        session.rotate_page(2, true).unwrap();
        assert_eq!(session.rotate_page(2, true).unwrap(), Rotation::Half);
        assert_eq!(session.overlay().rotation(1), Rotation::None);
    }

    #[test]
    fn test_clear_cancels_thumbnails() {
        let mut session = loaded(2);
        let token = session.thumbnail_token();
        session.clear();
        assert!(token.is_cancelled());
        assert!(!session.thumbnail_token().is_cancelled());
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.overlay().is_empty());
    }

    #[test]
    fn test_search_through_session() {
        let mut session = PdfSession::new();
        let doc = TextDocument::new(&["alpha", "beta alpha"]);
        session
            .load_document("notes.pdf", Vec::new(), Arc::new(doc))
            .unwrap();
        let hits = session.search("ALPHA").unwrap();
        assert_eq!(hits.iter().map(|h| h.page).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_export_through_manager_names_output() {
        let manager = TaskManager::builder().with_default_handlers().build();
        let mut session = loaded(3);
        session.open_panel(ActionPanel::DeletePages).unwrap();

        let outcome = session
            .export(
                &manager,
                ActionParams::DeletePages {
                    pages: "2".to_string(),
                },
                TaskOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Loaded);
        assert!(outcome.result.success);
        assert_eq!(outcome.result.data.as_ref().and_then(|d| d.page_count), Some(2));
        assert_eq!(outcome.file_names.len(), 1);
        assert!(outcome.file_names[0].starts_with("deleted-report-"));
        assert!(outcome.file_names[0].ends_with(".pdf"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_export_without_renderer_fails_back_to_editing() {
        let manager = TaskManager::builder().with_default_handlers().build();
        let mut session = loaded(1);
        session.open_panel(ActionPanel::ConvertToImages).unwrap();

        let err = session
            .export(
                &manager,
                ActionParams::ConvertToImages {
                    pages: String::new(),
                    scale: 1.0,
                    format: ImageFormat::Png,
                },
                TaskOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::ExportFailed(_)));
        assert_eq!(
            session.state(),
            SessionState::Editing(ActionPanel::ConvertToImages)
        );
    }

    /// PDF handler that holds its slot for a while before working
    struct SlowPdf {
        delay: Duration,
        inner: PdfHandler,
    }

    impl FamilyHandler for SlowPdf {
        fn family(&self) -> TaskFamily {
            TaskFamily::Pdf
        }

        fn execute(&self, request: TaskRequest) -> Result<TaskOutput, ExecutionError> {
            std::thread::sleep(self.delay);
            self.inner.execute(request)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_export_returns_to_editing() {
        let manager = TaskManager::builder()
            .register(Arc::new(SlowPdf {
                delay: Duration::from_millis(300),
                inner: PdfHandler::default(),
            }))
            .build();
        let mut session = loaded(3);
        session.open_panel(ActionPanel::DeletePages).unwrap();
        let params = ActionParams::DeletePages {
            pages: "2".to_string(),
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            session.export(&manager, params.clone(), TaskOptions::default()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(session.state(), SessionState::Editing(ActionPanel::DeletePages));

        let outcome = session
            .export(&manager, params, TaskOptions::default())
            .await
            .unwrap();
        assert!(outcome.result.success);
        assert_eq!(session.state(), SessionState::Loaded);
    }
}
