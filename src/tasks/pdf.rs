//! PDF family: page-level document manipulation with `lopdf`.
//!
//! Every operation loads the input, rewrites the page tree and saves a new
//! document. Page numbers are 1-indexed throughout.

use ::image::{DynamicImage, RgbaImage};
use lopdf::{Document, Object, ObjectId, StringFormat, dictionary};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use super::image::encode;
use super::options::{ImageFormat, OptionsError};
use super::{ExecutionError, FamilyHandler};
use crate::session::{Annotation, AnnotationKind, PageRenderer, Rect, Rotation, read_properties};
use crate::worker::{Artifact, TaskFamily, TaskOutput, TaskRequest};

/// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// US Letter, used when no MediaBox is found
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

fn default_scale() -> f32 {
    1.0
}

fn default_raster_format() -> ImageFormat {
    ImageFormat::Png
}

/// Operations of the PDF family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PdfRequest {
    /// Read page count and metadata
    Info {
        /// Input document.
        data: Vec<u8>,
    },
    /// Keep only the listed pages, in the listed order
    Extract {
        /// Input document.
        data: Vec<u8>,
        /// Pages to keep.
        pages: Vec<u32>,
    },
    /// Remove the listed pages
    DeletePages {
        /// Input document.
        data: Vec<u8>,
        /// Pages to remove.
        pages: Vec<u32>,
    },
    /// Put pages in a new order
    Reorder {
        /// Input document.
        data: Vec<u8>,
        /// Every page exactly once.
        order: Vec<u32>,
    },
    /// Turn pages by quarter turns, added to any existing rotation
    Rotate {
        /// Input document.
        data: Vec<u8>,
        /// Rotation per page.
        rotations: BTreeMap<u32, Rotation>,
    },
    /// Concatenate documents
    Merge {
        /// Documents in output order.
        documents: Vec<Vec<u8>>,
    },
    /// Write annotations into the pages
    Annotate {
        /// Input document.
        data: Vec<u8>,
        /// Annotations in top-left page coordinates.
        annotations: Vec<Annotation>,
    },
    /// Render pages to images
    Rasterize {
        /// Input document.
        data: Vec<u8>,
        /// Pages to render, every page when empty.
        #[serde(default)]
        pages: Vec<u32>,
        /// Render scale, 1.0 = 72 dpi.
        #[serde(default = "default_scale")]
        scale: f32,
        /// Output image format.
        #[serde(default = "default_raster_format")]
        format: ImageFormat,
    },
}

impl PdfRequest {
    /// Operation name
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::Extract { .. } => "extract",
            Self::DeletePages { .. } => "delete_pages",
            Self::Reorder { .. } => "reorder",
            Self::Rotate { .. } => "rotate",
            Self::Merge { .. } => "merge",
            Self::Annotate { .. } => "annotate",
            Self::Rasterize { .. } => "rasterize",
        }
    }
}

/// Handler for [`TaskFamily::Pdf`]
#[derive(Clone, Default)]
pub struct PdfHandler {
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl std::fmt::Debug for PdfHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfHandler")
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

impl PdfHandler {
    /// Handler that can rasterize pages with `renderer`
    #[must_use]
    pub fn with_renderer(renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            renderer: Some(renderer),
        }
    }
}

impl FamilyHandler for PdfHandler {
    fn family(&self) -> TaskFamily {
        TaskFamily::Pdf
    }

    fn execute(&self, request: TaskRequest) -> Result<TaskOutput, ExecutionError> {
        let request = match request {
            TaskRequest::Pdf(request) => request,
            other => return Err(ExecutionError::wrong_family(self.family(), &other)),
        };

        match request {
            PdfRequest::Info { data } => {
                let doc = load(&data)?;
                let properties = read_properties(&doc);
                Ok(TaskOutput {
                    page_count: Some(properties.page_count),
                    properties: Some(properties),
                    ..TaskOutput::default()
                }
                .with_input_size(data.len()))
            }
            PdfRequest::Extract { data, pages } => {
                let mut seen = BTreeSet::new();
                if let Some(page) = pages.iter().find(|page| !seen.insert(**page)) {
                    return Err(ExecutionError::Pdf(format!(
                        "page {page} is listed more than once"
                    )));
                }
                let mut doc = load(&data)?;
                let ids = page_ids(&doc, &pages)?;
                rebuild_page_tree(&mut doc, &ids)?;
                finish(doc, data.len())
            }
            PdfRequest::DeletePages { data, pages } => {
                let mut doc = load(&data)?;
                page_ids(&doc, &pages)?;
                let removed: BTreeSet<u32> = pages.into_iter().collect();
                let kept: Vec<ObjectId> = doc
                    .get_pages()
                    .into_iter()
                    .filter(|(number, _)| !removed.contains(number))
                    .map(|(_, id)| id)
                    .collect();
                if kept.is_empty() {
                    return Err(ExecutionError::Pdf(
                        "cannot delete every page of the document".to_string(),
                    ));
                }
                rebuild_page_tree(&mut doc, &kept)?;
                finish(doc, data.len())
            }
            PdfRequest::Reorder { data, order } => {
                let mut doc = load(&data)?;
                let page_count = doc.get_pages().len();
                let distinct: BTreeSet<u32> = order.iter().copied().collect();
                if order.len() != page_count || distinct.len() != page_count {
                    return Err(ExecutionError::Pdf(format!(
                        "page order must list each of the {page_count} pages exactly once"
                    )));
                }
                let ids = page_ids(&doc, &order)?;
                rebuild_page_tree(&mut doc, &ids)?;
                finish(doc, data.len())
            }
            PdfRequest::Rotate { data, rotations } => {
                let mut doc = load(&data)?;
                rotate(&mut doc, &rotations)?;
                finish(doc, data.len())
            }
            PdfRequest::Merge { documents } => {
                let input_size = documents.iter().map(Vec::len).sum();
                let doc = merge(&documents)?;
                finish(doc, input_size)
            }
            PdfRequest::Annotate { data, annotations } => {
                let mut doc = load(&data)?;
                for annotation in &annotations {
                    add_annotation(&mut doc, annotation)?;
                }
                debug!(count = annotations.len(), "wrote annotations");
                finish(doc, data.len())
            }
            PdfRequest::Rasterize {
                data,
                pages,
                scale,
                format,
            } => self.rasterize(&data, &pages, scale, format),
        }
    }
}

impl PdfHandler {
    fn rasterize(
        &self,
        data: &[u8],
        pages: &[u32],
        scale: f32,
        format: ImageFormat,
    ) -> Result<TaskOutput, ExecutionError> {
        let Some(renderer) = &self.renderer else {
            return Err(ExecutionError::Unsupported(
                "rasterizing pages needs a page renderer".to_string(),
            ));
        };
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ExecutionError::Pdf(format!(
                "render scale must be positive, got {scale}"
            )));
        }

        let doc = load(data)?;
        let pages: Vec<u32> = if pages.is_empty() {
            doc.get_pages().into_keys().collect()
        } else {
            page_ids(&doc, pages)?;
            pages.to_vec()
        };

        let mut output = TaskOutput::default().with_input_size(data.len());
        for page in pages {
            let rendered = renderer
                .render(data, page, scale)
                .map_err(|e| ExecutionError::Pdf(format!("page {page}: {e}")))?;
            let (width, height) = (rendered.width, rendered.height);
            let image = RgbaImage::from_raw(width, height, rendered.rgba).ok_or_else(|| {
                ExecutionError::Decode(format!("renderer returned a short buffer for page {page}"))
            })?;
            let bytes = encode(&DynamicImage::ImageRgba8(image), format, None)?;
            output.artifacts.push(Artifact::image(bytes, format));
            output = output.with_dimensions(width, height);
        }
        output.page_count = u32::try_from(output.artifacts.len()).ok();
        Ok(output)
    }
}

fn pdf_err(err: lopdf::Error) -> ExecutionError {
    ExecutionError::Pdf(err.to_string())
}

fn load(data: &[u8]) -> Result<Document, ExecutionError> {
    if data.is_empty() {
        return Err(ExecutionError::Decode("input is empty".to_string()));
    }
    Document::load_mem(data).map_err(|e| ExecutionError::Decode(e.to_string()))
}

fn finish(mut doc: Document, input_size: usize) -> Result<TaskOutput, ExecutionError> {
    let page_count = u32::try_from(doc.get_pages().len()).unwrap_or(u32::MAX);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ExecutionError::Encode(e.to_string()))?;
    Ok(TaskOutput::single(Artifact::pdf(bytes))
        .with_page_count(page_count)
        .with_input_size(input_size))
}

/// Maps page numbers to object ids, keeping the given order
fn page_ids(doc: &Document, pages: &[u32]) -> Result<Vec<ObjectId>, ExecutionError> {
    if pages.is_empty() {
        return Err(OptionsError::Empty("page").into());
    }
    let all = doc.get_pages();
    pages
        .iter()
        .map(|page| {
            all.get(page).copied().ok_or_else(|| {
                ExecutionError::Pdf(format!(
                    "page {page} is out of range (document has {} pages)",
                    all.len()
                ))
            })
        })
        .collect()
}

fn root_pages_id(doc: &Document) -> Result<ObjectId, ExecutionError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(pdf_err)?;
    doc.get_dictionary(catalog_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(pdf_err)
}

/// Looks `key` up on the page, then on each ancestor
fn inherited(doc: &Document, page: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page).ok()?;
    for _ in 0..64 {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Replaces the page tree with a flat one holding `pages` in order, then
/// drops everything no longer reachable.
fn rebuild_page_tree(doc: &mut Document, pages: &[ObjectId]) -> Result<(), ExecutionError> {
    let root = root_pages_id(doc)?;

    let mut materialized = Vec::new();
    for &page in pages {
        for key in INHERITABLE {
            if let Some(value) = inherited(doc, page, key) {
                materialized.push((page, key, value));
            }
        }
    }
    for (page, key, value) in materialized {
        doc.get_dictionary_mut(page).map_err(pdf_err)?.set(key, value);
    }
    for &page in pages {
        doc.get_dictionary_mut(page)
            .map_err(pdf_err)?
            .set("Parent", Object::Reference(root));
    }

    let kids: Vec<Object> = pages.iter().map(|&id| Object::Reference(id)).collect();
    let count = i64::try_from(pages.len()).unwrap_or(i64::MAX);
    let root_dict = doc.get_dictionary_mut(root).map_err(pdf_err)?;
    root_dict.set("Kids", kids);
    root_dict.set("Count", Object::Integer(count));
    root_dict.remove(b"Parent");

    let pruned = doc.prune_objects();
    debug!(pages = pages.len(), pruned = pruned.len(), "rebuilt page tree");
    Ok(())
}

fn rotate(doc: &mut Document, rotations: &BTreeMap<u32, Rotation>) -> Result<(), ExecutionError> {
    let numbers: Vec<u32> = rotations.keys().copied().collect();
    let ids = page_ids(doc, &numbers)?;

    for (id, rotation) in ids.into_iter().zip(rotations.values()) {
        let current = inherited(doc, id, b"Rotate")
            .and_then(|value| value.as_i64().ok())
            .unwrap_or(0);
        let degrees = (current + i64::from(rotation.degrees())).rem_euclid(360);
        doc.get_dictionary_mut(id)
            .map_err(pdf_err)?
            .set("Rotate", Object::Integer(degrees));
    }
    Ok(())
}

fn merge(documents: &[Vec<u8>]) -> Result<Document, ExecutionError> {
    let Some((first, rest)) = documents.split_first() else {
        return Err(OptionsError::Empty("document").into());
    };

    let mut base = load(first)?;
    let mut pages: Vec<ObjectId> = base.get_pages().into_values().collect();
    for (index, data) in rest.iter().enumerate() {
        let mut other =
            load(data).map_err(|e| ExecutionError::Decode(format!("document {}: {e}", index + 2)))?;
        other.renumber_objects_with(base.max_id + 1);
        pages.extend(other.get_pages().into_values());
        base.objects.extend(other.objects);
        base.max_id = base.objects.keys().map(|(id, _)| *id).max().unwrap_or(base.max_id);
    }

    rebuild_page_tree(&mut base, &pages)?;
    Ok(base)
}

fn media_box(doc: &Document, page: ObjectId) -> [f32; 4] {
    let Some(Object::Array(values)) = inherited(doc, page, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let numbers: Vec<f32> = values.iter().filter_map(|v| v.as_float().ok()).collect();
    match numbers[..] {
        [llx, lly, urx, ury] => [llx, lly, urx, ury],
        _ => DEFAULT_MEDIA_BOX,
    }
}

fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn numbers(values: &[f32]) -> Object {
    Object::Array(values.iter().map(|&v| Object::Real(v)).collect())
}

/// Converts a top-left rectangle into PDF user space `[llx lly urx ury]`
fn pdf_rect(rect: Rect, media: [f32; 4]) -> [f32; 4] {
    let [left, _, _, top] = media;
    [
        left + rect.x,
        top - rect.bottom(),
        left + rect.right(),
        top - rect.y,
    ]
}

fn add_annotation(doc: &mut Document, annotation: &Annotation) -> Result<(), ExecutionError> {
    let page = page_ids(doc, &[annotation.page])?[0];
    let media = media_box(doc, page);
    let style = &annotation.style;
    let [r, g, b] = style.color.components();
    let rect = pdf_rect(annotation.kind.bounds(), media);

    let mut dict = dictionary! {
        "Type" => "Annot",
        "Rect" => numbers(&rect),
        "C" => numbers(&[r, g, b]),
        "CA" => Object::Real(style.opacity),
        "P" => Object::Reference(page),
    };
    let border = || dictionary! { "W" => Object::Real(style.stroke_width) };

    match &annotation.kind {
        AnnotationKind::Highlight { .. } => {
            let [x1, y1, x2, y2] = rect;
            dict.set("Subtype", Object::Name(b"Highlight".to_vec()));
            dict.set("QuadPoints", numbers(&[x1, y2, x2, y2, x1, y1, x2, y1]));
        }
        AnnotationKind::Rectangle { .. } => {
            dict.set("Subtype", Object::Name(b"Square".to_vec()));
            dict.set("BS", border());
        }
        AnnotationKind::Text {
            text, font_size, ..
        } => {
            dict.set("Subtype", Object::Name(b"FreeText".to_vec()));
            dict.set("Contents", text_string(text));
            dict.set(
                "DA",
                Object::string_literal(format!("/Helv {font_size} Tf {r} {g} {b} rg")),
            );
        }
        AnnotationKind::Freehand { points } => {
            let [left, _, _, top] = media;
            let path: Vec<f32> = points
                .iter()
                .flat_map(|p| [left + p.x, top - p.y])
                .collect();
            dict.set("Subtype", Object::Name(b"Ink".to_vec()));
            dict.set("InkList", Object::Array(vec![numbers(&path)]));
            dict.set("BS", border());
        }
    }

    let annotation_id = doc.add_object(dict);
    append_annotation(doc, page, annotation_id)
}

fn append_annotation(
    doc: &mut Document,
    page: ObjectId,
    annotation: ObjectId,
) -> Result<(), ExecutionError> {
    let reference = Object::Reference(annotation);
    let existing = doc
        .get_dictionary(page)
        .map_err(pdf_err)?
        .get(b"Annots")
        .ok()
        .cloned();

    match existing {
        Some(Object::Reference(array_id)) => {
            doc.get_object_mut(array_id)
                .and_then(Object::as_array_mut)
                .map_err(pdf_err)?
                .push(reference);
        }
        Some(Object::Array(mut annots)) => {
            annots.push(reference);
            doc.get_dictionary_mut(page)
                .map_err(pdf_err)?
                .set("Annots", annots);
        }
        _ => {
            doc.get_dictionary_mut(page)
                .map_err(pdf_err)?
                .set("Annots", vec![reference]);
        }
    }
    Ok(())
}
