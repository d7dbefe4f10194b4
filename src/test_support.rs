//! Fixtures shared by unit tests.

use image::{DynamicImage, ImageFormat as CodecFormat, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::session::{
    CancellationToken, DocumentProperties, PageRenderer, PdfDocument, RenderError, RenderedPage,
    SessionError,
};

/// A letter-sized PDF whose page N shows the text `Page N`.
///
/// MediaBox and Resources live on the root Pages node so that page
/// operations have inherited attributes to deal with.
pub(crate) fn sample_pdf(page_count: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let kids: Vec<Object> = (1..=page_count)
        .map(|n| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::from(page_count),
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Sample"),
        "Author" => Object::string_literal("sLixTOOLS"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
    }))
}

/// PNG-encoded gradient
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut out), CodecFormat::Png)
        .unwrap();
    out
}

/// JPEG-encoded gradient at the given quality
pub(crate) fn sample_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&gradient(width, height).to_rgb8())
        .unwrap();
    out
}

/// In-memory document with fixed page texts
pub(crate) struct TextDocument {
    pages: Vec<String>,
}

impl TextDocument {
    pub(crate) fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(ToString::to_string).collect(),
        }
    }
}

impl PdfDocument for TextDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, page: u32) -> Result<String, SessionError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .cloned()
            .ok_or(SessionError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            })
    }

    fn properties(&self) -> DocumentProperties {
        DocumentProperties {
            page_count: self.page_count(),
            pdf_version: "1.7".to_string(),
            ..DocumentProperties::default()
        }
    }
}

/// Renderer producing flat grey pages of a fixed size at scale 1.0
pub(crate) struct SolidRenderer {
    width: u32,
    height: u32,
    rendered: AtomicU32,
    fail_on: Option<u32>,
    cancel_after: Option<(u32, CancellationToken)>,
}

impl SolidRenderer {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rendered: AtomicU32::new(0),
            fail_on: None,
            cancel_after: None,
        }
    }

    /// Fails when asked for `page`
    pub(crate) fn fail_on(mut self, page: u32) -> Self {
        self.fail_on = Some(page);
        self
    }

    /// Cancels `token` once `pages` pages have been rendered
    pub(crate) fn cancel_after(mut self, pages: u32, token: CancellationToken) -> Self {
        self.cancel_after = Some((pages, token));
        self
    }

    pub(crate) fn rendered(&self) -> u32 {
        self.rendered.load(Ordering::SeqCst)
    }
}

impl PageRenderer for SolidRenderer {
    fn render(&self, _document: &[u8], page: u32, scale: f32) -> Result<RenderedPage, RenderError> {
        if self.fail_on == Some(page) {
            return Err(RenderError(format!("cannot paint page {page}")));
        }
        let width = ((self.width as f32 * scale).round() as u32).max(1);
        let height = ((self.height as f32 * scale).round() as u32).max(1);
        let done = self.rendered.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after
            && done >= *limit
        {
            token.cancel();
        }
        Ok(RenderedPage {
            page,
            width,
            height,
            rgba: vec![128; (width * height * 4) as usize],
        })
    }
}
