//! Annotation and rotation overlay.
//!
//! Geometry is in PDF points with the origin at the top-left corner of the
//! unrotated page, which is how a canvas reports pointer positions once the
//! zoom factor is divided out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Overlay-unique annotation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A position on the page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Distance from the left edge
    pub x: f32,
    /// Distance from the top edge
    pub y: f32,
}

impl Point {
    /// Creates a point
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Rect {
    /// Creates a rectangle
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two opposite corners, in any order
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Smallest rectangle containing every point
    #[must_use]
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min, mut max) = (*first, *first);
        for p in &points[1..] {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        Some(Self::from_corners(min, max))
    }

    /// Right edge
    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge
    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Color {
    /// Highlighter yellow
    pub const YELLOW: Self = Self::rgb(255, 235, 59);
    /// Pen red
    pub const RED: Self = Self::rgb(229, 57, 53);
    /// Black
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    /// Creates a color
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` or `rrggbb`
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Components in the 0.0-1.0 range
    #[must_use]
    pub fn components(self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| f32::from(c) / 255.0)
    }
}

/// Drawing style of an annotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    /// Stroke or fill color
    pub color: Color,
    /// Stroke width in points
    pub stroke_width: f32,
    /// 0.0 transparent to 1.0 opaque
    pub opacity: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            color: Color::RED,
            stroke_width: 2.0,
            opacity: 1.0,
        }
    }
}

impl AnnotationStyle {
    /// Translucent yellow used for highlights
    #[must_use]
    pub fn highlighter() -> Self {
        Self {
            color: Color::YELLOW,
            stroke_width: 0.0,
            opacity: 0.4,
        }
    }
}

/// Shape of an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Text highlight over a region
    Highlight {
        /// Highlighted region.
        rect: Rect,
    },
    /// Rectangle outline
    Rectangle {
        /// Outlined region.
        rect: Rect,
    },
    /// Free text note
    Text {
        /// Top-left corner of the text box.
        at: Point,
        /// Note contents.
        text: String,
        /// Font size in points.
        font_size: f32,
    },
    /// Freehand pen stroke
    Freehand {
        /// Stroke points in drawing order.
        points: Vec<Point>,
    },
}

impl AnnotationKind {
    /// Region covered by the annotation
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Highlight { rect } | Self::Rectangle { rect } => *rect,
            Self::Text {
                at,
                text,
                font_size,
            } => {
                let width = text.chars().count() as f32 * font_size * 0.6;
                Rect::new(at.x, at.y, width, font_size * 1.2)
            }
            Self::Freehand { points } => {
                Rect::bounding(points).unwrap_or_else(|| Rect::new(0.0, 0.0, 0.0, 0.0))
            }
        }
    }

    /// Returns true for highlights
    #[must_use]
    pub fn is_highlight(&self) -> bool {
        matches!(self, Self::Highlight { .. })
    }
}

/// One annotation on one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Identifier
    pub id: AnnotationId,
    /// 1-indexed page
    pub page: u32,
    /// Shape
    pub kind: AnnotationKind,
    /// Style
    #[serde(default)]
    pub style: AnnotationStyle,
}

/// Clockwise page rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    /// Upright
    #[default]
    None,
    /// 90 degrees clockwise
    Quarter,
    /// 180 degrees
    Half,
    /// 270 degrees clockwise
    ThreeQuarter,
}

impl Rotation {
    /// Rotation in degrees, 0-270
    #[must_use]
    pub fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Quarter => 90,
            Self::Half => 180,
            Self::ThreeQuarter => 270,
        }
    }

    /// Normalizes any multiple of 90 degrees, including negative ones
    #[must_use]
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Self::None),
            90 => Some(Self::Quarter),
            180 => Some(Self::Half),
            _ => Some(Self::ThreeQuarter),
        }
    }

    /// Adds another rotation
    #[must_use]
    pub fn then(self, other: Self) -> Self {
        Self::from_degrees(i64::from(self.degrees()) + i64::from(other.degrees()))
            .unwrap_or_default()
    }

    /// One more quarter turn clockwise
    #[must_use]
    pub fn clockwise(self) -> Self {
        self.then(Self::Quarter)
    }

    /// One quarter turn counter-clockwise
    #[must_use]
    pub fn counter_clockwise(self) -> Self {
        self.then(Self::ThreeQuarter)
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        if degrees >= 360 {
            return Err(format!("rotation must be below 360 degrees, got {degrees}"));
        }
        Self::from_degrees(i64::from(degrees))
            .ok_or_else(|| format!("rotation must be a multiple of 90 degrees, got {degrees}"))
    }
}

/// Annotations and rotation overrides of one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    annotations: Vec<Annotation>,
    rotations: BTreeMap<u32, Rotation>,
    next_id: u64,
}

impl Overlay {
    /// Creates an empty overlay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an annotation and returns its id
    pub fn add(&mut self, page: u32, kind: AnnotationKind, style: AnnotationStyle) -> AnnotationId {
        self.next_id += 1;
        let id = AnnotationId(self.next_id);
        self.annotations.push(Annotation {
            id,
            page,
            kind,
            style,
        });
        id
    }

    /// Removes an annotation
    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(index))
    }

    /// Looks up an annotation
    #[must_use]
    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// Every annotation in creation order
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations of one page in creation order
    pub fn on_page(&self, page: u32) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.page == page)
    }

    /// Removes every annotation of a page, returning how many were removed
    pub fn clear_page(&mut self, page: u32) -> usize {
        let before = self.annotations.len();
        self.annotations.retain(|a| a.page != page);
        before - self.annotations.len()
    }

    /// Rotation override of a page
    #[must_use]
    pub fn rotation(&self, page: u32) -> Rotation {
        self.rotations.get(&page).copied().unwrap_or_default()
    }

    /// Sets a page's rotation override; upright removes the override
    pub fn set_rotation(&mut self, page: u32, rotation: Rotation) {
        if rotation == Rotation::None {
            self.rotations.remove(&page);
        } else {
            self.rotations.insert(page, rotation);
        }
    }

    /// Turns a page by a quarter and returns its new rotation
    pub fn rotate_page(&mut self, page: u32, clockwise: bool) -> Rotation {
        let current = self.rotation(page);
        let next = if clockwise {
            current.clockwise()
        } else {
            current.counter_clockwise()
        };
        self.set_rotation(page, next);
        next
    }

    /// Pages with a non-upright override, in page order
    #[must_use]
    pub fn rotations(&self) -> &BTreeMap<u32, Rotation> {
        &self.rotations
    }

    /// Returns true if there is nothing to export
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.rotations.is_empty()
    }

    /// Drops every annotation and rotation
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.rotations.clear();
    }
}
