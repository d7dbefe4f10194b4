//! Conversion option models.
//!
//! Plain data describing the desired output of an operation. Every model is
//! checked with [`Validate`] before a handler touches the input.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for validating option models
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this value
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    fn validate(&self) -> Result<(), Self::Error>;
}

/// Violations of option constraints
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// Numeric value outside its allowed range
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Smallest allowed value.
        min: u32,
        /// Largest allowed value.
        max: u32,
        /// Value that was given.
        value: u32,
    },

    /// Dimension that must be positive
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Trim end not after trim start
    #[error("trim end ({end_ms} ms) must be after trim start ({start_ms} ms)")]
    InvalidTrim {
        /// Trim start in milliseconds.
        start_ms: u64,
        /// Trim end in milliseconds.
        end_ms: u64,
    },

    /// Crop rectangle outside the frame
    #[error("crop {width}x{height} at ({x}, {y}) does not fit a {frame_width}x{frame_height} frame")]
    CropOutOfBounds {
        /// Left edge.
        x: u32,
        /// Top edge.
        y: u32,
        /// Crop width.
        width: u32,
        /// Crop height.
        height: u32,
        /// Frame width.
        frame_width: u32,
        /// Frame height.
        frame_height: u32,
    },

    /// A required list is empty
    #[error("at least one {0} is required")]
    Empty(&'static str),
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), OptionsError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(OptionsError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

fn check_positive(field: &'static str, value: Option<u32>) -> Result<(), OptionsError> {
    match value {
        Some(0) => Err(OptionsError::Zero { field }),
        _ => Ok(()),
    }
}

/// Raster output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG
    Png,
    /// JPEG
    #[serde(alias = "jpg")]
    Jpeg,
    /// Lossless WebP
    Webp,
    /// Single-frame GIF
    Gif,
}

impl ImageFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    /// MIME type
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Parses an extension, with or without the leading dot
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Maps a decoder format onto an output format
    #[must_use]
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::WebP => Some(Self::Webp),
            image::ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    /// Encoder format for this output
    #[must_use]
    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Webp => image::ImageFormat::WebP,
            Self::Gif => image::ImageFormat::Gif,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .ok_or_else(|| format!("unsupported image format '{s}' (expected png, jpeg, webp or gif)"))
    }
}

fn default_true() -> bool {
    true
}

/// Target dimensions for an image resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeOptions {
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// Fit inside the box instead of stretching to it
    #[serde(default = "default_true")]
    pub keep_aspect_ratio: bool,
    /// Output format, the input's format when absent
    #[serde(default)]
    pub format: Option<ImageFormat>,
    /// JPEG quality 1-100
    #[serde(default)]
    pub quality: Option<u8>,
}

impl ResizeOptions {
    /// Resize into a `width` x `height` box, keeping the aspect ratio
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            keep_aspect_ratio: true,
            format: None,
            quality: None,
        }
    }

    /// Stretches to exactly `width` x `height`
    #[must_use]
    pub fn exact(mut self) -> Self {
        self.keep_aspect_ratio = false;
        self
    }

    /// Sets the output format
    #[must_use]
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }
}

impl Validate for ResizeOptions {
    type Error = OptionsError;

    fn validate(&self) -> Result<(), Self::Error> {
        check_positive("width", Some(self.width))?;
        check_positive("height", Some(self.height))?;
        if let Some(quality) = self.quality {
            check_range("quality", u32::from(quality), 1, 100)?;
        }
        Ok(())
    }
}

/// Re-encoding parameters for image compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressOptions {
    /// JPEG quality 1-100; PNG output always uses the strongest compression
    pub quality: u8,
    /// Output format, the input's format when absent
    pub format: Option<ImageFormat>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: 80,
            format: None,
        }
    }
}

impl Validate for CompressOptions {
    type Error = OptionsError;

    fn validate(&self) -> Result<(), Self::Error> {
        check_range("quality", u32::from(self.quality), 1, 100)
    }
}

/// Rectangular region of a frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl CropRect {
    /// Checks the region against a frame size
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::CropOutOfBounds`] if any edge lies outside.
    pub fn check_fits(&self, frame_width: u32, frame_height: u32) -> Result<(), OptionsError> {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        match (right, bottom) {
            (Some(r), Some(b)) if r <= frame_width && b <= frame_height => Ok(()),
            _ => Err(OptionsError::CropOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                frame_width,
                frame_height,
            }),
        }
    }
}

/// Time window of the source to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimRange {
    /// Inclusive start, milliseconds
    pub start_ms: u64,
    /// Exclusive end, milliseconds
    pub end_ms: u64,
}

impl TrimRange {
    /// Returns true if `at_ms` falls inside the window
    #[must_use]
    pub fn contains(&self, at_ms: u64) -> bool {
        (self.start_ms..self.end_ms).contains(&at_ms)
    }
}

/// Loop behaviour of an animated GIF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GifRepeat {
    /// Loop forever
    #[default]
    Infinite,
    /// Play the given number of times
    Finite(u16),
}

/// Parameters for GIF encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GifOptions {
    /// Frames per second, 1-50
    pub fps: u32,
    /// Encoder speed/quality trade-off, 1 (best) to 30 (fastest)
    pub quality: u8,
    /// Output width; derived from the height and aspect ratio when absent
    pub width: Option<u32>,
    /// Output height; derived from the width and aspect ratio when absent
    pub height: Option<u32>,
    /// Time window of the source frames to keep
    pub trim: Option<TrimRange>,
    /// Region of each frame to keep, applied before resizing
    pub crop: Option<CropRect>,
    /// Loop behaviour
    pub repeat: GifRepeat,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            fps: 10,
            quality: 10,
            width: None,
            height: None,
            trim: None,
            crop: None,
            repeat: GifRepeat::Infinite,
        }
    }
}

impl GifOptions {
    /// Delay between consecutive frames
    #[must_use]
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }

    /// Source timestamp of the frame at `index`, in milliseconds
    #[must_use]
    pub fn frame_time_ms(&self, index: usize) -> u64 {
        (index as u64).saturating_mul(1000) / u64::from(self.fps.max(1))
    }

    /// Returns true if the frame at `index` survives trimming
    #[must_use]
    pub fn keeps_frame(&self, index: usize) -> bool {
        self.trim
            .is_none_or(|trim| trim.contains(self.frame_time_ms(index)))
    }
}

impl Validate for GifOptions {
    type Error = OptionsError;

    fn validate(&self) -> Result<(), Self::Error> {
        check_range("fps", self.fps, 1, 50)?;
        check_range("quality", u32::from(self.quality), 1, 30)?;
        check_positive("width", self.width)?;
        check_positive("height", self.height)?;
        if let Some(trim) = self.trim
            && trim.end_ms <= trim.start_ms
        {
            return Err(OptionsError::InvalidTrim {
                start_ms: trim.start_ms,
                end_ms: trim.end_ms,
            });
        }
        if let Some(crop) = self.crop {
            check_positive("crop width", Some(crop.width))?;
            check_positive("crop height", Some(crop.height))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_resize_options_deserialize_defaults() {
        let options: ResizeOptions =
            serde_json::from_str(r#"{"width": 100, "height": 50}"#).unwrap();
        assert_eq!(options, ResizeOptions::new(100, 50));
        assert!(options.keep_aspect_ratio);
    }

    #[test]
    fn test_resize_options_zero_width() {
        let err = ResizeOptions::new(0, 10).validate().unwrap_err();
        assert_eq!(err, OptionsError::Zero { field: "width" });
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(100, true)]
    #[case(101, false)]
    fn test_compress_quality_bounds(#[case] quality: u8, #[case] valid: bool) {
        let options = CompressOptions {
            quality,
            format: None,
        };
        assert_eq!(options.validate().is_ok(), valid);
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(50, true)]
    #[case(51, false)]
    fn test_gif_fps_bounds(#[case] fps: u32, #[case] valid: bool) {
        let options = GifOptions {
            fps,
            ..GifOptions::default()
        };
        assert_eq!(options.validate().is_ok(), valid);
    }

    #[test]
    fn test_gif_trim_must_move_forward() {
        let options = GifOptions {
            trim: Some(TrimRange {
                start_ms: 500,
                end_ms: 500,
            }),
            ..GifOptions::default()
        };
        assert_eq!(
            options.validate().unwrap_err(),
            OptionsError::InvalidTrim {
                start_ms: 500,
                end_ms: 500
            }
        );
    }

    #[test]
    fn test_gif_frame_timing() {
        let options = GifOptions {
            fps: 4,
            trim: Some(TrimRange {
                start_ms: 250,
                end_ms: 750,
            }),
            ..GifOptions::default()
        };
        assert_eq!(options.frame_delay(), Duration::from_millis(250));
        assert!(!options.keeps_frame(0));
        assert!(options.keeps_frame(1));
        assert!(options.keeps_frame(2));
        assert!(!options.keeps_frame(3));
    }

    #[test]
    fn test_crop_fits() {
        let crop = CropRect {
            x: 10,
            y: 10,
            width: 20,
            height: 20,
        };
        assert!(crop.check_fits(30, 30).is_ok());
        assert!(crop.check_fits(29, 30).is_err());
    }

    #[test]
    fn test_image_format_extension_aliases() {
        assert_eq!(ImageFormat::from_extension(".JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("tiff"), None);
        let parsed: ImageFormat = serde_json::from_str(r#""jpg""#).unwrap();
        assert_eq!(parsed, ImageFormat::Jpeg);
    }

    #[test]
    fn test_gif_options_partial_json() {
        let options: GifOptions = serde_json::from_str(r#"{"fps": 15}"#).unwrap();
        assert_eq!(options.fps, 15);
        assert_eq!(options.quality, 10);
        assert_eq!(options.repeat, GifRepeat::Infinite);
    }
}
