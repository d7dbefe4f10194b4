//! Image family: resize, compression and format conversion.

use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use ::image::imageops::FilterType;
use ::image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

use super::options::{CompressOptions, ImageFormat, ResizeOptions, Validate};
use super::{ExecutionError, FamilyHandler};
use crate::worker::{Artifact, TaskFamily, TaskOutput, TaskRequest};

/// JPEG quality used when a request does not name one
const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Operations of the image family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ImageRequest {
    /// Scale to new dimensions
    Resize {
        /// Encoded input image.
        data: Vec<u8>,
        /// Target size.
        options: ResizeOptions,
    },
    /// Re-encode with stronger compression
    Compress {
        /// Encoded input image.
        data: Vec<u8>,
        /// Compression parameters.
        #[serde(default)]
        options: CompressOptions,
    },
    /// Change the encoding format
    Convert {
        /// Encoded input image.
        data: Vec<u8>,
        /// Target format.
        format: ImageFormat,
        /// JPEG quality 1-100.
        #[serde(default)]
        quality: Option<u8>,
    },
}

impl ImageRequest {
    /// Operation name
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resize",
            Self::Compress { .. } => "compress",
            Self::Convert { .. } => "convert",
        }
    }
}

/// Handler for [`TaskFamily::Image`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHandler;

impl FamilyHandler for ImageHandler {
    fn family(&self) -> TaskFamily {
        TaskFamily::Image
    }

    fn execute(&self, request: TaskRequest) -> Result<TaskOutput, ExecutionError> {
        let request = match request {
            TaskRequest::Image(request) => request,
            other => return Err(ExecutionError::wrong_family(self.family(), &other)),
        };

        match request {
            ImageRequest::Resize { data, options } => resize(&data, &options),
            ImageRequest::Compress { data, options } => compress(&data, &options),
            ImageRequest::Convert {
                data,
                format,
                quality,
            } => convert(&data, format, quality),
        }
    }
}

fn decode(data: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>), ExecutionError> {
    if data.is_empty() {
        return Err(ExecutionError::Decode("input is empty".to_string()));
    }
    let detected = ::image::guess_format(data)
        .ok()
        .and_then(ImageFormat::from_image_format);
    let image =
        ::image::load_from_memory(data).map_err(|e| ExecutionError::Decode(e.to_string()))?;
    Ok((image, detected))
}

fn resize(data: &[u8], options: &ResizeOptions) -> Result<TaskOutput, ExecutionError> {
    options.validate()?;
    let (image, detected) = decode(data)?;
    let format = options.format.or(detected).unwrap_or(ImageFormat::Png);

    let resized = if options.keep_aspect_ratio {
        image.resize(options.width, options.height, FilterType::Lanczos3)
    } else {
        image.resize_exact(options.width, options.height, FilterType::Lanczos3)
    };
    debug!(
        from = ?(image.width(), image.height()),
        to = ?(resized.width(), resized.height()),
        %format,
        "resized image"
    );

    let bytes = encode(&resized, format, options.quality)?;
    Ok(TaskOutput::single(Artifact::image(bytes, format))
        .with_dimensions(resized.width(), resized.height())
        .with_input_size(data.len()))
}

fn compress(data: &[u8], options: &CompressOptions) -> Result<TaskOutput, ExecutionError> {
    options.validate()?;
    let (image, detected) = decode(data)?;
    let format = options.format.or(detected).unwrap_or(ImageFormat::Jpeg);

    let bytes = encode(&image, format, Some(options.quality))?;
    debug!(before = data.len(), after = bytes.len(), %format, "compressed image");
    Ok(TaskOutput::single(Artifact::image(bytes, format))
        .with_dimensions(image.width(), image.height())
        .with_input_size(data.len()))
}

fn convert(
    data: &[u8],
    format: ImageFormat,
    quality: Option<u8>,
) -> Result<TaskOutput, ExecutionError> {
    if let Some(quality) = quality {
        CompressOptions {
            quality,
            format: Some(format),
        }
        .validate()?;
    }
    let (image, _) = decode(data)?;
    let bytes = encode(&image, format, quality)?;
    Ok(TaskOutput::single(Artifact::image(bytes, format))
        .with_dimensions(image.width(), image.height())
        .with_input_size(data.len()))
}

/// Encodes `image` as `format`.
///
/// `quality` sets the JPEG quality; for PNG any value selects the strongest
/// compression. JPEG output drops the alpha channel.
pub(crate) fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: Option<u8>,
) -> Result<Vec<u8>, ExecutionError> {
    let encode_err = |e: ::image::ImageError| ExecutionError::Encode(e.to_string());
    let mut out = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100);
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
            encoder.encode_image(&image.to_rgb8()).map_err(encode_err)?;
        }
        ImageFormat::Png => {
            let compression = if quality.is_some() {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            let encoder = PngEncoder::new_with_quality(&mut out, compression, PngFilter::Adaptive);
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(encoder)
                .map_err(encode_err)?;
        }
        ImageFormat::Webp | ImageFormat::Gif => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), format.to_image_format())
                .map_err(encode_err)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::OptionsError;
    use crate::test_support::{sample_jpeg, sample_png};

    fn run(request: ImageRequest) -> Result<TaskOutput, ExecutionError> {
        ImageHandler.execute(TaskRequest::Image(request))
    }

    #[test]
    fn test_resize_keeps_aspect_ratio() {
        let out = run(ImageRequest::Resize {
            data: sample_png(200, 100),
            options: ResizeOptions::new(100, 100),
        })
        .unwrap();

        assert_eq!((out.width, out.height), (Some(100), Some(50)));
        let artifact = out.primary().unwrap();
        assert_eq!(artifact.mime_type, "image/png");
        let decoded = ::image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_resize_exact() {
        let out = run(ImageRequest::Resize {
            data: sample_jpeg(64, 32, 90),
            options: ResizeOptions::new(10, 10).exact(),
        })
        .unwrap();
        assert_eq!((out.width, out.height), (Some(10), Some(10)));
        assert_eq!(out.primary().unwrap().extension, "jpg");
    }

    #[test]
    fn test_resize_with_format_override() {
        let out = run(ImageRequest::Resize {
            data: sample_png(20, 20),
            options: ResizeOptions::new(10, 10).with_format(ImageFormat::Webp),
        })
        .unwrap();
        let artifact = out.primary().unwrap();
        assert_eq!(artifact.mime_type, "image/webp");
        assert_eq!(::image::guess_format(&artifact.bytes).unwrap(), ::image::ImageFormat::WebP);
    }

    #[test]
    fn test_compress_lowers_jpeg_size() {
        let data = sample_jpeg(128, 128, 100);
        let out = run(ImageRequest::Compress {
            data: data.clone(),
            options: CompressOptions {
                quality: 20,
                format: None,
            },
        })
        .unwrap();

        assert_eq!(out.input_size, Some(data.len() as u64));
        assert!(out.primary().unwrap().size < data.len());
    }

    #[test]
    fn test_convert_png_to_jpeg() {
        let out = run(ImageRequest::Convert {
            data: sample_png(8, 8),
            format: ImageFormat::Jpeg,
            quality: None,
        })
        .unwrap();
        let artifact = out.primary().unwrap();
        assert_eq!(::image::guess_format(&artifact.bytes).unwrap(), ::image::ImageFormat::Jpeg);
    }

    #[test]
    fn test_invalid_options_are_rejected_before_decoding() {
        let err = run(ImageRequest::Resize {
            data: Vec::new(),
            options: ResizeOptions::new(0, 10),
        })
        .unwrap_err();
        assert_eq!(err, ExecutionError::Options(OptionsError::Zero { field: "width" }));
    }

    #[test]
    fn test_garbage_input() {
        let err = run(ImageRequest::Convert {
            data: b"definitely not an image".to_vec(),
            format: ImageFormat::Png,
            quality: None,
        })
        .unwrap_err();
        assert!(matches!(err, ExecutionError::Decode(_)));
    }

    #[test]
    fn test_wrong_family() {
        let request = TaskRequest::Pdf(crate::tasks::PdfRequest::Info { data: Vec::new() });
        let err = ImageHandler.execute(request).unwrap_err();
        assert_eq!(err.to_string(), "image handler cannot run 'info'");
    }
}
