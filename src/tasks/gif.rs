//! GIF family: animated GIF encoding from decoded frames.

use ::image::codecs::gif::{GifEncoder, Repeat};
use ::image::imageops::{self, FilterType};
use ::image::{Delay, Frame, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::options::{GifOptions, GifRepeat, ImageFormat, OptionsError, Validate};
use super::{ExecutionError, FamilyHandler};
use crate::worker::{Artifact, TaskFamily, TaskOutput, TaskRequest};

/// One decoded RGBA8 frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major RGBA8 pixels, `width * height * 4` bytes
    pub rgba: Vec<u8>,
}

impl RawFrame {
    fn into_image(self, index: usize) -> Result<RgbaImage, ExecutionError> {
        let (width, height, len) = (self.width, self.height, self.rgba.len());
        RgbaImage::from_raw(width, height, self.rgba).ok_or_else(|| {
            ExecutionError::Decode(format!(
                "frame {index} holds {len} bytes, expected {} for {width}x{height}",
                u64::from(width) * u64::from(height) * 4
            ))
        })
    }
}

/// Operations of the GIF family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GifRequest {
    /// Encode frames sampled from a video at `options.fps`
    EncodeFrames {
        /// Frames in playback order.
        frames: Vec<RawFrame>,
        /// Encoding parameters.
        #[serde(default)]
        options: GifOptions,
    },
    /// Encode a slideshow from still images
    FromImages {
        /// Encoded images in playback order.
        images: Vec<Vec<u8>>,
        /// Encoding parameters.
        #[serde(default)]
        options: GifOptions,
    },
}

impl GifRequest {
    /// Operation name
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::EncodeFrames { .. } => "encode_frames",
            Self::FromImages { .. } => "from_images",
        }
    }
}

/// Handler for [`TaskFamily::Gif`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GifHandler;

impl FamilyHandler for GifHandler {
    fn family(&self) -> TaskFamily {
        TaskFamily::Gif
    }

    fn execute(&self, request: TaskRequest) -> Result<TaskOutput, ExecutionError> {
        let request = match request {
            TaskRequest::Gif(request) => request,
            other => return Err(ExecutionError::wrong_family(self.family(), &other)),
        };

        match request {
            GifRequest::EncodeFrames { frames, options } => {
                options.validate()?;
                let input_size = frames.iter().map(|f| f.rgba.len()).sum();
                let frames = frames
                    .into_iter()
                    .enumerate()
                    .filter(|(index, _)| options.keeps_frame(*index))
                    .map(|(index, frame)| frame.into_image(index))
                    .collect::<Result<Vec<_>, _>>()?;
                encode(frames, &options, input_size)
            }
            GifRequest::FromImages { images, options } => {
                options.validate()?;
                let input_size = images.iter().map(Vec::len).sum();
                let frames = images
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| options.keeps_frame(*index))
                    .map(|(index, data)| {
                        ::image::load_from_memory(data)
                            .map(|img| img.to_rgba8())
                            .map_err(|e| ExecutionError::Decode(format!("image {index}: {e}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                encode(frames, &options, input_size)
            }
        }
    }
}

/// Output size from the requested width/height and the source aspect ratio
fn target_size(options: &GifOptions, width: u32, height: u32) -> (u32, u32) {
    let scaled = |value: u32, num: u32, den: u32| {
        let v = u64::from(value) * u64::from(num) / u64::from(den.max(1));
        u32::try_from(v).unwrap_or(u32::MAX).max(1)
    };
    match (options.width, options.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, scaled(w, height, width)),
        (None, Some(h)) => (scaled(h, width, height), h),
        (None, None) => (width, height),
    }
}

fn encode(
    frames: Vec<RgbaImage>,
    options: &GifOptions,
    input_size: usize,
) -> Result<TaskOutput, ExecutionError> {
    let Some(first) = frames.first() else {
        return Err(OptionsError::Empty("frame inside the trim window").into());
    };

    let (source_width, source_height) = match options.crop {
        Some(crop) => {
            crop.check_fits(first.width(), first.height())?;
            (crop.width, crop.height)
        }
        None => first.dimensions(),
    };
    let (width, height) = target_size(options, source_width, source_height);

    let mut prepared = Vec::with_capacity(frames.len());
    for frame in frames {
        let frame = match options.crop {
            Some(crop) => {
                crop.check_fits(frame.width(), frame.height())?;
                imageops::crop_imm(&frame, crop.x, crop.y, crop.width, crop.height).to_image()
            }
            None => frame,
        };
        let frame = if frame.dimensions() == (width, height) {
            frame
        } else {
            imageops::resize(&frame, width, height, FilterType::Triangle)
        };
        prepared.push(frame);
    }

    let frame_count = u32::try_from(prepared.len()).unwrap_or(u32::MAX);
    let delay = Delay::from_saturating_duration(options.frame_delay());
    let repeat = match options.repeat {
        GifRepeat::Infinite => Repeat::Infinite,
        GifRepeat::Finite(times) => Repeat::Finite(times),
    };

    let encode_err = |e: ::image::ImageError| ExecutionError::Encode(e.to_string());
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, i32::from(options.quality));
        encoder.set_repeat(repeat).map_err(encode_err)?;
        encoder
            .encode_frames(
                prepared
                    .into_iter()
                    .map(|buffer| Frame::from_parts(buffer, 0, 0, delay)),
            )
            .map_err(encode_err)?;
    }
    debug!(frame_count, width, height, bytes = out.len(), "encoded GIF");

    let mut output = TaskOutput::single(Artifact::image(out, ImageFormat::Gif))
        .with_dimensions(width, height)
        .with_input_size(input_size);
    output.frame_count = Some(frame_count);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{CropRect, TrimRange};
    use crate::test_support::sample_png;
    use ::image::AnimationDecoder;
    use ::image::codecs::gif::GifDecoder;
    use std::io::Cursor;

    fn solid(width: u32, height: u32, shade: u8) -> RawFrame {
        RawFrame {
            width,
            height,
            rgba: [shade, 0, 255 - shade, 255].repeat((width * height) as usize),
        }
    }

    fn run(request: GifRequest) -> Result<TaskOutput, ExecutionError> {
        GifHandler.execute(TaskRequest::Gif(request))
    }

    fn decoded_frames(bytes: &[u8]) -> Vec<::image::Frame> {
        GifDecoder::new(Cursor::new(bytes))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap()
    }

    #[test]
    fn test_encode_frames() {
        let frames = (0..5u8).map(|i| solid(16, 8, i * 40)).collect();
        let out = run(GifRequest::EncodeFrames {
            frames,
            options: GifOptions::default(),
        })
        .unwrap();

        assert_eq!(out.frame_count, Some(5));
        assert_eq!((out.width, out.height), (Some(16), Some(8)));
        let gif = out.primary().unwrap();
        assert_eq!(gif.mime_type, "image/gif");
        assert!(gif.bytes.starts_with(b"GIF8"));
        assert_eq!(decoded_frames(&gif.bytes).len(), 5);
    }

    #[test]
    fn test_width_only_keeps_aspect_ratio() {
        let options = GifOptions {
            width: Some(8),
            ..GifOptions::default()
        };
        let out = run(GifRequest::EncodeFrames {
            frames: vec![solid(16, 8, 0)],
            options,
        })
        .unwrap();
        assert_eq!((out.width, out.height), (Some(8), Some(4)));
    }

    #[test]
    fn test_trim_drops_frames_outside_window() {
        // 10 fps: frame i sits at i * 100 ms
        let options = GifOptions {
            trim: Some(TrimRange {
                start_ms: 200,
                end_ms: 500,
            }),
            ..GifOptions::default()
        };
        let frames = (0..10u8).map(|i| solid(4, 4, i)).collect();
        let out = run(GifRequest::EncodeFrames { frames, options }).unwrap();
        assert_eq!(out.frame_count, Some(3));
    }

    #[test]
    fn test_trim_past_the_end_is_an_error() {
        let options = GifOptions {
            trim: Some(TrimRange {
                start_ms: 10_000,
                end_ms: 20_000,
            }),
            ..GifOptions::default()
        };
        let err = run(GifRequest::EncodeFrames {
            frames: vec![solid(4, 4, 0)],
            options,
        })
        .unwrap_err();
        assert!(matches!(err, ExecutionError::Options(OptionsError::Empty(_))));
    }

    #[test]
    fn test_crop_applies_before_resize() {
        let options = GifOptions {
            crop: Some(CropRect {
                x: 2,
                y: 2,
                width: 10,
                height: 4,
            }),
            ..GifOptions::default()
        };
        let out = run(GifRequest::EncodeFrames {
            frames: vec![solid(16, 8, 0), solid(16, 8, 90)],
            options,
        })
        .unwrap();
        assert_eq!((out.width, out.height), (Some(10), Some(4)));
    }

    #[test]
    fn test_crop_outside_frame() {
        let options = GifOptions {
            crop: Some(CropRect {
                x: 10,
                y: 0,
                width: 10,
                height: 4,
            }),
            ..GifOptions::default()
        };
        let err = run(GifRequest::EncodeFrames {
            frames: vec![solid(16, 8, 0)],
            options,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Options(OptionsError::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_short_frame_buffer() {
        let frame = RawFrame {
            width: 4,
            height: 4,
            rgba: vec![0; 10],
        };
        let err = run(GifRequest::EncodeFrames {
            frames: vec![frame],
            options: GifOptions::default(),
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to decode input: frame 0 holds 10 bytes, expected 64 for 4x4"
        );
    }

    #[test]
    fn test_invalid_fps() {
        let options = GifOptions {
            fps: 0,
            ..GifOptions::default()
        };
        let err = run(GifRequest::EncodeFrames {
            frames: vec![solid(4, 4, 0)],
            options,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Options(OptionsError::OutOfRange { field: "fps", .. })
        ));
    }

    #[test]
    fn test_slideshow_from_mixed_sizes() {
        let out = run(GifRequest::FromImages {
            images: vec![sample_png(20, 10), sample_png(40, 40)],
            options: GifOptions::default(),
        })
        .unwrap();
        assert_eq!(out.frame_count, Some(2));
        assert_eq!((out.width, out.height), (Some(20), Some(10)));
    }
}
