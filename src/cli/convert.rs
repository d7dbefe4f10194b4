//! `slixtools image`, `gif` and `pdf` - commands that run tasks
//!
//! Every input is validated first, then the request runs on a task manager
//! built from the configuration and each produced artifact is written to the
//! output directory.

use anyhow::{Context, Result, bail};
use slixtools::infrastructure::Config;
use slixtools::output::write_artifact;
use slixtools::session::{
    LopdfDocument, PdfDocument, Rotation, parse_page_order, parse_page_selection,
};
use slixtools::tasks::{
    CompressOptions, GifOptions, GifRepeat, GifRequest, ImageFormat, ImageRequest, PdfRequest,
    ResizeOptions,
};
use slixtools::validation::{FileDescriptor, FileKind, ValidationOptions, format_size, validate};
use slixtools::worker::{TaskManager, TaskOptions, TaskOutput, TaskRequest, TaskResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A processing command with its inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Resize an image
    Resize {
        /// Input image.
        file: PathBuf,
        /// Target width.
        width: u32,
        /// Target height.
        height: u32,
        /// Stretch instead of fitting.
        exact: bool,
        /// Output format.
        format: Option<ImageFormat>,
        /// Output quality.
        quality: Option<u8>,
    },
    /// Re-encode an image
    Compress {
        /// Input image.
        file: PathBuf,
        /// Output quality.
        quality: u8,
        /// Output format.
        format: Option<ImageFormat>,
    },
    /// Change an image's format
    Convert {
        /// Input image.
        file: PathBuf,
        /// Target format.
        format: ImageFormat,
        /// Output quality.
        quality: Option<u8>,
    },
    /// Animate still images
    Gif {
        /// Frames in order.
        files: Vec<PathBuf>,
        /// Frames per second.
        fps: u32,
        /// Output width.
        width: Option<u32>,
        /// Output height.
        height: Option<u32>,
        /// Encoder speed.
        quality: u8,
        /// Finite loop count.
        loops: Option<u16>,
    },
    /// Keep selected pages
    Extract {
        /// Input document.
        file: PathBuf,
        /// Page references.
        pages: String,
    },
    /// Remove selected pages
    Delete {
        /// Input document.
        file: PathBuf,
        /// Page references.
        pages: String,
    },
    /// Reorder pages
    Reorder {
        /// Input document.
        file: PathBuf,
        /// Full page order.
        order: String,
    },
    /// Rotate selected pages
    Rotate {
        /// Input document.
        file: PathBuf,
        /// Page references.
        pages: String,
        /// Clockwise degrees.
        degrees: i64,
    },
    /// Concatenate documents
    Merge {
        /// Documents in order.
        files: Vec<PathBuf>,
    },
}

impl Job {
    /// Prefix of the produced file names
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resized",
            Self::Compress { .. } => "compressed",
            Self::Convert { .. } => "converted",
            Self::Gif { .. } => "animated",
            Self::Extract { .. } => "split",
            Self::Delete { .. } => "deleted",
            Self::Reorder { .. } => "reordered",
            Self::Rotate { .. } => "rotated",
            Self::Merge { .. } => "merged",
        }
    }

    fn kind(&self) -> FileKind {
        match self {
            Self::Resize { .. } | Self::Compress { .. } | Self::Convert { .. } | Self::Gif { .. } => {
                FileKind::Image
            }
            _ => FileKind::Pdf,
        }
    }

    fn inputs(&self) -> &[PathBuf] {
        match self {
            Self::Resize { file, .. }
            | Self::Compress { file, .. }
            | Self::Convert { file, .. }
            | Self::Extract { file, .. }
            | Self::Delete { file, .. }
            | Self::Reorder { file, .. }
            | Self::Rotate { file, .. } => std::slice::from_ref(file),
            Self::Gif { files, .. } | Self::Merge { files } => files,
        }
    }

    fn source_name(&self) -> String {
        self.inputs()
            .first()
            .and_then(|path| path.file_name())
            .map_or_else(|| "file".to_string(), |name| name.to_string_lossy().into_owned())
    }
}

/// Validates, runs and writes the outputs of one job
pub fn run_job(config: &Config, job: Job) -> Result<()> {
    let options = config.validation_options(job.kind());
    for file in job.inputs() {
        check_input(file, &options)?;
    }
    let request = build_request(&job)?;
    let family = request.family();
    let operation = request.operation();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let manager = TaskManager::from_config(config);
    let result = runtime.block_on(async {
        let result = manager.execute(request, TaskOptions::default()).await;
        manager.terminate_all();
        result
    });
    let result = result.with_context(|| format!("{family} {operation} could not run"))?;
    tracing::info!(%family, operation, duration_ms = result.duration_ms, "task finished");

    let output = into_output(result).with_context(|| format!("{family} {operation} failed"))?;
    let written = write_outputs(&config.output_dir, &job, &output)?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn check_input(file: &Path, options: &ValidationOptions) -> Result<()> {
    let descriptor = FileDescriptor::from_path(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let result = validate(Some(&descriptor), options);
    for warning in &result.warnings {
        tracing::warn!(file = %file.display(), "{}", warning);
    }
    match result.violations.into_iter().next() {
        Some(violation) => Err(anyhow::Error::new(violation)
            .context(format!("{} cannot be processed", file.display()))),
        None => Ok(()),
    }
}

fn read(file: &Path) -> Result<Vec<u8>> {
    std::fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))
}

fn page_count(file: &Path, data: &[u8]) -> Result<u32> {
    let document = LopdfDocument::from_bytes(data)
        .with_context(|| format!("Failed to open PDF: {}", file.display()))?;
    Ok(document.page_count())
}

/// Turns a job into the task request it runs
pub fn build_request(job: &Job) -> Result<TaskRequest> {
    let request = match job {
        Job::Resize {
            file,
            width,
            height,
            exact,
            format,
            quality,
        } => TaskRequest::Image(ImageRequest::Resize {
            data: read(file)?,
            options: ResizeOptions {
                width: *width,
                height: *height,
                keep_aspect_ratio: !exact,
                format: *format,
                quality: *quality,
            },
        }),
        Job::Compress {
            file,
            quality,
            format,
        } => TaskRequest::Image(ImageRequest::Compress {
            data: read(file)?,
            options: CompressOptions {
                quality: *quality,
                format: *format,
            },
        }),
        Job::Convert {
            file,
            format,
            quality,
        } => TaskRequest::Image(ImageRequest::Convert {
            data: read(file)?,
            format: *format,
            quality: *quality,
        }),
        Job::Gif {
            files,
            fps,
            width,
            height,
            quality,
            loops,
        } => TaskRequest::Gif(GifRequest::FromImages {
            images: files.iter().map(|f| read(f)).collect::<Result<_>>()?,
            options: GifOptions {
                fps: *fps,
                quality: *quality,
                width: *width,
                height: *height,
                repeat: loops.map_or(GifRepeat::Infinite, GifRepeat::Finite),
                ..GifOptions::default()
            },
        }),
        Job::Extract { file, pages } => {
            let data = read(file)?;
            let pages = parse_page_selection(pages, page_count(file, &data)?)?;
            TaskRequest::Pdf(PdfRequest::Extract {
                data,
                pages: pages.into_iter().collect(),
            })
        }
        Job::Delete { file, pages } => {
            let data = read(file)?;
            let pages = parse_page_selection(pages, page_count(file, &data)?)?;
            TaskRequest::Pdf(PdfRequest::DeletePages {
                data,
                pages: pages.into_iter().collect(),
            })
        }
        Job::Reorder { file, order } => {
            let data = read(file)?;
            let order = parse_page_order(order, page_count(file, &data)?)?;
            TaskRequest::Pdf(PdfRequest::Reorder { data, order })
        }
        Job::Rotate {
            file,
            pages,
            degrees,
        } => {
            let Some(rotation) = Rotation::from_degrees(*degrees) else {
                bail!("rotation must be a multiple of 90 degrees, got {degrees}");
            };
            let data = read(file)?;
            let rotations: BTreeMap<u32, Rotation> =
                parse_page_selection(pages, page_count(file, &data)?)?
                    .into_iter()
                    .map(|page| (page, rotation))
                    .collect();
            TaskRequest::Pdf(PdfRequest::Rotate { data, rotations })
        }
        Job::Merge { files } => TaskRequest::Pdf(PdfRequest::Merge {
            documents: files.iter().map(|f| read(f)).collect::<Result<_>>()?,
        }),
    };
    Ok(request)
}

fn into_output(result: TaskResult) -> Result<TaskOutput> {
    if !result.success {
        bail!(
            "{}",
            result
                .error
                .unwrap_or_else(|| "operation failed without a reason".to_string())
        );
    }
    result.data.context("task produced no output")
}

fn write_outputs(dir: &Path, job: &Job, output: &TaskOutput) -> Result<Vec<PathBuf>> {
    let source = job.source_name();
    let many = output.artifacts.len() > 1;
    output
        .artifacts
        .iter()
        .enumerate()
        .map(|(index, artifact)| {
            let prefix = if many {
                format!("{}-{}", job.prefix(), index + 1)
            } else {
                job.prefix().to_string()
            };
            let path = write_artifact(dir, &prefix, &source, artifact)
                .with_context(|| format!("Failed to write output to: {}", dir.display()))?;
            tracing::debug!(path = %path.display(), size = %format_size(artifact.size as u64), "output written");
            Ok(path)
        })
        .collect()
}
