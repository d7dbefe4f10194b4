//! Results handed back by the pool.

use serde::Serialize;
use std::time::Duration;

use crate::session::DocumentProperties;
use crate::tasks::ImageFormat;

/// One produced file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Encoded bytes
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`
    pub mime_type: String,
    /// File extension without the leading dot
    pub extension: String,
    /// Length of `bytes`
    pub size: usize,
}

impl Artifact {
    /// Creates an artifact from raw parts
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            size: bytes.len(),
            bytes,
            mime_type: mime_type.into(),
            extension: extension.into(),
        }
    }

    /// Creates an image artifact in the given format
    #[must_use]
    pub fn image(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self::new(bytes, format.mime_type(), format.extension())
    }

    /// Creates a PDF artifact
    #[must_use]
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "application/pdf", "pdf")
    }
}

/// Output of a successful operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskOutput {
    /// Produced files, in page or frame order
    pub artifacts: Vec<Artifact>,
    /// Output width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Output height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Page count of the produced document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Number of encoded frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,
    /// Size of the input in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_size: Option<u64>,
    /// Document metadata, for inspection requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<DocumentProperties>,
}

impl TaskOutput {
    /// Output holding a single artifact
    #[must_use]
    pub fn single(artifact: Artifact) -> Self {
        Self {
            artifacts: vec![artifact],
            ..Self::default()
        }
    }

    /// Sets output dimensions
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Sets the page count
    #[must_use]
    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = Some(page_count);
        self
    }

    /// Sets the input size
    #[must_use]
    pub fn with_input_size(mut self, size: usize) -> Self {
        self.input_size = Some(size as u64);
        self
    }

    /// First artifact, if any
    #[must_use]
    pub fn primary(&self) -> Option<&Artifact> {
        self.artifacts.first()
    }
}

/// Outcome of one task as seen by the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    /// Whether the operation produced output
    pub success: bool,
    /// Output when `success` is true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<TaskOutput>,
    /// Failure message captured verbatim from the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time spent inside the slot, in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

impl TaskResult {
    /// Successful result
    #[must_use]
    pub fn succeeded(output: TaskOutput, duration: Duration) -> Self {
        Self {
            success: true,
            data: Some(output),
            error: None,
            duration_ms: millis(duration),
        }
    }

    /// Failed result
    #[must_use]
    pub fn failed(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms: millis(duration),
        }
    }

    /// Time spent inside the slot
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
