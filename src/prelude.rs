//! Prelude module for common imports

// Worker pools and requests
pub use crate::worker::{
    Artifact, PoolConfig, PoolError, PoolStats, RetryPolicy, TaskFamily, TaskManager,
    TaskOptions, TaskOutput, TaskPriority, TaskRequest, TaskResult,
};

// Operations and their options
pub use crate::tasks::{
    CompressOptions, CropRect, GifOptions, GifRepeat, GifRequest, ImageFormat, ImageRequest,
    PdfRequest, ResizeOptions, TrimRange, Validate,
};

// Validation
pub use crate::validation::{
    FileDescriptor, FileKind, ValidationError, ValidationOptions, ValidationResult, validate,
};

// PDF sessions
pub use crate::session::{
    ActionPanel, ActionParams, Annotation, AnnotationKind, PdfSession, Rotation, SessionError,
    SessionState, ViewTab, parse_page_order, parse_page_selection,
};

pub use crate::output::generate_filename;
