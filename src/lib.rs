//! # slixtools - file-processing core
//!
//! Runs image, GIF and PDF conversions on fixed-size worker pools, validates
//! input files before they are processed, and keeps the view and edit state
//! of an open PDF document.
//!
//! ## Quick Start
//!
//! ```no_run
//! use slixtools::prelude::*;
//!
//! # async fn demo(jpeg: Vec<u8>) -> Result<(), PoolError> {
//! let manager = TaskManager::builder().with_default_handlers().build();
//! let request = TaskRequest::Image(ImageRequest::Resize {
//!     data: jpeg,
//!     options: ResizeOptions::new(100, 100),
//! });
//! let result = manager.execute(request, TaskOptions::default()).await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Worker pools**: one bounded pool per task family, FIFO dispatch,
//!   per-task timeouts and retries with backoff
//! - **Validation**: size ceilings, accepted formats and warnings, reported
//!   all at once
//! - **PDF sessions**: page navigation, zoom, annotations, search and
//!   thumbnails; edits export as new documents
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod diagnostics;
pub mod infrastructure;
pub mod output;
pub mod session;
pub mod tasks;
pub mod validation;
pub mod worker;

// Prelude module for common imports
pub mod prelude;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use diagnostics::{DiagnosticReport, ErrorCategory};
pub use infrastructure::{Config, ConfigError, init_logging};
pub use session::{PdfSession, SessionError, SessionState};
pub use tasks::{ExecutionError, ImageFormat, Validate};
pub use validation::{FileDescriptor, ValidationOptions, ValidationResult, validate};
pub use worker::{
    PoolError, TaskFamily, TaskManager, TaskOptions, TaskOutput, TaskRequest, TaskResult,
};

/// Version of the slixtools crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
