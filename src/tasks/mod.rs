//! Family handlers and conversion option models.
//!
//! A handler runs on a pool slot thread and turns one typed request into
//! output bytes. Handlers never panic across the slot boundary: failures are
//! reported as [`ExecutionError`] and become a failed
//! [`TaskResult`](crate::worker::TaskResult).

mod gif;
mod image;
pub mod options;
mod pdf;

use std::any::Any;
use std::sync::Arc;

pub use self::gif::{GifHandler, GifRequest, RawFrame};
pub use self::image::{ImageHandler, ImageRequest};
pub use self::pdf::{PdfHandler, PdfRequest};
pub use options::{
    CompressOptions, CropRect, GifOptions, GifRepeat, ImageFormat, OptionsError, ResizeOptions,
    TrimRange, Validate,
};

use crate::worker::{TaskFamily, TaskOutput, TaskRequest};

/// Runs the operations of one task family
pub trait FamilyHandler: Send + Sync {
    /// Family this handler serves
    fn family(&self) -> TaskFamily;

    /// Executes one request.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutionError`] when the input cannot be processed or the
    /// request belongs to another family.
    fn execute(&self, request: TaskRequest) -> Result<TaskOutput, ExecutionError>;
}

/// Handler shared between the slots of a pool
pub type SharedHandler = Arc<dyn FamilyHandler>;

/// The built-in handlers, one per family
#[must_use]
pub fn default_handlers() -> Vec<SharedHandler> {
    vec![
        Arc::new(ImageHandler),
        Arc::new(GifHandler),
        Arc::new(PdfHandler::default()),
    ]
}

/// Failure of an operation inside a slot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// Options failed validation
    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),

    /// Input bytes could not be decoded
    #[error("failed to decode input: {0}")]
    Decode(String),

    /// Output could not be encoded
    #[error("failed to encode output: {0}")]
    Encode(String),

    /// PDF structure error
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Request addressed to another family
    #[error("{family} handler cannot run '{operation}'")]
    WrongFamily {
        /// Family of the handler that received the request.
        family: TaskFamily,
        /// Operation that was requested.
        operation: &'static str,
    },

    /// Operation needs a collaborator that is not configured
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation panicked
    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    /// Converts a panic payload into an error
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::Panicked(message)
    }

    pub(crate) fn wrong_family(family: TaskFamily, request: &TaskRequest) -> Self {
        Self::WrongFamily {
            family,
            operation: request.operation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handlers_cover_every_family() {
        let mut families: Vec<_> = default_handlers().iter().map(|h| h.family()).collect();
        families.sort();
        assert_eq!(families, TaskFamily::ALL.to_vec());
    }

    #[test]
    fn test_from_panic_str() {
        let payload: Box<dyn Any + Send> = Box::new("kaboom");
        assert_eq!(
            ExecutionError::from_panic(payload.as_ref()),
            ExecutionError::Panicked("kaboom".to_string())
        );
    }

    #[test]
    fn test_from_panic_string() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("formatted kaboom"));
        assert_eq!(
            ExecutionError::from_panic(payload.as_ref()),
            ExecutionError::Panicked("formatted kaboom".to_string())
        );
    }

    #[test]
    fn test_options_error_converts() {
        let err: ExecutionError = OptionsError::Zero { field: "width" }.into();
        assert_eq!(err.to_string(), "invalid options: width must be greater than zero");
    }
}
