//! Error categorisation and diagnostic reports for support.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error as StdError;
use uuid::Uuid;

use crate::tasks::ExecutionError;
use crate::validation::ValidationError;
use crate::worker::PoolError;

/// Broad class of a user-facing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input exceeds a size limit
    FileTooLarge,
    /// Input format not accepted or not decodable
    UnsupportedFormat,
    /// Operation ran out of time
    Timeout,
    /// Operation failed while running
    Processing,
    /// Anything else
    Unknown,
}

impl ErrorCategory {
    /// Short title for an error screen
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::FileTooLarge => "File too large",
            Self::UnsupportedFormat => "Unsupported file format",
            Self::Timeout => "Processing timed out",
            Self::Processing => "Processing failed",
            Self::Unknown => "Something went wrong",
        }
    }

    /// Remediation steps, most useful first
    #[must_use]
    pub fn suggestions(self) -> &'static [&'static str] {
        match self {
            Self::FileTooLarge => &[
                "Reduce the file size before uploading",
                "Split the file into smaller parts",
                "Lower the output resolution or quality",
            ],
            Self::UnsupportedFormat => &[
                "Check that the file format is supported",
                "Convert the file to a supported format first",
                "Make sure the file is not corrupted",
            ],
            Self::Timeout => &[
                "Try again with a smaller file",
                "Increase the task timeout",
                "Close other applications to free resources",
            ],
            Self::Processing => &[
                "Retry the operation",
                "Check the conversion options",
                "Try a different file",
            ],
            Self::Unknown => &["Retry the operation", "Export a diagnostic report for support"],
        }
    }

    /// Guesses the category from an error message
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if has(&["too large", "size limit", "exceeds"]) {
            Self::FileTooLarge
        } else if has(&["unsupported", "format", "decode", "not a pdf", "invalid pdf"]) {
            Self::UnsupportedFormat
        } else if has(&["timed out", "timeout"]) {
            Self::Timeout
        } else if has(&["failed", "error", "panicked"]) {
            Self::Processing
        } else {
            Self::Unknown
        }
    }
}

impl From<&PoolError> for ErrorCategory {
    fn from(err: &PoolError) -> Self {
        match err {
            PoolError::TaskTimeout { .. } => Self::Timeout,
            PoolError::InvalidRequest { .. } => Self::Processing,
            PoolError::UnknownFamily { .. }
            | PoolError::Transport { .. }
            | PoolError::PoolTerminated { .. } => Self::Unknown,
        }
    }
}

impl From<&ExecutionError> for ErrorCategory {
    fn from(err: &ExecutionError) -> Self {
        match err {
            ExecutionError::Decode(_) | ExecutionError::Unsupported(_) => Self::UnsupportedFormat,
            ExecutionError::Options(_)
            | ExecutionError::Encode(_)
            | ExecutionError::Pdf(_)
            | ExecutionError::WrongFamily { .. }
            | ExecutionError::Panicked(_) => Self::Processing,
        }
    }
}

impl From<&ValidationError> for ErrorCategory {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::TooLarge { .. } => Self::FileTooLarge,
            ValidationError::UnsupportedFormat { .. } => Self::UnsupportedFormat,
            ValidationError::Missing | ValidationError::Empty => Self::Unknown,
        }
    }
}

/// Support bundle describing one failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    /// Unique id to quote to support
    pub error_id: String,
    /// Category
    pub category: ErrorCategory,
    /// Top-level message
    pub message: String,
    /// Source chain, outermost first
    pub causes: Vec<String>,
    /// When the report was built
    pub timestamp: DateTime<Utc>,
    /// Program and platform
    pub user_agent: String,
    /// Remediation steps
    pub suggestions: Vec<String>,
}

impl DiagnosticReport {
    /// Builds a report with an explicit category
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            error_id: format!("err-{}", Uuid::new_v4().simple()),
            category,
            message: message.into(),
            causes: Vec::new(),
            timestamp: Utc::now(),
            user_agent: user_agent(),
            suggestions: category.suggestions().iter().map(ToString::to_string).collect(),
        }
    }

    /// Builds a report from an error, walking its source chain and guessing
    /// the category from the message
    #[must_use]
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let message = err.to_string();
        let mut report = Self::new(ErrorCategory::from_message(&message), message);
        let mut source = err.source();
        while let Some(cause) = source {
            report.causes.push(cause.to_string());
            source = cause.source();
        }
        report
    }

    /// Builds a report from an `anyhow` error chain
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let category = err
            .chain()
            .find_map(|cause| {
                cause
                    .downcast_ref::<PoolError>()
                    .map(ErrorCategory::from)
                    .or_else(|| cause.downcast_ref::<ExecutionError>().map(ErrorCategory::from))
                    .or_else(|| cause.downcast_ref::<ValidationError>().map(ErrorCategory::from))
            })
            .unwrap_or_else(|| ErrorCategory::from_message(&format!("{err:#}")));
        let mut report = Self::new(category, err.to_string());
        report.causes = err.chain().skip(1).map(ToString::to_string).collect();
        report
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which only happens on I/O-backed writers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn user_agent() -> String {
    format!(
        "slixtools/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{TaskFamily, TaskId};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case("file is too large (60.0 MB), maximum is 50.0 MB", ErrorCategory::FileTooLarge)]
    #[case("unsupported file format 'text/plain'", ErrorCategory::UnsupportedFormat)]
    #[case("task task-1 timed out after 30s", ErrorCategory::Timeout)]
    #[case("encoder failed", ErrorCategory::Processing)]
    #[case("hmm", ErrorCategory::Unknown)]
    fn test_from_message(#[case] message: &str, #[case] expected: ErrorCategory) {
        assert_eq!(ErrorCategory::from_message(message), expected);
    }

    #[test]
    fn test_typed_categories() {
        let timeout = PoolError::TaskTimeout {
            id: TaskId::new(),
            timeout: Duration::from_millis(10),
        };
        assert_eq!(ErrorCategory::from(&timeout), ErrorCategory::Timeout);
        assert_eq!(
            ErrorCategory::from(&ExecutionError::Decode("bad".into())),
            ErrorCategory::UnsupportedFormat
        );
        assert_eq!(
            ErrorCategory::from(&PoolError::PoolTerminated {
                family: TaskFamily::Gif
            }),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_report_from_anyhow_uses_typed_cause() {
        let err = anyhow::Error::new(ValidationError::TooLarge { size: 10, max: 5 })
            .context("cannot process photo.jpg");
        let report = DiagnosticReport::from_anyhow(&err);

        assert_eq!(report.category, ErrorCategory::FileTooLarge);
        assert_eq!(report.message, "cannot process photo.jpg");
        assert_eq!(report.causes, vec!["file is too large (10 B), maximum is 5 B"]);
        assert!(report.error_id.starts_with("err-"));
        assert_eq!(report.suggestions.len(), 3);
    }

    #[test]
    fn test_report_json_shape() {
        let report = DiagnosticReport::new(ErrorCategory::Timeout, "took too long");
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["category"], "timeout");
        assert_eq!(json["message"], "took too long");
        assert!(json["errorId"].is_string());
        assert!(json["userAgent"].as_str().unwrap().starts_with("slixtools/"));
    }
}
