//! File validation.
//!
//! Every user-supplied file passes through [`validate`] before a task is
//! built from it. Validation never fails: callers always get a
//! [`ValidationResult`] listing every violation and warning found.

mod file;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use file::FileDescriptor;

const MB: u64 = 1024 * 1024;

/// Files above this size validate with a warning
pub const LARGE_FILE_WARNING: u64 = 50 * MB;

/// Caller-supplied validator that replaces the built-in checks
pub type CustomValidator = Arc<dyn Fn(Option<&FileDescriptor>) -> ValidationResult + Send + Sync>;

/// Kinds of input with their own limits and formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Raster images
    Image,
    /// Video sources for GIF conversion
    Video,
    /// PDF documents
    Pdf,
    /// Anything
    General,
}

impl FileKind {
    /// Default size ceiling
    #[must_use]
    pub fn default_max_size(self) -> u64 {
        match self {
            Self::Image => 50 * MB,
            Self::Video | Self::Pdf | Self::General => 100 * MB,
        }
    }

    /// Accepted MIME types and extensions
    #[must_use]
    pub fn supported_formats(self) -> &'static [&'static str] {
        match self {
            Self::Image => &[
                "image/jpeg",
                "image/png",
                "image/webp",
                "image/gif",
                ".jpg",
                ".jpeg",
                ".png",
                ".webp",
                ".gif",
            ],
            Self::Video => &["video/*", ".mp4", ".webm", ".mov", ".avi", ".mkv"],
            Self::Pdf => &["application/pdf", ".pdf"],
            Self::General => &[],
        }
    }
}

/// One reason a file was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// No file given
    #[error("no file provided")]
    Missing,

    /// Zero-byte file where content is required
    #[error("file is empty")]
    Empty,

    /// File above the size ceiling
    #[error("file is too large ({}), maximum is {}", format_size(*.size), format_size(*.max))]
    TooLarge {
        /// Size of the file.
        size: u64,
        /// Allowed maximum.
        max: u64,
    },

    /// Neither MIME type nor extension is accepted
    #[error("unsupported file format '{found}', expected one of: {expected}")]
    UnsupportedFormat {
        /// MIME type or extension of the file.
        found: String,
        /// Accepted formats, comma-separated.
        expected: String,
    },
}

/// Options for [`validate`]
#[derive(Clone)]
pub struct ValidationOptions {
    /// Largest accepted size in bytes, inclusive
    pub max_file_size: u64,
    /// Accepted MIME types (`type/*` wildcards allowed) and extensions;
    /// empty accepts everything
    pub supported_formats: Vec<String>,
    /// Accept zero-byte files
    pub allow_empty: bool,
    /// Replaces every built-in check when set
    pub custom: Option<CustomValidator>,
}

impl fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("max_file_size", &self.max_file_size)
            .field("supported_formats", &self.supported_formats)
            .field("allow_empty", &self.allow_empty)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::for_kind(FileKind::General)
    }
}

impl ValidationOptions {
    /// Preset for a kind of input
    #[must_use]
    pub fn for_kind(kind: FileKind) -> Self {
        Self {
            max_file_size: kind.default_max_size(),
            supported_formats: kind.supported_formats().iter().map(ToString::to_string).collect(),
            allow_empty: false,
            custom: None,
        }
    }

    /// Images up to 50 MB
    #[must_use]
    pub fn images() -> Self {
        Self::for_kind(FileKind::Image)
    }

    /// Videos up to 100 MB
    #[must_use]
    pub fn video() -> Self {
        Self::for_kind(FileKind::Video)
    }

    /// PDFs up to 100 MB
    #[must_use]
    pub fn pdf() -> Self {
        Self::for_kind(FileKind::Pdf)
    }

    /// Sets the size ceiling
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Replaces the accepted formats
    #[must_use]
    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Accepts zero-byte files
    #[must_use]
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// Installs a custom validator
    #[must_use]
    pub fn with_custom<F>(mut self, validator: F) -> Self
    where
        F: Fn(Option<&FileDescriptor>) -> ValidationResult + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(validator));
        self
    }
}

/// Verdict on one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True when the file may be processed
    pub is_valid: bool,
    /// Every violation, joined with `"; "`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal findings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Echo of the validated file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileDescriptor>,
    /// Individual violations behind `error`
    #[serde(skip)]
    pub violations: Vec<ValidationError>,
}

impl ValidationResult {
    /// Accepting result
    #[must_use]
    pub fn valid(file_info: Option<FileDescriptor>) -> Self {
        Self {
            is_valid: true,
            error: None,
            warnings: Vec::new(),
            file_info,
            violations: Vec::new(),
        }
    }

    /// Result built from collected violations and warnings
    #[must_use]
    pub fn from_findings(
        violations: Vec<ValidationError>,
        warnings: Vec<String>,
        file_info: Option<FileDescriptor>,
    ) -> Self {
        let error = (!violations.is_empty()).then(|| {
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        });
        Self {
            is_valid: violations.is_empty(),
            error,
            warnings,
            file_info,
            violations,
        }
    }
}

/// Checks a file against `options`.
///
/// Every check runs, so the result reports all violations at once. A size
/// equal to the ceiling is accepted.
#[must_use]
pub fn validate(file: Option<&FileDescriptor>, options: &ValidationOptions) -> ValidationResult {
    if let Some(custom) = &options.custom {
        return custom(file);
    }
    let Some(file) = file else {
        return ValidationResult::from_findings(vec![ValidationError::Missing], Vec::new(), None);
    };

    let mut violations = Vec::new();
    let mut warnings = Vec::new();

    if file.size == 0 && !options.allow_empty {
        violations.push(ValidationError::Empty);
    }
    if file.size > options.max_file_size {
        violations.push(ValidationError::TooLarge {
            size: file.size,
            max: options.max_file_size,
        });
    } else if file.size > LARGE_FILE_WARNING {
        warnings.push(format!(
            "large file ({}), processing may be slow",
            format_size(file.size)
        ));
    }

    let extension = file.extension();
    // Browsers report an empty type for unknown files.
    let mime = file
        .mime_type
        .as_deref()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_ascii_lowercase);

    if !options.supported_formats.is_empty()
        && !options
            .supported_formats
            .iter()
            .any(|format| format_matches(format, mime.as_deref(), extension.as_deref()))
    {
        let found = mime
            .clone()
            .or_else(|| extension.as_ref().map(|ext| format!(".{ext}")))
            .unwrap_or_else(|| "unknown".to_string());
        violations.push(ValidationError::UnsupportedFormat {
            found,
            expected: options.supported_formats.join(", "),
        });
    }

    if let (Some(mime), Some(ext)) = (&mime, &extension) {
        let guesses = mime_guess::from_ext(ext);
        if guesses.first().is_some() && !guesses.iter().any(|g| g.essence_str() == mime.as_str()) {
            warnings.push(format!(
                "file extension '.{ext}' does not match its type '{mime}'"
            ));
        }
    }

    ValidationResult::from_findings(violations, warnings, Some(file.clone()))
}

fn format_matches(format: &str, mime: Option<&str>, extension: Option<&str>) -> bool {
    let format = format.trim().to_ascii_lowercase();
    if let Some((kind, subtype)) = format.split_once('/') {
        let Some(mime) = mime else {
            return false;
        };
        return match subtype {
            "*" => mime.split_once('/').is_some_and(|(k, _)| k == kind),
            _ => mime == format,
        };
    }
    extension.is_some_and(|ext| ext == format.trim_start_matches('.'))
}

/// Human-readable byte count, e.g. `2.5 MB`
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn jpeg(size: u64) -> FileDescriptor {
        FileDescriptor::new("photo.jpg", size).with_mime_type("image/jpeg")
    }

    #[test]
    fn test_missing_file() {
        let result = validate(None, &ValidationOptions::default());
        assert!(!result.is_valid);
        assert_eq!(result.error.as_deref(), Some("no file provided"));
        assert_eq!(result.file_info, None);
    }

    #[test]
    fn test_valid_image() {
        let file = jpeg(2 * MB);
        let result = validate(Some(&file), &ValidationOptions::images());
        assert!(result.is_valid, "{result:?}");
        assert!(result.warnings.is_empty());
        assert_eq!(result.file_info, Some(file));
    }

    #[test]
    fn test_size_boundary() {
        let options = ValidationOptions::default().with_max_file_size(1000);
        assert!(validate(Some(&FileDescriptor::new("a.bin", 1000)), &options).is_valid);
        let result = validate(Some(&FileDescriptor::new("a.bin", 1001)), &options);
        assert!(!result.is_valid);
        assert_eq!(
            result.violations,
            vec![ValidationError::TooLarge {
                size: 1001,
                max: 1000
            }]
        );
    }

    #[test]
    fn test_empty_file() {
        let file = FileDescriptor::new("blank.txt", 0);
        assert!(!validate(Some(&file), &ValidationOptions::default()).is_valid);
        assert!(validate(Some(&file), &ValidationOptions::default().allow_empty(true)).is_valid);
    }

    #[test]
    fn test_large_file_warns() {
        let file = FileDescriptor::new("movie.mp4", 60 * MB).with_mime_type("video/mp4");
        let result = validate(Some(&file), &ValidationOptions::video());
        assert!(result.is_valid);
        assert_eq!(result.warnings, vec!["large file (60.0 MB), processing may be slow"]);
    }

    #[test]
    fn test_all_violations_reported() {
        let file = FileDescriptor::new("notes.txt", 60 * MB).with_mime_type("text/plain");
        let result = validate(Some(&file), &ValidationOptions::images());
        assert_eq!(result.violations.len(), 2);
        insta::assert_snapshot!(
            result.error.unwrap(),
            @"file is too large (60.0 MB), maximum is 50.0 MB; unsupported file format 'text/plain', expected one of: image/jpeg, image/png, image/webp, image/gif, .jpg, .jpeg, .png, .webp, .gif"
        );
    }

    #[rstest]
    #[case("video/*", Some("video/webm"), None, true)]
    #[case("video/*", Some("audio/webm"), None, false)]
    #[case("image/png", Some("IMAGE/PNG"), None, true)]
    #[case(".PNG", None, Some("png"), true)]
    #[case("png", None, Some("png"), true)]
    #[case(".png", None, Some("jpg"), false)]
    #[case("image/png", None, Some("png"), false)]
    fn test_format_matching(
        #[case] format: &str,
        #[case] mime: Option<&str>,
        #[case] ext: Option<&str>,
        #[case] expected: bool,
    ) {
        let mime = mime.map(str::to_ascii_lowercase);
        assert_eq!(format_matches(format, mime.as_deref(), ext), expected);
    }

    #[test]
    fn test_extension_alone_is_enough() {
        let file = FileDescriptor::new("scan.PDF", 10);
        assert!(validate(Some(&file), &ValidationOptions::pdf()).is_valid);
    }

    #[test]
    fn test_blank_mime_type_is_ignored() {
        let photo = FileDescriptor::new("photo.png", 1024).with_mime_type("");
        let result = validate(Some(&photo), &ValidationOptions::images());
        assert!(result.is_valid, "{result:?}");
        assert!(result.warnings.is_empty());

        let tool = FileDescriptor::new("tool.exe", 1024).with_mime_type("  ");
        let result = validate(Some(&tool), &ValidationOptions::images());
        assert!(!result.is_valid);
        assert!(matches!(
            &result.violations[..],
            [ValidationError::UnsupportedFormat { found, .. }] if found == ".exe"
        ));
    }

    #[test]
    fn test_mismatch_is_a_warning() {
        let file = FileDescriptor::new("photo.png", 10).with_mime_type("image/jpeg");
        let result = validate(Some(&file), &ValidationOptions::images());
        assert!(result.is_valid);
        assert_eq!(
            result.warnings,
            vec!["file extension '.png' does not match its type 'image/jpeg'"]
        );
    }

    #[test]
    fn test_custom_validator_replaces_checks() {
        let options = ValidationOptions::images()
            .with_custom(|file| ValidationResult::valid(file.cloned()));
        let huge = FileDescriptor::new("x.exe", u64::MAX);
        assert!(validate(Some(&huge), &options).is_valid);
        assert!(validate(None, &options).is_valid);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(50 * MB), "50.0 MB");
    }

    proptest! {
        #[test]
        fn validate_is_idempotent(size in 0u64..200 * MB, name in "[a-z]{1,8}\\.(jpg|png|pdf|mp4|txt)") {
            let file = FileDescriptor::new(name, size);
            let options = ValidationOptions::images();
            prop_assert_eq!(validate(Some(&file), &options), validate(Some(&file), &options));
        }

        #[test]
        fn size_ceiling_is_inclusive(max in 1u64..10_000, delta in 0u64..100) {
            let options = ValidationOptions::default().with_max_file_size(max);
            let at = FileDescriptor::new("f.bin", max);
            let over = FileDescriptor::new("f.bin", max + 1 + delta);
            prop_assert!(validate(Some(&at), &options).is_valid);
            prop_assert!(!validate(Some(&over), &options).is_valid);
        }
    }
}
