//! File descriptors handed to the validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// What the validator knows about a user-supplied file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name including extension
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Declared MIME type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Last modification time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileDescriptor {
    /// Creates a descriptor without MIME type or timestamp
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: None,
            last_modified: None,
        }
    }

    /// Sets the declared MIME type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the modification time
    #[must_use]
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// Describes a file on disk, guessing its MIME type from the extension.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file's metadata cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type: mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str().to_string()),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Lowercase extension without the dot
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extension() {
        assert_eq!(FileDescriptor::new("Photo.JPG", 1).extension().as_deref(), Some("jpg"));
        assert_eq!(FileDescriptor::new("archive.tar.gz", 1).extension().as_deref(), Some("gz"));
        assert_eq!(FileDescriptor::new("README", 1).extension(), None);
        assert_eq!(FileDescriptor::new(".hidden", 1).extension(), None);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; 42])
            .unwrap();

        let file = FileDescriptor::from_path(&path).unwrap();
        assert_eq!(file.name, "clip.mp4");
        assert_eq!(file.size, 42);
        assert_eq!(file.mime_type.as_deref(), Some("video/mp4"));
        assert!(file.last_modified.is_some());
    }

    #[test]
    fn test_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileDescriptor::from_path(dir.path().join("nope.png")).is_err());
    }
}
