//! Output file naming and writing.

use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::worker::Artifact;

/// Builds `{prefix}-{base}-{timestamp_ms}.{extension}`, where `base` is the
/// original file name without directory and extension.
#[must_use]
pub fn generate_filename(prefix: &str, original: &str, extension: &str, timestamp_ms: i64) -> String {
    let name = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let base = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    let base = if base.is_empty() { "file" } else { base };
    let extension = extension.trim_start_matches('.');
    format!("{prefix}-{base}-{timestamp_ms}.{extension}")
}

/// [`generate_filename`] stamped with the current time
#[must_use]
pub fn generate_filename_now(prefix: &str, original: &str, extension: &str) -> String {
    generate_filename(prefix, original, extension, Utc::now().timestamp_millis())
}

/// Writes an artifact into `dir` under a generated name.
///
/// # Errors
///
/// Returns the I/O error if the directory cannot be created or the file
/// cannot be written.
pub fn write_artifact(
    dir: &Path,
    prefix: &str,
    original: &str,
    artifact: &Artifact,
) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(generate_filename_now(prefix, original, &artifact.extension));
    std::fs::write(&path, &artifact.bytes)?;
    info!(path = %path.display(), bytes = artifact.size, "wrote output");
    Ok(path)
}
