use crate::error::{IngestError, Result};
use crate::formats::normalize_mime;
use std::fs;
use std::path::{Path, PathBuf};

/// Validate input file path for security and accessibility.
///
/// Returns the canonical path on success.
pub fn validate_input_path(path: &Path, max_bytes: u64) -> Result<PathBuf> {
    if !path.exists() {
        return Err(IngestError::FileNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(IngestError::UnsupportedFormat(
            "Input path is not a file".to_string(),
        ));
    }

    // Security: Validate path to prevent directory traversal attacks
    let canonical_path = path
        .canonicalize()
        .map_err(|_| IngestError::FileNotFound(path.to_path_buf()))?;

    // Check file size before loading to prevent DoS attacks
    let metadata = fs::metadata(&canonical_path)?;
    validate_byte_size(metadata.len(), max_bytes)?;

    Ok(canonical_path)
}

pub fn validate_byte_size(len: u64, max_bytes: u64) -> Result<()> {
    if len > max_bytes {
        return Err(IngestError::FileTooLarge(len, max_bytes));
    }
    Ok(())
}

/// Checks a sniffed MIME type against the accepted list.
pub fn validate_mime_type(mime: &str, accepted: &[String]) -> Result<()> {
    let mime = normalize_mime(mime);
    if accepted.iter().any(|a| normalize_mime(a) == mime) {
        Ok(())
    } else {
        Err(IngestError::UnsupportedFormat(mime))
    }
}
