use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::compression::CodecError;
use crate::raster::RasterError;
use crate::store::StoreError;
use crate::upload::UploadError;

/// Failure categories surfaced to callers of the pipeline.
///
/// Every internal error collapses to exactly one of these, and each one maps
/// to a single user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DecodeError,
    SizeLimitExceeded,
    UnsupportedType,
    NetworkFailure,
    PermissionDenied,
    QuotaExceeded,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::DecodeError => "The image could not be read. It may be corrupt.",
            ErrorKind::SizeLimitExceeded => "File too large.",
            ErrorKind::UnsupportedType => "Unsupported format.",
            ErrorKind::NetworkFailure => "Network error - check your connection and try again.",
            ErrorKind::PermissionDenied => "Permission denied.",
            ErrorKind::QuotaExceeded => "Storage quota exceeded.",
            ErrorKind::Cancelled => "Upload cancelled.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// Transient failures are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::NetworkFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DecodeError => "DecodeError",
            ErrorKind::SizeLimitExceeded => "SizeLimitExceeded",
            ErrorKind::UnsupportedType => "UnsupportedType",
            ErrorKind::NetworkFailure => "NetworkFailure",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Unknown => "Unknown",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid quality value: {0}. Must be in (0, 1]")]
    InvalidQuality(f32),

    #[error("Invalid quality percentage: {0}. Must be between 1 and 100")]
    InvalidQualityPercent(u8),

    #[error("Invalid aspect ratio: {0}")]
    InvalidAspectRatio(String),

    #[error("Invalid crop region: {0}")]
    InvalidCropRegion(String),

    #[error("Invalid pixel ratio: {0}")]
    InvalidPixelRatio(f64),

    #[error("File too large: {0} bytes. Maximum allowed: {1} bytes")]
    FileTooLarge(u64, u64),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Missing store setting: {0}")]
    MissingStoreSetting(&'static str),

    #[error("Crop session cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Raster(e) => e.kind(),
            IngestError::Codec(_) | IngestError::ImageProcessing(_) => ErrorKind::DecodeError,
            IngestError::Store(e) => e.kind(),
            IngestError::Upload(e) => e.kind(),
            IngestError::FileTooLarge(..) => ErrorKind::SizeLimitExceeded,
            IngestError::UnsupportedFormat(_) => ErrorKind::UnsupportedType,
            IngestError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            IngestError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
