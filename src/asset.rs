use bytes::Bytes;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::validation::validate_input_path;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An encoded image together with what is known about it.
///
/// Assets are immutable: every pipeline stage produces a new one. Cloning
/// shares the underlying byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Bytes,
    mime: String,
    dimensions: Dimensions,
}

impl ImageAsset {
    pub fn new(bytes: impl Into<Bytes>, mime: impl Into<String>, dimensions: Dimensions) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
            dimensions,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }
}

/// Identifier of a stored asset.
///
/// Identifiers generated on the client are UUID v4 in simple (32 hex char)
/// form; stores that address content themselves may hand back their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

impl AssetId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AssetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The file a user picked, before anything is known about its contents.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: Option<String>,
    pub bytes: Bytes,
    pub declared_mime: Option<String>,
}

impl SelectedFile {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            name: None,
            bytes: bytes.into(),
            declared_mime: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = Some(mime.into());
        self
    }

    /// Reads a file from disk after checking it exists, is a regular file and
    /// is no larger than `max_bytes`.
    pub async fn open(path: &Path, max_bytes: u64) -> Result<Self> {
        let canonical = validate_input_path(path, max_bytes)?;
        let bytes = tokio::fs::read(&canonical).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Ok(Self {
            name,
            bytes: Bytes::from(bytes),
            declared_mime: None,
        })
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}
