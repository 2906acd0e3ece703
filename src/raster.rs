//! Raster surface: decode source bytes and extract sub-rectangles.
//!
//! [`RasterSurface`] is the capability the crop stage renders through. The
//! production backend, [`ImageRaster`], is pure Rust on the `image` crate;
//! tests and other environments can plug in their own.
//!
//! All coordinates here are native source pixels. Display-space selections
//! are mapped back with [`display_to_native`], which scales by
//! `native / displayed` so an export never loses resolution relative to
//! what was visually selected.

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

use crate::asset::{Dimensions, ImageAsset};
use crate::constants::MAX_IMAGE_DIMENSION;
use crate::error::ErrorKind;
use crate::formats::{is_animated, mime_for_image_format};

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Invalid image dimensions: {0}x{1}. Maximum allowed: {2}x{2}")]
    InvalidDimensions(u32, u32, u32),

    #[error("Region {0:?} does not intersect the source")]
    EmptyRegion(PixelRect),

    #[error("Failed to encode extracted region: {0}")]
    Encode(String),

    #[error("Raster task failed: {0}")]
    Task(String),
}

impl RasterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RasterError::Decode(_) | RasterError::InvalidDimensions(..) => ErrorKind::DecodeError,
            RasterError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            _ => ErrorKind::Unknown,
        }
    }
}

/// A rectangle in native source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(source: Dimensions) -> Self {
        Self::new(0, 0, source.width, source.height)
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Clamps the rectangle to the source bounds. `None` if nothing is left.
    pub fn clamp_to(&self, source: Dimensions) -> Option<PixelRect> {
        if self.x >= source.width || self.y >= source.height {
            return None;
        }
        let width = self.width.min(source.width - self.x);
        let height = self.height.min(source.height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(PixelRect::new(self.x, self.y, width, height))
    }
}

/// A selection measured on the displayed (possibly downscaled) image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Maps a display-space selection to native source pixels.
pub fn display_to_native(rect: DisplayRect, displayed: Dimensions, native: Dimensions) -> PixelRect {
    let scale_x = native.width as f64 / displayed.width.max(1) as f64;
    let scale_y = native.height as f64 / displayed.height.max(1) as f64;

    // the start must land on a real pixel
    let x = (rect.x * scale_x)
        .round()
        .clamp(0.0, native.width.saturating_sub(1) as f64) as u32;
    let y = (rect.y * scale_y)
        .round()
        .clamp(0.0, native.height.saturating_sub(1) as f64) as u32;
    let width = (rect.width * scale_x)
        .round()
        .clamp(1.0, native.width.saturating_sub(x).max(1) as f64) as u32;
    let height = (rect.height * scale_y)
        .round()
        .clamp(1.0, native.height.saturating_sub(y).max(1) as f64) as u32;

    PixelRect::new(x, y, width, height)
}

/// Output size for a native region rendered at the device pixel ratio.
pub fn scaled_output_size(region: PixelRect, pixel_ratio: f64) -> Dimensions {
    let scale = |v: u32| ((v as f64 * pixel_ratio).round() as u32).max(1);
    Dimensions::new(scale(region.width), scale(region.height))
}

/// Rejects render targets past the decode cap.
pub fn check_output_size(output: Dimensions) -> Result<(), RasterError> {
    if output.width > MAX_IMAGE_DIMENSION || output.height > MAX_IMAGE_DIMENSION {
        return Err(RasterError::InvalidDimensions(
            output.width,
            output.height,
            MAX_IMAGE_DIMENSION,
        ));
    }
    Ok(())
}

/// What a header probe learns without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub mime: String,
    pub dimensions: Dimensions,
    pub animated: bool,
}

/// Capability for decoding and extracting regions from a raster image.
#[async_trait]
pub trait RasterSurface: Send + Sync {
    /// Backend-specific handle for a decoded source.
    type Source: Send + Sync;

    /// Reads format and dimensions from the header only.
    async fn probe(&self, bytes: &Bytes) -> Result<ImageInfo, RasterError>;

    /// Fully decodes the source.
    async fn load(&self, bytes: &Bytes) -> Result<Self::Source, RasterError>;

    fn source_dimensions(&self, source: &Self::Source) -> Dimensions;

    /// Renders `region` (clamped to the source) into a new asset of `output`
    /// size. Allocates one off-screen buffer per call.
    async fn extract(
        &self,
        source: &Self::Source,
        region: PixelRect,
        output: Dimensions,
    ) -> Result<ImageAsset, RasterError>;
}

/// Decoded source held by [`ImageRaster`].
#[derive(Debug, Clone)]
pub struct LoadedImage {
    image: Arc<DynamicImage>,
}

/// Pure Rust raster backend using the `image` crate.
///
/// Extracted regions are encoded as lossless PNG, so cropping never stacks
/// a second lossy generation in front of the compression stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageRaster;

impl ImageRaster {
    pub fn new() -> Self {
        Self
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, RasterError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RasterError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RasterError::Task(e.to_string()))?
}

fn probe_blocking(bytes: &[u8]) -> Result<ImageInfo, RasterError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RasterError::Decode(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| RasterError::UnsupportedType("unrecognized image data".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| RasterError::Decode(e.to_string()))?;

    let mime = mime_for_image_format(format).to_string();
    let animated = is_animated(&mime, bytes);
    Ok(ImageInfo {
        mime,
        dimensions: Dimensions::new(width, height),
        animated,
    })
}

fn decode_blocking(bytes: &[u8]) -> Result<DynamicImage, RasterError> {
    let img = image::load_from_memory(bytes).map_err(|e| match e {
        image::ImageError::Unsupported(u) => RasterError::UnsupportedType(u.to_string()),
        other => RasterError::Decode(other.to_string()),
    })?;

    // Security: Validate image dimensions to prevent memory exhaustion
    let (width, height) = img.dimensions();
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(RasterError::InvalidDimensions(
            width,
            height,
            MAX_IMAGE_DIMENSION,
        ));
    }
    Ok(img)
}

fn extract_blocking(
    image: &DynamicImage,
    region: PixelRect,
    output: Dimensions,
) -> Result<ImageAsset, RasterError> {
    let mut cropped = image.crop_imm(region.x, region.y, region.width, region.height);
    if cropped.dimensions() != (output.width, output.height) {
        cropped = cropped.resize_exact(output.width, output.height, FilterType::Lanczos3);
    }

    let mut buffer = Vec::new();
    cropped
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| RasterError::Encode(e.to_string()))?;

    Ok(ImageAsset::new(buffer, "image/png", output))
}

#[async_trait]
impl RasterSurface for ImageRaster {
    type Source = LoadedImage;

    async fn probe(&self, bytes: &Bytes) -> Result<ImageInfo, RasterError> {
        let bytes = bytes.clone();
        run_blocking(move || probe_blocking(&bytes)).await
    }

    async fn load(&self, bytes: &Bytes) -> Result<LoadedImage, RasterError> {
        let bytes = bytes.clone();
        let image = run_blocking(move || decode_blocking(&bytes)).await?;
        Ok(LoadedImage {
            image: Arc::new(image),
        })
    }

    fn source_dimensions(&self, source: &LoadedImage) -> Dimensions {
        let (width, height) = source.image.dimensions();
        Dimensions::new(width, height)
    }

    async fn extract(
        &self,
        source: &LoadedImage,
        region: PixelRect,
        output: Dimensions,
    ) -> Result<ImageAsset, RasterError> {
        check_output_size(output)?;
        let region = region
            .clamp_to(self.source_dimensions(source))
            .ok_or(RasterError::EmptyRegion(region))?;
        let image = Arc::clone(&source.image);
        run_blocking(move || extract_blocking(&image, region, output)).await
    }
}
