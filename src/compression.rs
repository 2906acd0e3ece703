use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use oxipng::{Deflaters, Options};
use std::io::Cursor;
use std::num::NonZeroU8;
use thiserror::Error;

use crate::asset::{Dimensions, ImageAsset};
use crate::constants::{
    DEFAULT_QUALITY, LIBDEFLATER_HIGH_LEVEL, LIBDEFLATER_LOW_LEVEL, MAX_QUALITY_PERCENT,
    MIN_QUALITY_PERCENT, OXIPNG_PRESET, ZOPFLI_ITERATIONS,
};
use crate::error::{IngestError, Result};
use crate::formats::{is_animated, OutputFormat};
use crate::utils::calculate_compression_ratio;

/// Re-encode quality as a fraction in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quality(f32);

impl Quality {
    pub fn new(value: f32) -> Result<Self> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(IngestError::InvalidQuality(value))
        }
    }

    /// Builds a quality from the CLI's 1..=100 scale.
    pub fn from_percent(percent: u8) -> Result<Self> {
        if !(MIN_QUALITY_PERCENT..=MAX_QUALITY_PERCENT).contains(&percent) {
            return Err(IngestError::InvalidQualityPercent(percent));
        }
        Ok(Self(percent as f32 / 100.0))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Encoder quality on the 1..=100 scale.
    pub fn percent(&self) -> u8 {
        ((self.0 * 100.0).round() as u8).clamp(MIN_QUALITY_PERCENT, MAX_QUALITY_PERCENT)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(DEFAULT_QUALITY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Skip re-encoding entirely.
    pub preserve_original: bool,
    /// Discard an encode that came out larger than its input.
    pub keep_smaller: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: Quality::default(),
            preserve_original: false,
            keep_smaller: true,
        }
    }
}

impl CompressionConfig {
    pub fn new(quality_percent: u8, format: OutputFormat, preserve_original: bool) -> Result<Self> {
        Ok(Self {
            format,
            quality: Quality::from_percent(quality_percent)?,
            preserve_original,
            keep_smaller: true,
        })
    }

    pub fn passthrough() -> Self {
        Self {
            preserve_original: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode input: {0}")]
    Decode(String),

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error("PNG optimization failed: {0}")]
    PngOptimization(String),

    #[error("Codec task failed: {0}")]
    Task(String),
}

/// Decode/encode capability behind the compression stage.
#[async_trait]
pub trait ImageCodec: Send + Sync {
    async fn reencode(
        &self,
        asset: &ImageAsset,
        format: OutputFormat,
        quality: Quality,
    ) -> std::result::Result<ImageAsset, CodecError>;
}

/// `image` for JPEG and WebP, `oxipng` for PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodecBackend;

/// oxipng deflater for a quality: the higher the quality, the harder it
/// works on the same lossless output.
pub fn png_deflater(quality: Quality) -> Deflaters {
    let percent = quality.percent();
    if percent >= 90 {
        NonZeroU8::new(ZOPFLI_ITERATIONS).map_or(
            Deflaters::Libdeflater {
                compression: LIBDEFLATER_HIGH_LEVEL,
            },
            |iterations| Deflaters::Zopfli { iterations },
        )
    } else if percent >= 70 {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_HIGH_LEVEL,
        }
    } else {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_LOW_LEVEL,
        }
    }
}

fn encode_blocking(
    bytes: &[u8],
    format: OutputFormat,
    quality: Quality,
) -> std::result::Result<(Vec<u8>, Dimensions), CodecError> {
    let img = image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    let (width, height) = img.dimensions();

    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.percent());
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
        OutputFormat::WebP => {
            // lossless encoder: quality does not apply
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buffer), format.to_image_format())
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
        OutputFormat::Png => {
            let mut raw = Vec::new();
            img.write_to(&mut Cursor::new(&mut raw), format.to_image_format())
                .map_err(|e| CodecError::Encode(e.to_string()))?;

            let mut options = Options::from_preset(OXIPNG_PRESET);
            options.force = true;
            options.deflate = png_deflater(quality);
            buffer = oxipng::optimize_from_memory(&raw, &options)
                .map_err(|e| CodecError::PngOptimization(e.to_string()))?;
        }
    }

    Ok((buffer, Dimensions::new(width, height)))
}

#[async_trait]
impl ImageCodec for ImageCodecBackend {
    async fn reencode(
        &self,
        asset: &ImageAsset,
        format: OutputFormat,
        quality: Quality,
    ) -> std::result::Result<ImageAsset, CodecError> {
        let bytes = asset.bytes().clone();
        let (buffer, dimensions) =
            tokio::task::spawn_blocking(move || encode_blocking(&bytes, format, quality))
                .await
                .map_err(|e| CodecError::Task(e.to_string()))??;
        Ok(ImageAsset::new(buffer, format.mime_type(), dimensions))
    }
}

/// Lossy re-encode stage. Never fails: on any problem the input comes back
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct CompressionEngine<C = ImageCodecBackend> {
    codec: C,
}

impl<C: ImageCodec> CompressionEngine<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub async fn compress(&self, asset: &ImageAsset, config: &CompressionConfig) -> ImageAsset {
        if config.preserve_original {
            tracing::debug!("preserve_original set, skipping re-encode");
            return asset.clone();
        }
        if is_animated(asset.mime(), asset.bytes()) {
            tracing::debug!(mime = asset.mime(), "animated source, skipping re-encode");
            return asset.clone();
        }

        let encoded = match self
            .codec
            .reencode(asset, config.format, config.quality)
            .await
        {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "compression failed, keeping original");
                return asset.clone();
            }
        };

        if config.keep_smaller && encoded.byte_len() > asset.byte_len() {
            tracing::warn!(
                original = asset.byte_len(),
                encoded = encoded.byte_len(),
                "re-encode grew the asset, keeping original"
            );
            return asset.clone();
        }

        tracing::debug!(
            original = asset.byte_len(),
            encoded = encoded.byte_len(),
            ratio = calculate_compression_ratio(asset.byte_len(), encoded.byte_len()),
            format = %config.format,
            quality = config.quality.percent(),
            "compressed"
        );
        encoded
    }
}
