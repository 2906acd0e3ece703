use std::path::{Path, PathBuf};

use crate::asset::{Dimensions, SelectedFile};
use crate::crop::{select_default_region, AspectRatio, CropRegion};
use crate::error::Result;
use crate::raster::{ImageRaster, PixelRect, RasterSurface};
use crate::report;
use crate::utils::format_file_size;

/// What `info` learns about a file without decoding its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReport {
    pub path: PathBuf,
    pub mime: String,
    pub dimensions: Dimensions,
    pub byte_len: u64,
    pub animated: bool,
    pub default_crop: CropRegion,
    pub default_crop_pixels: PixelRect,
    /// Whether the pipeline would skip the crop stage for this file.
    pub skips_crop: bool,
}

pub async fn describe_image(
    input_path: &Path,
    aspect: AspectRatio,
    skip_crop_threshold: u64,
    max_file_bytes: u64,
) -> Result<ImageReport> {
    let file = SelectedFile::open(input_path, max_file_bytes).await?;
    let info = ImageRaster::new().probe(&file.bytes).await?;
    let default_crop = select_default_region(info.dimensions, aspect);

    Ok(ImageReport {
        path: input_path.to_path_buf(),
        mime: info.mime,
        dimensions: info.dimensions,
        byte_len: file.byte_len(),
        animated: info.animated,
        default_crop_pixels: default_crop.to_pixels(info.dimensions),
        default_crop,
        skips_crop: info.animated || file.byte_len() > skip_crop_threshold,
    })
}

/// Decoded RGBA footprint in MB.
fn estimate_memory_usage(dimensions: Dimensions) -> f64 {
    (dimensions.pixel_count() * 4) as f64 / (1024.0 * 1024.0)
}

impl ImageReport {
    pub fn print(&self) {
        report!("📊 Analyzing image: {:?}", self.path);
        report!("📋 Basic Information:");
        report!("  📏 Dimensions: {} pixels", self.dimensions);
        report!(
            "  📦 File size: {} ({} bytes)",
            format_file_size(self.byte_len),
            self.byte_len
        );
        report!("  🎭 Type: {}", self.mime);
        report!("  📐 Aspect ratio: {:.2}:1", self.dimensions.aspect());
        report!(
            "  🔢 Total pixels: {} ({:.2} MB decoded)",
            self.dimensions.pixel_count(),
            estimate_memory_usage(self.dimensions)
        );
        if self.animated {
            report!("  🎞️  Animated: frames are kept, crop and compression are skipped");
        }

        report!("\n✂️  Crop:");
        if self.skips_crop {
            report!("  ⏭️  Crop stage would be skipped");
        } else {
            let px = self.default_crop_pixels;
            report!(
                "  🎯 Default region: {}x{} at ({}, {}) px",
                px.width,
                px.height,
                px.x,
                px.y
            );
            report!(
                "  📐 In percent: x={:.1} y={:.1} w={:.1} h={:.1}",
                self.default_crop.x,
                self.default_crop.y,
                self.default_crop.width,
                self.default_crop.height
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_SKIP_CROP_THRESHOLD, MAX_FILE_SIZE};
    use crate::error::IngestError;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_describe_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        ImageBuffer::from_pixel(400, 300, Rgb([10u8, 20, 30]))
            .save(&path)
            .unwrap();

        let report = describe_image(
            &path,
            AspectRatio::default(),
            DEFAULT_SKIP_CROP_THRESHOLD,
            MAX_FILE_SIZE,
        )
        .await
        .unwrap();
        assert_eq!(report.mime, "image/png");
        assert_eq!(report.dimensions, Dimensions::new(400, 300));
        assert!(!report.skips_crop);
        assert_eq!(report.default_crop_pixels, PixelRect::new(20, 15, 360, 270));

        let tight = describe_image(&path, AspectRatio::default(), 1, MAX_FILE_SIZE)
            .await
            .unwrap();
        assert!(tight.skips_crop);
    }

    #[tokio::test]
    async fn test_describe_honors_configured_size_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        ImageBuffer::from_pixel(64, 48, Rgb([10u8, 20, 30]))
            .save(&path)
            .unwrap();
        let len = std::fs::metadata(&path).unwrap().len();

        let result = describe_image(
            &path,
            AspectRatio::default(),
            DEFAULT_SKIP_CROP_THRESHOLD,
            len - 1,
        )
        .await;
        assert!(matches!(
            result,
            Err(IngestError::FileTooLarge(actual, limit)) if actual == len && limit == len - 1
        ));

        let report = describe_image(&path, AspectRatio::default(), DEFAULT_SKIP_CROP_THRESHOLD, len)
            .await
            .unwrap();
        assert_eq!(report.byte_len, len);
    }

    #[test]
    fn test_estimate_memory_usage() {
        assert_eq!(estimate_memory_usage(Dimensions::new(1024, 256)), 1.0);
    }
}
