#![allow(dead_code)]

use futures::{Stream, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use img_ingest::{PipelineEvent, PipelineResult, Stage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Smooth gradient; compresses well in every format.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

/// High-entropy pixels; PNG barely shrinks them.
pub fn noise(width: u32, height: u32) -> DynamicImage {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(2_654_435_761).wrapping_add(y.wrapping_mul(40_503)) >> 8;
        Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
    buffer
}

pub fn jpeg_bytes(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let mut buffer = Vec::new();
    gradient(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .unwrap();
    buffer
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Png)
}

pub fn noisy_png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&noise(width, height), ImageFormat::Png)
}

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Bmp)
}

pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgba8(gradient(width, height).to_rgba8()), ImageFormat::Gif)
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub async fn collect_events(stream: impl Stream<Item = PipelineEvent>) -> Vec<PipelineEvent> {
    stream.collect().await
}

pub fn stages(events: &[PipelineEvent]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Stage {
                stage,
                progress: None,
            } => Some(*stage),
            _ => None,
        })
        .collect()
}

pub fn upload_progress(events: &[PipelineEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Stage {
                stage: Stage::Uploading,
                progress: Some(p),
            } => Some(*p),
            _ => None,
        })
        .collect()
}

/// The single terminal result; panics unless it is exactly one and last.
pub fn finished(events: &[PipelineEvent]) -> PipelineResult {
    let terminal: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Finished(_)))
        .collect();
    assert_eq!(terminal.len(), 1, "expected exactly one Finished event");
    match events.last() {
        Some(PipelineEvent::Finished(result)) => result.clone(),
        other => panic!("last event is not Finished: {:?}", other),
    }
}
