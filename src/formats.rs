/// Image format utilities and type-safe format handling
///
/// Output formats for the re-encode stage, MIME mapping for sniffed inputs,
/// and animation detection for the formats that must never be rasterized.

use crate::error::{IngestError, Result};
use image::ImageFormat;
use std::fmt;
use std::str::FromStr;

/// Supported re-encode targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JPEG format with lossy compression
    #[default]
    Jpeg,
    /// PNG format with lossless compression, optimized by oxipng
    Png,
    /// WebP format (the `image` encoder is lossless)
    WebP,
}

impl OutputFormat {
    /// Returns the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Convert to the image crate's ImageFormat
    pub fn to_image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::WebP => ImageFormat::WebP,
        }
    }

    /// Get format names for CLI help text
    pub fn format_names() -> Vec<&'static str> {
        vec!["jpeg", "png", "webp"]
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WebP",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            "heic" | "heif" | "jxl" | "jpegxl" => Err(IngestError::UnsupportedFormat(format!(
                "{} format is not yet supported in this version. Use JPEG or WebP",
                s
            ))),
            _ => Err(IngestError::UnsupportedFormat(format!(
                "{} (expected one of: {})",
                s,
                OutputFormat::format_names().join(", ")
            ))),
        }
    }
}

/// MIME type for a sniffed input format.
pub fn mime_for_image_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Avif => "image/avif",
        ImageFormat::Ico => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// File extension used when a store names an object after its MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/avif" => "avif",
        _ => "bin",
    }
}

/// Normalizes MIME aliases browsers still send (`image/jpg`).
pub fn normalize_mime(mime: &str) -> String {
    match mime.trim().to_lowercase().as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        other => other.to_string(),
    }
}

/// Whether the bytes hold more than one frame.
///
/// GIF is treated as animated unconditionally. WebP is animated when its
/// VP8X header sets the animation flag, PNG when an `acTL` chunk precedes
/// the first `IDAT`.
pub fn is_animated(mime: &str, bytes: &[u8]) -> bool {
    match mime {
        "image/gif" => true,
        "image/webp" => webp_is_animated(bytes),
        "image/png" | "image/apng" => png_is_animated(bytes),
        _ => false,
    }
}

fn webp_is_animated(bytes: &[u8]) -> bool {
    const ANIMATION_FLAG: u8 = 0x02;
    bytes.len() > 20
        && &bytes[0..4] == b"RIFF"
        && &bytes[8..12] == b"WEBP"
        && &bytes[12..16] == b"VP8X"
        && bytes[20] & ANIMATION_FLAG != 0
}

fn png_is_animated(bytes: &[u8]) -> bool {
    const SIGNATURE_LEN: usize = 8;
    let mut offset = SIGNATURE_LEN;
    while offset + 8 <= bytes.len() {
        let len = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        match &bytes[offset + 4..offset + 8] {
            b"acTL" => return true,
            b"IDAT" => return false,
            _ => {}
        }
        // length + type + data + crc
        offset = match offset.checked_add(12 + len) {
            Some(next) => next,
            None => return false,
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("jpeg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("jpg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("PNG").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_str("webp").unwrap(), OutputFormat::WebP);

        assert!(OutputFormat::from_str("unsupported").is_err());
    }

    #[test]
    fn test_heic_gets_helpful_error() {
        let result = OutputFormat::from_str("heic");
        if let Err(IngestError::UnsupportedFormat(msg)) = result {
            assert!(msg.contains("not yet supported"));
        } else {
            panic!("expected UnsupportedFormat");
        }
    }

    #[test]
    fn test_output_format_extension_and_mime() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(OutputFormat::WebP.mime_type(), "image/webp");
        assert_eq!(OutputFormat::default(), OutputFormat::Jpeg);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(format!("{}", OutputFormat::Jpeg), "JPEG");
        assert_eq!(format!("{}", OutputFormat::Png), "PNG");
        assert_eq!(format!("{}", OutputFormat::WebP), "WebP");
    }

    #[test]
    fn test_mime_helpers() {
        assert_eq!(mime_for_image_format(ImageFormat::Gif), "image/gif");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("text/plain"), "bin");
        assert_eq!(normalize_mime(" IMAGE/JPG "), "image/jpeg");
    }

    #[test]
    fn test_gif_is_always_animated() {
        assert!(is_animated("image/gif", b"GIF89a"));
        assert!(!is_animated("image/jpeg", b"\xFF\xD8\xFF"));
    }

    #[test]
    fn test_webp_animation_flag() {
        let mut header = Vec::new();
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&[0, 0, 0, 0]);
        header.extend_from_slice(b"WEBP");
        header.extend_from_slice(b"VP8X");
        header.extend_from_slice(&[10, 0, 0, 0]);
        header.push(0x02);
        header.extend_from_slice(&[0; 9]);
        assert!(is_animated("image/webp", &header));

        header[20] = 0x00;
        assert!(!is_animated("image/webp", &header));
    }

    #[test]
    fn test_png_animation_chunk() {
        fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
            let mut out = (data.len() as u32).to_be_bytes().to_vec();
            out.extend_from_slice(kind);
            out.extend_from_slice(data);
            out.extend_from_slice(&[0, 0, 0, 0]);
            out
        }
        let signature = b"\x89PNG\r\n\x1a\n".to_vec();

        let mut still = signature.clone();
        still.extend(chunk(b"IHDR", &[0; 13]));
        still.extend(chunk(b"IDAT", &[0; 4]));
        assert!(!is_animated("image/png", &still));

        let mut animated = signature;
        animated.extend(chunk(b"IHDR", &[0; 13]));
        animated.extend(chunk(b"acTL", &[0; 8]));
        animated.extend(chunk(b"IDAT", &[0; 4]));
        assert!(is_animated("image/png", &animated));
    }
}
