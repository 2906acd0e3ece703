/// Default re-encode quality, as a fraction in (0, 1].
pub const DEFAULT_QUALITY: f32 = 0.8;
pub const MIN_QUALITY_PERCENT: u8 = 1;
pub const MAX_QUALITY_PERCENT: u8 = 100;

// Default crop aspect lock (4:3).
pub const DEFAULT_ASPECT_WIDTH: u32 = 4;
pub const DEFAULT_ASPECT_HEIGHT: u32 = 3;

/// Width of the initial crop region, in percent of the source width.
pub const DEFAULT_CROP_COVERAGE_PERCENT: f64 = 90.0;
/// Smallest crop side a drag can produce, in percent.
pub const MIN_CROP_PERCENT: f64 = 1.0;

pub const DEFAULT_PIXEL_RATIO: f64 = 1.0;
pub const MAX_PIXEL_RATIO: f64 = 4.0;

/// Originals larger than this skip the crop stage.
pub const DEFAULT_SKIP_CROP_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Maximum file size in bytes (100MB)
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 16_384;

pub const DEFAULT_ACCEPTED_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "avif"];

/// Transfer chunk size used by the chunked stores (5MB).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_LOCAL_STORE_DIR: &str = "uploads";
pub const PARTIAL_UPLOAD_EXTENSION: &str = "partial";

pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;
pub const OXIPNG_PRESET: u8 = 4;

pub const DEFAULT_EPOCHS: u64 = 10;
pub const TEMP_EPOCHS: u64 = 1;
pub const DEFAULT_WALRUS_AGGREGATOR: &str = "https://aggregator.walrus-testnet.walrus.space";
pub const DEFAULT_WALRUS_PUBLISHER: &str = "https://publisher.walrus-testnet.walrus.space";
pub const WALRUS_BLOB_PATH: &str = "/v1/blobs/";

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent:>3}%";
