pub mod asset;
pub mod cli;
pub mod compression;
pub mod config;
pub mod constants;
pub mod crop;
pub mod error;
pub mod formats;
pub mod info;
pub mod logger;
pub mod pipeline;
pub mod raster;
pub mod store;
pub mod upload;
pub mod utils;
pub mod validation;

pub use asset::{AssetId, Dimensions, ImageAsset, SelectedFile};
pub use compression::{
    CodecError, CompressionConfig, CompressionEngine, ImageCodec, ImageCodecBackend, Quality,
};
pub use config::{IngestConfig, StoreKind};
pub use crop::{
    select_default_region, update_region, AcceptDefault, AspectRatio, CancelCrop, CropDelta,
    CropDriver, CropEngine, CropOutcome, CropRegion, CropSession, FixedRegion, ScriptedDrag,
};
pub use error::{ErrorKind, IngestError, Result};
pub use formats::OutputFormat;
pub use info::{describe_image, ImageReport};
pub use pipeline::{
    Pipeline, PipelineEvent, PipelineOptions, PipelineResult, PipelineState, Stage,
};
pub use raster::{display_to_native, DisplayRect, ImageRaster, PixelRect, RasterError, RasterSurface};
pub use store::{
    ChunkProgress, InjectedFailure, LocalStore, MemoryStore, ObjectStore, StoreError, StoreLimits,
    StoreOp, WalrusOptions, WalrusStore,
};
pub use upload::{UploadError, UploadManager, UploadState, UploadTask};
