use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::StoreKind;

#[derive(Parser)]
#[command(
    name = "img-ingest",
    about = "Crop, compress and upload images to object storage",
    long_about = "img-ingest runs the image ingestion pipeline: an aspect-locked crop, \
                  a lossy re-encode with fallback to the original, and a chunked, \
                  progress-tracked upload to a local directory or Walrus decentralized storage.",
    version = "0.1.0",
    after_help = "EXAMPLES:\n  \
    img-ingest ingest photo.jpg --aspect 4:3 -q 80\n  \
    img-ingest ingest photo.jpg --crop 0,0,100,100 --store walrus -t\n  \
    img-ingest ingest new.jpg --replace 3f2a0c9e8b7d4e1f9a6b5c4d3e2f1a0b\n  \
    img-ingest upload image.png --dir ./uploads\n  \
    img-ingest info photo.png"
)]
pub struct Args {
    #[arg(long, global = true, help = "Only print errors and the resulting asset id")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Log pipeline stages and store operations")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        help = "TOML configuration file",
        long_help = "TOML file with [pipeline], [compression] and [store] sections. \
                     Command-line flags override values from the file."
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct StoreArgs {
    #[arg(long, value_enum, help = "Storage backend (local, walrus, memory)")]
    pub store: Option<StoreKind>,

    #[arg(long, help = "Directory for the local store (default: ./uploads)")]
    pub dir: Option<PathBuf>,

    #[arg(
        short = 'a',
        long,
        help = "Custom Walrus aggregator URL",
        long_help = "Override default aggregator URL. \
                     Default: https://aggregator.walrus-testnet.walrus.space"
    )]
    pub aggregator_url: Option<String>,

    #[arg(
        short = 'p',
        long,
        help = "Custom Walrus publisher URL",
        long_help = "Override default publisher URL. \
                     Default: https://publisher.walrus-testnet.walrus.space"
    )]
    pub publisher_url: Option<String>,

    #[arg(
        short = 'e',
        long,
        help = "Walrus storage duration in epochs (default: 10)",
        long_help = "Number of epochs to store the blob. Each epoch is approximately 24 hours."
    )]
    pub epochs: Option<u64>,

    #[arg(
        short = 't',
        long,
        help = "Store on Walrus as a temporary blob (1 epoch ≈ 24 hours)",
        long_help = "Upload with temporary storage (1 epoch). Overrides --epochs."
    )]
    pub temp: bool,

    #[arg(
        long,
        value_name = "ASSET_ID",
        help = "Asset this upload replaces; deleted once the new one is stored"
    )]
    pub replace: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Crop, compress and upload an image",
        long_about = "Run the full pipeline on one image. Files above the skip-crop threshold \
                      and animated images go straight to compression."
    )]
    Ingest {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(long, help = "Aspect lock for the crop, e.g. 4:3, 16/9 or 1.5 (default: 4:3)")]
        aspect: Option<String>,

        #[arg(
            long,
            value_name = "X,Y,W,H",
            conflicts_with = "no_crop",
            help = "Crop region in percent of the source",
            long_help = "Crop region as x,y,width,height in percent of the source. \
                         The largest region with the locked aspect that fits inside it is used. \
                         Without this flag the centered default region (90% width) is used."
        )]
        crop: Option<String>,

        #[arg(long, help = "Skip the crop stage")]
        no_crop: bool,

        #[arg(
            long,
            help = "Skip-crop threshold in bytes (default: 8 MiB)",
            long_help = "Files larger than this many bytes are not cropped."
        )]
        skip_crop_threshold: Option<u64>,

        #[arg(
            short = 'q',
            long,
            help = "Compression quality (1-100, default: 80)",
            long_help = "Compression quality from 1 (lowest) to 100 (highest). \
                         For PNG: >=90 uses Zopfli, >=70 uses high compression, <70 uses standard compression."
        )]
        quality: Option<u8>,

        #[arg(
            short = 'f',
            long,
            help = "Output format (jpeg, png, webp; webp is lossless)",
            long_help = "Format of the re-encoded image. Supported formats: jpeg/jpg, png, webp. \
                         WebP is encoded losslessly and ignores --quality; with lossy sources \
                         it is usually larger than the input, so the original is kept."
        )]
        format: Option<String>,

        #[arg(long, help = "Upload the (cropped) image without re-encoding")]
        preserve_original: bool,

        #[arg(long, help = "Device pixel ratio for the cropped output (default: 1.0)")]
        pixel_ratio: Option<f64>,

        #[arg(long, help = "Retry once, under the same id, after a network failure")]
        retry: bool,

        #[arg(
            short = 'j',
            long,
            help = "Number of parallel threads (default: auto)",
            long_help = "Number of threads the image codecs may use. \
                         If not specified, uses number of CPU cores."
        )]
        threads: Option<usize>,

        #[command(flatten)]
        store: StoreArgs,
    },

    #[command(
        about = "Upload an image as-is",
        long_about = "Upload the file bytes without cropping or re-encoding. \
                      The file is still checked for size and type."
    )]
    Upload {
        #[arg(help = "Image file path to upload")]
        input: PathBuf,

        #[command(flatten)]
        store: StoreArgs,
    },

    #[command(
        about = "Display image information and the default crop",
        long_about = "Show dimensions, type and size of an image, the default crop region \
                      for an aspect lock, and whether the crop stage would be skipped."
    )]
    Info {
        #[arg(help = "Image file path to analyze")]
        input: PathBuf,

        #[arg(long, help = "Aspect lock for the crop preview (default: 4:3)")]
        aspect: Option<String>,
    },
}
