use anyhow::{bail, Context};
use clap::Parser;
use futures::StreamExt;
use indicatif::ProgressBar;
use rayon::ThreadPoolBuilder;
use std::path::Path;

use img_ingest::cli::{Args, Commands, StoreArgs};
use img_ingest::config::{IngestConfig, StoreSection};
use img_ingest::crop::{AspectRatio, FixedRegion};
use img_ingest::utils::{create_upload_progress_bar, format_file_size, is_image_file};
use img_ingest::{
    describe_image, logger, report, report_error, AssetId, CompressionConfig, OutputFormat,
    Pipeline, PipelineEvent, PipelineOptions, PipelineResult, Quality, SelectedFile, Stage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    let config = match &args.config {
        Some(path) => IngestConfig::load(path)
            .await
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => IngestConfig::default(),
    };

    match args.command {
        Commands::Ingest {
            input,
            aspect,
            crop,
            no_crop,
            skip_crop_threshold,
            quality,
            format,
            preserve_original,
            pixel_ratio,
            retry,
            threads,
            store,
        } => {
            setup_thread_pool(threads);

            let mut options = config.pipeline_options()?;
            if let Some(aspect) = aspect {
                options = options.with_aspect(aspect.parse::<AspectRatio>()?);
            }
            if let Some(threshold) = skip_crop_threshold {
                options.skip_crop_threshold = threshold;
            }
            if no_crop {
                options = options.without_crop();
            }
            if let Some(percent) = quality {
                options.compression.quality = Quality::from_percent(percent)?;
            }
            if let Some(format) = format {
                options.compression.format = format.parse::<OutputFormat>()?;
            }
            if preserve_original {
                options.compression.preserve_original = true;
            }
            if let Some(ratio) = pixel_ratio {
                options.pixel_ratio = ratio;
            }
            if retry {
                options.retry_network_failure = true;
            }

            let crop = crop.map(|c| c.parse::<FixedRegion>()).transpose()?;
            run_pipeline(&input, &config.store, &store, options, crop).await?;
        }
        Commands::Upload { input, store } => {
            let options = config
                .pipeline_options()?
                .without_crop()
                .with_compression(CompressionConfig::passthrough());
            run_pipeline(&input, &config.store, &store, options, None).await?;
        }
        Commands::Info { input, aspect } => {
            let options = config.pipeline_options()?;
            let aspect = match aspect {
                Some(aspect) => aspect.parse::<AspectRatio>()?,
                None => options.aspect,
            };
            describe_image(
                &input,
                aspect,
                options.skip_crop_threshold,
                options.max_file_bytes,
            )
            .await?
            .print();
        }
    }

    Ok(())
}

fn setup_thread_pool(threads: Option<usize>) {
    if let Some(num_threads) = threads {
        ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to set thread pool size: {}", e);
            });
    }
}

/// Command-line store flags win over the `[store]` section.
fn merge_store_args(section: &StoreSection, args: &StoreArgs) -> StoreSection {
    let mut merged = section.clone();
    if let Some(kind) = args.store {
        merged.kind = kind;
    }
    if let Some(dir) = &args.dir {
        merged.dir = Some(dir.clone());
    }
    if let Some(url) = &args.aggregator_url {
        merged.aggregator_url = Some(url.clone());
    }
    if let Some(url) = &args.publisher_url {
        merged.publisher_url = Some(url.clone());
    }
    if let Some(epochs) = args.epochs {
        merged.epochs = Some(epochs);
    }
    merged.temp |= args.temp;
    merged
}

async fn run_pipeline(
    input: &Path,
    store_section: &StoreSection,
    store_args: &StoreArgs,
    options: PipelineOptions,
    crop: Option<FixedRegion>,
) -> anyhow::Result<()> {
    let section = merge_store_args(store_section, store_args);
    let store = section.build()?;

    if !is_image_file(input) {
        tracing::warn!("{:?} has no image extension; the type is taken from its contents", input);
    }
    report!("📥 Ingesting image: {:?}", input);
    report!("🗄️  Store: {}", store.name());

    let file = SelectedFile::open(input, options.max_file_bytes).await?;
    report!("📊 Original size: {}", format_file_size(file.byte_len()));

    let mut pipeline = Pipeline::with_store(store);
    if let Some(region) = crop {
        pipeline.set_crop_driver(region);
    }
    if let Some(previous) = &store_args.replace {
        pipeline = pipeline.with_previous_asset(AssetId::new(previous.clone()));
    }

    let mut progress: Option<ProgressBar> = None;
    let mut result = None;
    {
        let events = pipeline.run(file, &options);
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                PipelineEvent::Stage { stage, progress: fraction } => match (stage, fraction) {
                    (Stage::Selected, _) => report!("✅ Image accepted"),
                    (Stage::Cropping, _) => report!("✂️  Cropping..."),
                    (Stage::Compressing, _) => report!("🗜️  Compressing..."),
                    (Stage::Uploading, None) => {
                        progress = Some(if logger::is_quiet() {
                            ProgressBar::hidden()
                        } else {
                            create_upload_progress_bar("📤 Uploading")
                        });
                    }
                    (Stage::Uploading, Some(fraction)) => {
                        if let Some(bar) = &progress {
                            bar.set_position((fraction * 100.0).round() as u64);
                        }
                    }
                },
                PipelineEvent::Finished(finished) => result = Some(finished),
            }
        }
    }

    match result {
        Some(PipelineResult::Done(id)) => {
            if let Some(bar) = &progress {
                bar.finish_with_message("✅ Upload complete");
            }
            if logger::is_quiet() {
                println!("{}", id);
            }
            report!("🆔 Asset ID: {}", id);
            if let Some(url) = pipeline.uploads().object_url(&id) {
                report!("🌐 Access URL: {}", url);
            }
            if section.temp {
                report!("⏰ Temporary blob: Will expire after 1 epoch (~24 hours)");
            }
            Ok(())
        }
        Some(PipelineResult::Failed { kind, detail }) => {
            if let Some(bar) = &progress {
                bar.abandon();
            }
            report_error!("{}", kind.user_message());
            bail!("{}: {}", kind, detail)
        }
        None => bail!("pipeline ended without a result"),
    }
}
