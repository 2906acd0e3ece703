//! Ingestion pipeline: select, crop (or skip), compress, upload.
//!
//! A [`Pipeline`] turns one [`SelectedFile`] into a stored asset and reports
//! what it is doing as a finite stream of [`PipelineEvent`]s that always
//! ends in exactly one [`PipelineEvent::Finished`]. Stages run strictly in
//! order. Dropping the stream cancels the run; before the upload stage that
//! has no side effects at all.

use futures::Stream;
use tokio::sync::mpsc;

use crate::asset::{AssetId, ImageAsset, SelectedFile};
use crate::compression::{CompressionConfig, CompressionEngine, ImageCodec, ImageCodecBackend};
use crate::constants::{
    DEFAULT_ACCEPTED_TYPES, DEFAULT_PIXEL_RATIO, DEFAULT_SKIP_CROP_THRESHOLD, MAX_FILE_SIZE,
};
use crate::crop::{AcceptDefault, AspectRatio, CropDriver, CropEngine, CropOutcome, CropSession};
use crate::error::{ErrorKind, IngestError};
use crate::raster::{ImageInfo, ImageRaster, RasterSurface};
use crate::store::ObjectStore;
use crate::upload::{UploadError, UploadManager};
use crate::validation::{validate_byte_size, validate_mime_type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Selected,
    CroppingDecision,
    Cropping,
    Compressing,
    Uploading,
    Done,
    Failed,
}

impl PipelineState {
    pub fn allowed_transitions(&self) -> Vec<PipelineState> {
        use PipelineState::*;
        match self {
            Idle => vec![Selected, Failed],
            Selected => vec![CroppingDecision, Failed],
            CroppingDecision => vec![Cropping, Compressing],
            Cropping => vec![Compressing, Failed],
            Compressing => vec![Uploading],
            Uploading => vec![Done, Failed],
            Done => vec![],
            Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, to: PipelineState) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Stages a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Selected,
    Cropping,
    Compressing,
    Uploading,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    Done(AssetId),
    Failed { kind: ErrorKind, detail: String },
}

impl PipelineResult {
    fn failed(err: &IngestError) -> Self {
        PipelineResult::Failed {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }

    pub fn asset_id(&self) -> Option<&AssetId> {
        match self {
            PipelineResult::Done(id) => Some(id),
            PipelineResult::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineResult::Done(_) => None,
            PipelineResult::Failed { kind, .. } => Some(*kind),
        }
    }

    /// Message safe to show to a user. Never carries internal detail.
    pub fn user_message(&self) -> Option<&'static str> {
        self.error_kind().map(|kind| kind.user_message())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Stage { stage: Stage, progress: Option<f64> },
    Finished(PipelineResult),
}

impl PipelineEvent {
    fn stage(stage: Stage) -> Self {
        PipelineEvent::Stage {
            stage,
            progress: None,
        }
    }

    fn uploading(progress: f64) -> Self {
        PipelineEvent::Stage {
            stage: Stage::Uploading,
            progress: Some(progress),
        }
    }
}

/// Per-run options. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub aspect: AspectRatio,
    /// Sources larger than this many bytes skip the crop stage.
    pub skip_crop_threshold: u64,
    pub compression: CompressionConfig,
    pub pixel_ratio: f64,
    pub max_file_bytes: u64,
    pub accepted_types: Vec<String>,
    /// Retry a transfer once, under the same id, after a network failure.
    pub retry_network_failure: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            aspect: AspectRatio::default(),
            skip_crop_threshold: DEFAULT_SKIP_CROP_THRESHOLD,
            compression: CompressionConfig::default(),
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            max_file_bytes: MAX_FILE_SIZE,
            accepted_types: DEFAULT_ACCEPTED_TYPES.iter().map(|t| t.to_string()).collect(),
            retry_network_failure: false,
        }
    }
}

impl PipelineOptions {
    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn with_skip_crop_threshold(mut self, threshold: u64) -> Self {
        self.skip_crop_threshold = threshold;
        self
    }

    /// Every non-empty source skips the crop stage.
    pub fn without_crop(self) -> Self {
        self.with_skip_crop_threshold(0)
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn accept_type(mut self, mime: impl Into<String>) -> Self {
        self.accepted_types.push(mime.into());
        self
    }

    pub fn with_network_retry(mut self, retry: bool) -> Self {
        self.retry_network_failure = retry;
        self
    }

    /// Whether a selected source goes through the crop stage.
    pub fn should_crop(&self, asset: &ImageAsset, info: &ImageInfo) -> bool {
        // rasterizing an animation would keep only its first frame
        !info.animated && asset.byte_len() <= self.skip_crop_threshold
    }
}

fn advance(state: &mut PipelineState, to: PipelineState) {
    debug_assert!(
        state.can_transition_to(to),
        "illegal pipeline transition {:?} -> {:?}",
        state,
        to
    );
    tracing::debug!(from = ?state, to = ?to, "pipeline transition");
    *state = to;
}

enum UploadStep {
    Progress(f64),
    Finished(Result<AssetId, UploadError>),
}

/// Runs ingestion for one content item at a time.
pub struct Pipeline<R = ImageRaster, C = ImageCodecBackend, S = Box<dyn ObjectStore>> {
    raster: R,
    compression: CompressionEngine<C>,
    uploads: UploadManager<S>,
    driver: Box<dyn CropDriver>,
    previous: Option<AssetId>,
}

impl<S: ObjectStore> Pipeline<ImageRaster, ImageCodecBackend, S> {
    /// Pipeline on the built-in raster and codec backends.
    pub fn with_store(store: S) -> Self {
        Self::new(ImageRaster::new(), ImageCodecBackend, store)
    }
}

impl<R, C, S> Pipeline<R, C, S>
where
    R: RasterSurface,
    C: ImageCodec,
    S: ObjectStore,
{
    pub fn new(raster: R, codec: C, store: S) -> Self {
        Self {
            raster,
            compression: CompressionEngine::new(codec),
            uploads: UploadManager::new(store),
            driver: Box::new(AcceptDefault),
            previous: None,
        }
    }

    pub fn with_crop_driver(mut self, driver: impl CropDriver + 'static) -> Self {
        self.driver = Box::new(driver);
        self
    }

    pub fn set_crop_driver(&mut self, driver: impl CropDriver + 'static) {
        self.driver = Box::new(driver);
    }

    /// Seeds the asset a successful run replaces.
    pub fn with_previous_asset(mut self, id: AssetId) -> Self {
        self.previous = Some(id);
        self
    }

    pub fn previous_asset(&self) -> Option<&AssetId> {
        self.previous.as_ref()
    }

    pub fn uploads(&self) -> &UploadManager<S> {
        &self.uploads
    }

    /// Runs the pipeline over `file`.
    ///
    /// The stream yields stage events, upload progress in `(0, 1]`, and
    /// finally one `Finished`. On success the previously held asset, if
    /// any, is deleted from the store.
    pub fn run(
        &mut self,
        file: SelectedFile,
        options: &PipelineOptions,
    ) -> impl Stream<Item = PipelineEvent> + Send + '_ {
        let options = options.clone();

        async_stream::stream! {
            let mut state = PipelineState::Idle;

            let (original, info) = match self.select(&file, &options).await {
                Ok(selected) => selected,
                Err(e) => {
                    advance(&mut state, PipelineState::Failed);
                    yield PipelineEvent::Finished(PipelineResult::failed(&e));
                    return;
                }
            };
            advance(&mut state, PipelineState::Selected);
            yield PipelineEvent::stage(Stage::Selected);

            advance(&mut state, PipelineState::CroppingDecision);
            let cropped = if options.should_crop(&original, &info) {
                advance(&mut state, PipelineState::Cropping);
                yield PipelineEvent::stage(Stage::Cropping);
                match self.crop(&original, &options).await {
                    Ok(asset) => asset,
                    Err(e) => {
                        advance(&mut state, PipelineState::Failed);
                        yield PipelineEvent::Finished(PipelineResult::failed(&e));
                        return;
                    }
                }
            } else {
                tracing::debug!(
                    bytes = original.byte_len(),
                    animated = info.animated,
                    "skipping crop"
                );
                original.clone()
            };

            advance(&mut state, PipelineState::Compressing);
            yield PipelineEvent::stage(Stage::Compressing);
            let compressed = self.compression.compress(&cropped, &options.compression).await;
            drop(cropped);

            advance(&mut state, PipelineState::Uploading);
            yield PipelineEvent::stage(Stage::Uploading);

            let (tx, mut rx) = mpsc::unbounded_channel::<f64>();
            let mut task = self.uploads.prepare(&compressed);
            let mut retries_left = u32::from(options.retry_network_failure);
            let outcome = loop {
                let attempt = {
                    let tx = tx.clone();
                    let transfer = self.uploads.transfer(&mut task, &compressed, move |fraction| {
                        let _ = tx.send(fraction);
                    });
                    tokio::pin!(transfer);

                    loop {
                        let step = tokio::select! {
                            biased;
                            Some(fraction) = rx.recv() => UploadStep::Progress(fraction),
                            result = &mut transfer => UploadStep::Finished(result),
                        };
                        match step {
                            UploadStep::Progress(fraction) => {
                                yield PipelineEvent::uploading(fraction);
                            }
                            UploadStep::Finished(result) => break result,
                        }
                    }
                };
                while let Ok(fraction) = rx.try_recv() {
                    yield PipelineEvent::uploading(fraction);
                }

                match attempt {
                    Err(e) if e.kind().is_transient() && retries_left > 0 => {
                        retries_left -= 1;
                        tracing::warn!(id = %e.task_id, error = %e, "retrying upload");
                    }
                    other => break other,
                }
            };

            match outcome {
                Ok(id) => {
                    self.replace_previous(&id).await;
                    advance(&mut state, PipelineState::Done);
                    yield PipelineEvent::Finished(PipelineResult::Done(id));
                }
                Err(e) => {
                    advance(&mut state, PipelineState::Failed);
                    yield PipelineEvent::Finished(PipelineResult::failed(&IngestError::from(e)));
                }
            }
        }
    }

    /// Size cap, header probe, then the MIME allow-list.
    async fn select(
        &self,
        file: &SelectedFile,
        options: &PipelineOptions,
    ) -> Result<(ImageAsset, ImageInfo), IngestError> {
        validate_byte_size(file.byte_len(), options.max_file_bytes)?;
        let info = self.raster.probe(&file.bytes).await?;
        validate_mime_type(&info.mime, &options.accepted_types)?;

        if let Some(declared) = file.declared_mime.as_deref() {
            if declared != info.mime {
                tracing::debug!(declared, sniffed = %info.mime, "declared type differs from content");
            }
        }
        let asset = ImageAsset::new(file.bytes.clone(), info.mime.clone(), info.dimensions);
        Ok((asset, info))
    }

    async fn crop(
        &mut self,
        asset: &ImageAsset,
        options: &PipelineOptions,
    ) -> Result<ImageAsset, IngestError> {
        let engine = CropEngine::new(options.pixel_ratio)?;
        let source = self.raster.load(asset.bytes()).await?;
        let session = CropSession::new(self.raster.source_dimensions(&source), options.aspect);

        match self.driver.select(session).await {
            CropOutcome::Commit(region) => Ok(engine.commit(&self.raster, &source, &region).await?),
            CropOutcome::Cancel => {
                tracing::debug!("crop cancelled");
                Err(IngestError::Cancelled)
            }
        }
    }

    async fn replace_previous(&mut self, new_id: &AssetId) {
        let Some(previous) = self.previous.replace(new_id.clone()) else {
            return;
        };
        if previous == *new_id {
            return;
        }
        if let Err(e) = self.uploads.delete(&previous).await {
            tracing::warn!(id = %previous, error = %e, "failed to delete replaced asset");
        }
    }
}
