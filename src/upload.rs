//! Upload stage: one tracked transfer of an asset into an [`ObjectStore`].
//!
//! The target id is assigned on the client before any byte moves, so a
//! retry of the same task lands on the same id. Progress reported to the
//! caller is monotone over the whole task and ends with exactly one `1.0`,
//! sent only after the store confirmed the object.

use thiserror::Error;

use crate::asset::{AssetId, ImageAsset};
use crate::error::ErrorKind;
use crate::store::{ChunkProgress, ObjectStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: AssetId,
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    pub chunks_transferred: u64,
    pub chunks_total: u64,
    pub state: UploadState,
    /// Id the store handed back on success.
    pub stored_id: Option<AssetId>,
    pub attempts: u32,
    last_fraction: f64,
}

impl UploadTask {
    fn new(id: AssetId, total_bytes: u64) -> Self {
        Self {
            id,
            total_bytes,
            bytes_transferred: 0,
            chunks_transferred: 0,
            chunks_total: 0,
            state: UploadState::Pending,
            stored_id: None,
            attempts: 0,
            last_fraction: 0.0,
        }
    }

    /// Highest fraction reported so far.
    pub fn progress(&self) -> f64 {
        self.last_fraction
    }
}

#[derive(Debug, Error)]
#[error("Upload {task_id} failed: {source}")]
pub struct UploadError {
    pub task_id: AssetId,
    #[source]
    pub source: StoreError,
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[derive(Debug, Clone)]
pub struct UploadManager<S> {
    store: S,
}

impl<S: ObjectStore> UploadManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Assigns the target id for `asset`.
    pub fn prepare(&self, asset: &ImageAsset) -> UploadTask {
        UploadTask::new(AssetId::generate(), asset.byte_len())
    }

    /// Runs one attempt of `task`. Can be called again on a failed task to
    /// retry under the same id.
    pub async fn transfer<F>(
        &self,
        task: &mut UploadTask,
        asset: &ImageAsset,
        mut on_progress: F,
    ) -> Result<AssetId, UploadError>
    where
        F: FnMut(f64) + Send,
    {
        let id = task.id.clone();
        task.state = UploadState::InFlight;
        task.attempts += 1;
        tracing::debug!(%id, attempt = task.attempts, bytes = task.total_bytes, "upload started");

        let result = {
            let mut forward = |p: ChunkProgress| {
                task.chunks_transferred = p.chunks_transferred;
                task.chunks_total = p.chunks_total;
                task.bytes_transferred = p.bytes_transferred;

                // 1.0 is held back until the store confirms
                let fraction = p.fraction();
                if fraction > task.last_fraction && fraction < 1.0 {
                    task.last_fraction = fraction;
                    on_progress(fraction);
                }
            };
            self.store
                .create_object(&id, asset.bytes().clone(), asset.mime(), &mut forward)
                .await
        };

        match result {
            Ok(stored) => {
                task.state = UploadState::Succeeded;
                task.stored_id = Some(stored.clone());
                task.last_fraction = 1.0;
                on_progress(1.0);
                tracing::info!(id = %stored, store = self.store.name(), bytes = task.total_bytes, "upload complete");
                Ok(stored)
            }
            Err(source) => {
                task.state = UploadState::Failed;
                tracing::warn!(%id, kind = %source.kind(), error = %source, "upload failed");
                Err(UploadError {
                    task_id: id,
                    source,
                })
            }
        }
    }

    /// Prepares and transfers in one go. No retry.
    pub async fn upload<F>(&self, asset: &ImageAsset, on_progress: F) -> Result<AssetId, UploadError>
    where
        F: FnMut(f64) + Send,
    {
        let mut task = self.prepare(asset);
        self.transfer(&mut task, asset, on_progress).await
    }

    pub async fn delete(&self, id: &AssetId) -> Result<(), StoreError> {
        self.store.delete_object(id).await?;
        tracing::info!(%id, store = self.store.name(), "asset deleted");
        Ok(())
    }

    pub fn object_url(&self, id: &AssetId) -> Option<String> {
        self.store.object_url(id)
    }
}
