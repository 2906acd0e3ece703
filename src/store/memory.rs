use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{chunk_count, ChunkProgress, ObjectStore, StoreError, StoreLimits};
use crate::asset::AssetId;
use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::error::ErrorKind;

/// A completed store operation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Create(AssetId),
    Delete(AssetId),
}

/// A failure the next `create_object` call will hit once `after_chunks`
/// chunks have gone through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedFailure {
    pub kind: ErrorKind,
    pub after_chunks: u64,
}

#[derive(Debug)]
struct StoredObject {
    bytes: Bytes,
    mime: String,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<AssetId, StoredObject>,
    ops: Vec<StoreOp>,
    failures: VecDeque<InjectedFailure>,
}

impl State {
    fn used_bytes(&self) -> u64 {
        self.objects.values().map(|o| o.bytes.len() as u64).sum()
    }
}

/// In-process store. Objects only become visible once every chunk went
/// through, so an aborted transfer leaves nothing behind.
#[derive(Debug)]
pub struct MemoryStore {
    chunk_size: u64,
    limits: StoreLimits,
    state: Mutex<State>,
    create_attempts: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            limits: StoreLimits::default(),
            state: Mutex::new(State::default()),
            create_attempts: AtomicU64::new(0),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.limits.quota_bytes = Some(quota_bytes);
        self
    }

    /// Queues a failure for a future `create_object` call. Failures are
    /// consumed one per call, in order.
    pub fn fail_next(&self, failure: InjectedFailure) {
        self.lock().failures.push_back(failure);
    }

    pub fn get(&self, id: &AssetId) -> Option<Bytes> {
        self.lock().objects.get(id).map(|o| o.bytes.clone())
    }

    pub fn mime_of(&self, id: &AssetId) -> Option<String> {
        self.lock().objects.get(id).map(|o| o.mime.clone())
    }

    pub fn contains(&self, id: &AssetId) -> bool {
        self.lock().objects.contains_key(id)
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn used_bytes(&self) -> u64 {
        self.lock().used_bytes()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.lock().ops.clone()
    }

    /// Every `create_object` call, including the failed ones.
    pub fn create_attempts(&self) -> u64 {
        self.create_attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_object(
        &self,
        id: &AssetId,
        bytes: Bytes,
        mime: &str,
        on_progress: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<AssetId, StoreError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        let len = bytes.len() as u64;

        let failure = {
            let mut state = self.lock();
            self.limits.check(len, mime, state.used_bytes())?;
            state.failures.pop_front()
        };

        let chunks_total = chunk_count(len, self.chunk_size);
        let mut progress = ChunkProgress {
            chunks_transferred: 0,
            chunks_total,
            bytes_transferred: 0,
            bytes_total: len,
        };
        on_progress(progress);

        for chunk in 0..chunks_total {
            if let Some(f) = failure.filter(|f| f.after_chunks == chunk) {
                tracing::debug!(%id, chunk, kind = %f.kind, "injected store failure");
                return Err(StoreError::from_kind(f.kind, "injected failure"));
            }
            tokio::task::yield_now().await;

            progress.chunks_transferred = chunk + 1;
            progress.bytes_transferred = ((chunk + 1) * self.chunk_size).min(len);
            on_progress(progress);
        }
        if let Some(f) = failure.filter(|f| f.after_chunks >= chunks_total) {
            return Err(StoreError::from_kind(f.kind, "injected failure"));
        }

        let mut state = self.lock();
        // Another transfer may have landed while this one was in flight
        self.limits.check(len, mime, state.used_bytes())?;
        state.objects.insert(
            id.clone(),
            StoredObject {
                bytes,
                mime: mime.to_string(),
            },
        );
        state.ops.push(StoreOp::Create(id.clone()));
        Ok(id.clone())
    }

    async fn delete_object(&self, id: &AssetId) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.objects.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        state.ops.push(StoreOp::Delete(id.clone()));
        Ok(())
    }

    fn object_url(&self, id: &AssetId) -> Option<String> {
        Some(format!("memory://{}", id))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
