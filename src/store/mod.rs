//! Object store contract and its backends.
//!
//! A store creates an object under a caller-chosen id, reports chunk
//! progress while it does, and deletes objects on request. Backends may
//! hand back their own id (content-addressed stores do).

mod local;
mod memory;
mod walrus;

pub use local::LocalStore;
pub use memory::{InjectedFailure, MemoryStore, StoreOp};
pub use walrus::{WalrusOptions, WalrusStore};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::asset::AssetId;
use crate::error::ErrorKind;
use crate::formats::normalize_mime;

/// Transport progress for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub chunks_transferred: u64,
    pub chunks_total: u64,
    pub bytes_transferred: u64,
    pub bytes_total: u64,
}

impl ChunkProgress {
    /// `chunks_transferred / chunks_total`, clamped to `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.chunks_total == 0 {
            return 0.0;
        }
        (self.chunks_transferred as f64 / self.chunks_total as f64).clamp(0.0, 1.0)
    }
}

/// Number of chunks needed for `len` bytes. An empty object is one chunk.
pub fn chunk_count(len: u64, chunk_size: u64) -> u64 {
    if len == 0 || chunk_size == 0 {
        return 1;
    }
    len.div_ceil(chunk_size)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Object too large: {size} bytes. Maximum allowed: {limit} bytes")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("Unsupported object type: {0}")]
    UnsupportedType(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            StoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StoreError::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            StoreError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            StoreError::Network(_) => ErrorKind::NetworkFailure,
            StoreError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            _ => ErrorKind::Unknown,
        }
    }

    /// Builds an error of the given kind, used for injected failures.
    pub fn from_kind(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match kind {
            ErrorKind::QuotaExceeded => StoreError::QuotaExceeded(detail),
            ErrorKind::PermissionDenied => StoreError::PermissionDenied(detail),
            ErrorKind::SizeLimitExceeded => StoreError::SizeLimitExceeded { size: 0, limit: 0 },
            ErrorKind::UnsupportedType => StoreError::UnsupportedType(detail),
            ErrorKind::NetworkFailure => StoreError::Network(detail),
            _ => StoreError::Other(detail),
        }
    }

    /// Classifies a transport error message from a remote store.
    ///
    /// Remote clients only give us text, so the HTTP status and the usual
    /// connection failure wording decide the kind.
    pub fn classify_transport_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["413", "payload too large", "too large"]) {
            StoreError::SizeLimitExceeded { size: 0, limit: 0 }
        } else if has(&["401", "403", "unauthorized", "forbidden", "permission"]) {
            StoreError::PermissionDenied(message)
        } else if has(&["507", "insufficient storage", "quota", "insufficient funds"]) {
            StoreError::QuotaExceeded(message)
        } else if has(&["415", "unsupported media type"]) {
            StoreError::UnsupportedType(message)
        } else if has(&[
            "timed out",
            "timeout",
            "connection",
            "dns",
            "network",
            "502",
            "503",
            "504",
        ]) {
            StoreError::Network(message)
        } else {
            StoreError::Other(message)
        }
    }
}

/// Per-store admission limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_object_bytes: Option<u64>,
    pub quota_bytes: Option<u64>,
    /// Empty means every type is allowed.
    pub allowed_types: Vec<String>,
}

impl StoreLimits {
    /// Checks an incoming object against the limits, given the bytes
    /// already held.
    pub fn check(&self, len: u64, mime: &str, used: u64) -> Result<(), StoreError> {
        if !self.allowed_types.is_empty() {
            let mime = normalize_mime(mime);
            if !self.allowed_types.iter().any(|t| normalize_mime(t) == mime) {
                return Err(StoreError::UnsupportedType(mime));
            }
        }
        if let Some(limit) = self.max_object_bytes {
            if len > limit {
                return Err(StoreError::SizeLimitExceeded { size: len, limit });
            }
        }
        if let Some(quota) = self.quota_bytes {
            if used.saturating_add(len) > quota {
                return Err(StoreError::QuotaExceeded(format!(
                    "{} bytes requested, {} of {} bytes in use",
                    len, used, quota
                )));
            }
        }
        Ok(())
    }
}

/// The contract the upload stage needs from remote storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `id`, reporting progress per chunk. Returns the
    /// id the object is addressable by.
    async fn create_object(
        &self,
        id: &AssetId,
        bytes: Bytes,
        mime: &str,
        on_progress: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<AssetId, StoreError>;

    async fn delete_object(&self, id: &AssetId) -> Result<(), StoreError>;

    /// Public URL of a stored object, when the store has one.
    fn object_url(&self, _id: &AssetId) -> Option<String> {
        None
    }

    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    async fn create_object(
        &self,
        id: &AssetId,
        bytes: Bytes,
        mime: &str,
        on_progress: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<AssetId, StoreError> {
        (**self).create_object(id, bytes, mime, on_progress).await
    }

    async fn delete_object(&self, id: &AssetId) -> Result<(), StoreError> {
        (**self).delete_object(id).await
    }

    fn object_url(&self, id: &AssetId) -> Option<String> {
        (**self).object_url(id)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn create_object(
        &self,
        id: &AssetId,
        bytes: Bytes,
        mime: &str,
        on_progress: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<AssetId, StoreError> {
        (**self).create_object(id, bytes, mime, on_progress).await
    }

    async fn delete_object(&self, id: &AssetId) -> Result<(), StoreError> {
        (**self).delete_object(id).await
    }

    fn object_url(&self, id: &AssetId) -> Option<String> {
        (**self).object_url(id)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
