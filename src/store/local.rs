use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{chunk_count, ChunkProgress, ObjectStore, StoreError, StoreLimits};
use crate::asset::AssetId;
use crate::constants::{DEFAULT_CHUNK_SIZE, PARTIAL_UPLOAD_EXTENSION};
use crate::formats::extension_for_mime;

// ENOSPC / EDQUOT
const NO_SPACE_OS_ERRORS: &[i32] = &[28, 122];

fn map_io(e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return StoreError::PermissionDenied(e.to_string());
    }
    match e.raw_os_error() {
        Some(code) if NO_SPACE_OS_ERRORS.contains(&code) => StoreError::QuotaExceeded(e.to_string()),
        _ => StoreError::Io(e),
    }
}

/// Removes a half-written object unless the write completed.
struct PartialFileGuard {
    path: PathBuf,
    armed: bool,
}

impl PartialFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Stores objects as `<id>.<ext>` files in one directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    chunk_size: u64,
    limits: StoreLimits,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            limits: StoreLimits::default(),
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

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a completed object, if one exists.
    pub fn object_path(&self, id: &AssetId) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.root).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| is_object_file(path, id.as_str()))
    }

    async fn find_object(&self, id: &AssetId) -> Result<Option<PathBuf>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(map_io(e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(map_io)? {
            let path = entry.path();
            if is_object_file(&path, id.as_str()) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    async fn used_bytes(&self) -> Result<u64, StoreError> {
        let mut used = 0;
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(map_io(e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(map_io)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_UPLOAD_EXTENSION) {
                continue;
            }
            used += entry.metadata().await.map_err(map_io)?.len();
        }
        Ok(used)
    }
}

fn is_object_file(path: &Path, id: &str) -> bool {
    path.file_stem().and_then(|s| s.to_str()) == Some(id)
        && path.extension().and_then(|e| e.to_str()) != Some(PARTIAL_UPLOAD_EXTENSION)
}

/// Object ids become file names, so they must not be able to leave the
/// store directory.
fn validate_object_id(id: &AssetId) -> Result<(), StoreError> {
    let valid = !id.as_str().is_empty()
        && id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Other(format!("invalid object id: {}", id)))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn create_object(
        &self,
        id: &AssetId,
        bytes: Bytes,
        mime: &str,
        on_progress: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<AssetId, StoreError> {
        validate_object_id(id)?;
        let len = bytes.len() as u64;
        let used = if self.limits.quota_bytes.is_some() {
            self.used_bytes().await?
        } else {
            0
        };
        self.limits.check(len, mime, used)?;

        tokio::fs::create_dir_all(&self.root).await.map_err(map_io)?;

        let partial = self
            .root
            .join(format!("{}.{}", id, PARTIAL_UPLOAD_EXTENSION));
        let mut guard = PartialFileGuard::new(partial.clone());
        let mut file = tokio::fs::File::create(&partial).await.map_err(map_io)?;

        let chunks_total = chunk_count(len, self.chunk_size);
        let mut progress = ChunkProgress {
            chunks_transferred: 0,
            chunks_total,
            bytes_transferred: 0,
            bytes_total: len,
        };
        on_progress(progress);

        for (index, chunk) in bytes.chunks(self.chunk_size as usize).enumerate() {
            file.write_all(chunk).await.map_err(map_io)?;
            progress.chunks_transferred = index as u64 + 1;
            progress.bytes_transferred += chunk.len() as u64;
            on_progress(progress);
        }
        if bytes.is_empty() {
            progress.chunks_transferred = 1;
            on_progress(progress);
        }
        file.sync_all().await.map_err(map_io)?;
        drop(file);

        let target = self
            .root
            .join(format!("{}.{}", id, extension_for_mime(mime)));
        tokio::fs::rename(&partial, &target).await.map_err(map_io)?;
        guard.disarm();

        tracing::debug!(path = %target.display(), bytes = len, "object written");
        Ok(id.clone())
    }

    async fn delete_object(&self, id: &AssetId) -> Result<(), StoreError> {
        validate_object_id(id)?;
        let path = self
            .find_object(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        tokio::fs::remove_file(&path).await.map_err(map_io)
    }

    fn object_url(&self, id: &AssetId) -> Option<String> {
        self.object_path(id)
            .map(|path| format!("file://{}", path.display()))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_map_io_classification() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(map_io(denied).kind(), ErrorKind::PermissionDenied);
        assert_eq!(map_io(io::Error::from_raw_os_error(28)).kind(), ErrorKind::QuotaExceeded);
        assert_eq!(
            map_io(io::Error::new(io::ErrorKind::Other, "odd")).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_rejects_path_like_ids() {
        assert!(validate_object_id(&AssetId::new("../etc/passwd")).is_err());
        assert!(validate_object_id(&AssetId::new("")).is_err());
        assert!(validate_object_id(&AssetId::generate()).is_ok());
    }

    #[tokio::test]
    async fn test_guard_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.partial");
        std::fs::write(&path, b"half").unwrap();
        {
            let _guard = PartialFileGuard::new(path.clone());
        }
        assert!(!path.exists());

        std::fs::write(&path, b"whole").unwrap();
        {
            let mut guard = PartialFileGuard::new(path.clone());
            guard.disarm();
        }
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_find_object_skips_partial_uploads() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("objects"));
        let id = AssetId::generate();
        assert!(store.find_object(&id).await.unwrap().is_none());

        std::fs::create_dir_all(store.root()).unwrap();
        std::fs::write(store.root().join(format!("{}.partial", id)), b"half").unwrap();
        assert!(store.find_object(&id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_object(&id).await,
            Err(StoreError::NotFound(_))
        ));

        let done = store.root().join(format!("{}.png", id));
        std::fs::write(&done, b"whole").unwrap();
        assert_eq!(store.find_object(&id).await.unwrap(), Some(done.clone()));
        store.delete_object(&id).await.unwrap();
        assert!(!done.exists());
        assert!(store.root().join(format!("{}.partial", id)).exists());
    }
}
