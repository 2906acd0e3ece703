use async_trait::async_trait;
use bytes::Bytes;
use walrus_rs::WalrusClient;

use super::{ChunkProgress, ObjectStore, StoreError, StoreLimits};
use crate::asset::AssetId;
use crate::constants::{
    DEFAULT_EPOCHS, DEFAULT_WALRUS_AGGREGATOR, DEFAULT_WALRUS_PUBLISHER, TEMP_EPOCHS,
};
use crate::utils::build_walrus_access_url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalrusOptions {
    pub aggregator_url: String,
    pub publisher_url: String,
    pub epochs: Option<u64>,
}

impl Default for WalrusOptions {
    fn default() -> Self {
        Self {
            aggregator_url: DEFAULT_WALRUS_AGGREGATOR.to_string(),
            publisher_url: DEFAULT_WALRUS_PUBLISHER.to_string(),
            epochs: Some(DEFAULT_EPOCHS),
        }
    }
}

impl WalrusOptions {
    /// Missing URLs fall back to the testnet endpoints. `temp` stores for a
    /// single epoch regardless of `epochs`.
    pub fn new(
        aggregator_url: Option<String>,
        publisher_url: Option<String>,
        epochs: Option<u64>,
        temp: bool,
    ) -> Self {
        Self {
            aggregator_url: aggregator_url
                .unwrap_or_else(|| DEFAULT_WALRUS_AGGREGATOR.to_string()),
            publisher_url: publisher_url
                .unwrap_or_else(|| DEFAULT_WALRUS_PUBLISHER.to_string()),
            epochs: if temp {
                Some(TEMP_EPOCHS)
            } else {
                epochs.or(Some(DEFAULT_EPOCHS))
            },
        }
    }
}

/// Walrus decentralized storage. Blobs are content addressed, so the id
/// handed back is the blob id, not the one the upload was prepared with.
pub struct WalrusStore {
    client: WalrusClient,
    options: WalrusOptions,
    limits: StoreLimits,
}

impl std::fmt::Debug for WalrusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalrusStore")
            .field("options", &self.options)
            .field("limits", &self.limits)
            .finish()
    }
}

impl WalrusStore {
    pub fn new(options: WalrusOptions) -> Result<Self, StoreError> {
        let client = WalrusClient::new(&options.aggregator_url, &options.publisher_url)
            .map_err(|e| StoreError::Other(format!("Failed to create Walrus client: {}", e)))?;
        Ok(Self {
            client,
            options,
            limits: StoreLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn options(&self) -> &WalrusOptions {
        &self.options
    }
}

#[async_trait]
impl ObjectStore for WalrusStore {
    async fn create_object(
        &self,
        id: &AssetId,
        bytes: Bytes,
        mime: &str,
        on_progress: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<AssetId, StoreError> {
        let len = bytes.len() as u64;
        self.limits.check(len, mime, 0)?;

        // The publisher takes the blob in one request
        let mut progress = ChunkProgress {
            chunks_transferred: 0,
            chunks_total: 1,
            bytes_transferred: 0,
            bytes_total: len,
        };
        on_progress(progress);

        tracing::debug!(%id, epochs = ?self.options.epochs, "storing blob on Walrus");
        // Deletable, so a replaced asset can be reclaimed by the owner later
        let result = self
            .client
            .store_blob(bytes.to_vec(), self.options.epochs, Some(true), None, None)
            .await
            .map_err(|e| StoreError::classify_transport_message(e.to_string()))?;

        let blob_id = match result.newly_created {
            Some(newly_created) => newly_created.blob_object.blob_id,
            None => return Err(StoreError::Other("Failed to create new blob".to_string())),
        };

        progress.chunks_transferred = 1;
        progress.bytes_transferred = len;
        on_progress(progress);
        Ok(AssetId::new(blob_id))
    }

    async fn delete_object(&self, id: &AssetId) -> Result<(), StoreError> {
        tracing::warn!(%id, "Walrus blobs cannot be deleted through the publisher");
        Err(StoreError::Unsupported("delete_object"))
    }

    fn object_url(&self, id: &AssetId) -> Option<String> {
        Some(build_walrus_access_url(
            &self.options.aggregator_url,
            id.as_str(),
        ))
    }

    fn name(&self) -> &'static str {
        "walrus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walrus_options_default() {
        let options = WalrusOptions::default();
        assert_eq!(
            options.aggregator_url,
            "https://aggregator.walrus-testnet.walrus.space"
        );
        assert_eq!(
            options.publisher_url,
            "https://publisher.walrus-testnet.walrus.space"
        );
        assert_eq!(options.epochs, Some(10));
    }

    #[test]
    fn test_walrus_options_temp_overrides_epochs() {
        let options = WalrusOptions::new(
            Some("https://custom.aggregator.com".to_string()),
            None,
            Some(20),
            true,
        );
        assert_eq!(options.aggregator_url, "https://custom.aggregator.com");
        assert_eq!(options.publisher_url, DEFAULT_WALRUS_PUBLISHER);
        assert_eq!(options.epochs, Some(1));

        let options = WalrusOptions::new(None, None, Some(20), false);
        assert_eq!(options.epochs, Some(20));
    }

    #[test]
    fn test_object_url_uses_aggregator() {
        let store = WalrusStore::new(WalrusOptions::default()).unwrap();
        assert_eq!(
            store.object_url(&AssetId::new("blob123")).unwrap(),
            "https://aggregator.walrus-testnet.walrus.space/v1/blobs/blob123"
        );
    }
}
