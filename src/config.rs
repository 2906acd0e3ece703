//! TOML configuration for the CLI.
//!
//! ```toml
//! [pipeline]
//! aspect = "4:3"
//! skip_crop_threshold = 8388608
//!
//! [compression]
//! quality = 80
//! format = "jpeg"
//!
//! [store]
//! kind = "local"
//! dir = "uploads"
//! ```
//!
//! Every field is optional; missing ones fall back to the crate defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compression::{CompressionConfig, Quality};
use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_LOCAL_STORE_DIR};
use crate::crop::AspectRatio;
use crate::error::{IngestError, Result};
use crate::formats::OutputFormat;
use crate::pipeline::PipelineOptions;
use crate::store::{LocalStore, MemoryStore, ObjectStore, StoreLimits, WalrusOptions, WalrusStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub pipeline: PipelineSection,
    pub compression: CompressionSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub aspect: Option<String>,
    pub skip_crop_threshold: Option<u64>,
    pub pixel_ratio: Option<f64>,
    pub max_file_bytes: Option<u64>,
    pub accepted_types: Option<Vec<String>>,
    pub retry_network_failure: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionSection {
    /// Percent, 1..=100.
    pub quality: Option<u8>,
    pub format: Option<String>,
    pub preserve_original: Option<bool>,
    pub keep_smaller: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Local,
    Walrus,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub kind: StoreKind,
    pub dir: Option<PathBuf>,
    pub chunk_size: Option<u64>,
    pub max_object_bytes: Option<u64>,
    pub quota_bytes: Option<u64>,
    pub allowed_types: Option<Vec<String>>,
    pub aggregator_url: Option<String>,
    pub publisher_url: Option<String>,
    pub epochs: Option<u64>,
    pub temp: bool,
}

impl IngestConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        let defaults = PipelineOptions::default();
        let section = &self.pipeline;

        let aspect = match section.aspect.as_deref() {
            Some(aspect) => aspect.parse::<AspectRatio>()?,
            None => defaults.aspect,
        };

        Ok(PipelineOptions {
            aspect,
            skip_crop_threshold: section
                .skip_crop_threshold
                .unwrap_or(defaults.skip_crop_threshold),
            compression: self.compression.to_config()?,
            pixel_ratio: section.pixel_ratio.unwrap_or(defaults.pixel_ratio),
            max_file_bytes: section.max_file_bytes.unwrap_or(defaults.max_file_bytes),
            accepted_types: section
                .accepted_types
                .clone()
                .unwrap_or(defaults.accepted_types),
            retry_network_failure: section
                .retry_network_failure
                .unwrap_or(defaults.retry_network_failure),
        })
    }
}

impl CompressionSection {
    pub fn to_config(&self) -> Result<CompressionConfig> {
        let defaults = CompressionConfig::default();
        Ok(CompressionConfig {
            format: match self.format.as_deref() {
                Some(format) => format.parse::<OutputFormat>()?,
                None => defaults.format,
            },
            quality: match self.quality {
                Some(percent) => Quality::from_percent(percent)?,
                None => defaults.quality,
            },
            preserve_original: self.preserve_original.unwrap_or(defaults.preserve_original),
            keep_smaller: self.keep_smaller.unwrap_or(defaults.keep_smaller),
        })
    }
}

impl StoreSection {
    pub fn limits(&self) -> StoreLimits {
        StoreLimits {
            max_object_bytes: self.max_object_bytes,
            quota_bytes: self.quota_bytes,
            allowed_types: self.allowed_types.clone().unwrap_or_default(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_STORE_DIR))
    }

    pub fn walrus_options(&self) -> WalrusOptions {
        WalrusOptions::new(
            self.aggregator_url.clone(),
            self.publisher_url.clone(),
            self.epochs,
            self.temp,
        )
    }

    /// Instantiates the configured backend.
    pub fn build(&self) -> Result<Box<dyn ObjectStore>> {
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let store: Box<dyn ObjectStore> = match self.kind {
            StoreKind::Local => Box::new(
                LocalStore::new(self.dir())
                    .with_chunk_size(chunk_size)
                    .with_limits(self.limits()),
            ),
            StoreKind::Memory => Box::new(
                MemoryStore::new()
                    .with_chunk_size(chunk_size)
                    .with_limits(self.limits()),
            ),
            StoreKind::Walrus => {
                Box::new(WalrusStore::new(self.walrus_options())?.with_limits(self.limits()))
            }
        };
        Ok(store)
    }
}
