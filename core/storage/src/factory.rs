//! Backend construction and the optional process-wide handle.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use cloudshelf_common::{Error, Result};

use crate::backend::{Entry, ListResult, ObjectContent, StorageBackend};
use crate::cloud_drive::CloudDriveBackend;
use crate::config::StorageConfig;
use crate::download::DownloadResponse;
use crate::folder::DestinationMapping;
use crate::memory::MemoryBackend;
use crate::object_store::ObjectStoreBackend;
use crate::repository::RepositoryBackend;
use crate::thumbnail::ThumbnailResponse;

static GLOBAL: OnceCell<Backend> = OnceCell::const_new();

/// The backend selected at startup.
pub enum Backend {
    ObjectStore(ObjectStoreBackend),
    Repository(RepositoryBackend),
    CloudDrive(CloudDriveBackend),
    Memory(MemoryBackend),
}

/// Run `$call` against whichever backend `$self` holds.
macro_rules! dispatch {
    ($self:expr, $backend:ident => $call:expr) => {
        match $self {
            Backend::ObjectStore($backend) => $call,
            Backend::Repository($backend) => $call,
            Backend::CloudDrive($backend) => $call,
            Backend::Memory($backend) => $call,
        }
    };
}

impl Backend {
    /// Validate `config` and construct the backend it names.
    ///
    /// No network call is made; see [`connect`](Self::connect).
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let backend = match config {
            StorageConfig::ObjectStore(config) => Self::ObjectStore(ObjectStoreBackend::new(config)?),
            StorageConfig::Repository(config) => Self::Repository(RepositoryBackend::new(config)?),
            StorageConfig::CloudDrive(config) => Self::CloudDrive(CloudDriveBackend::new(config)?),
            StorageConfig::Memory => Self::Memory(MemoryBackend::new()),
        };
        info!(storage_type = %backend.kind(), "Storage backend selected");
        Ok(backend)
    }

    /// Construct from a JSON configuration.
    pub fn from_value(value: Value) -> Result<Self> {
        Self::from_config(&StorageConfig::from_value(value)?)
    }

    /// Construct from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_config(&StorageConfig::from_env()?)
    }

    /// Construct, then check connectivity when `verify` is set.
    pub async fn connect(config: &StorageConfig, verify: bool) -> Result<Self> {
        let backend = Self::from_config(config)?;
        if verify {
            backend.verify().await?;
        }
        Ok(backend)
    }

    /// The `storage_type` name of this backend.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ObjectStore(_) => "r2",
            Self::Repository(_) => "github",
            Self::CloudDrive(_) => "onedrive",
            Self::Memory(_) => "memory",
        }
    }

    /// Cheap round trip proving the configured credentials work.
    pub async fn verify(&self) -> Result<()> {
        match self {
            Self::ObjectStore(backend) => backend.verify().await,
            Self::Repository(backend) => backend.verify().await,
            Self::CloudDrive(backend) => backend.verify().await,
            Self::Memory(_) => Ok(()),
        }
    }
}

/// Build the process-wide backend from `config`.
///
/// Only the first call constructs anything; later calls return the handle
/// built by the first one.
pub async fn init_global(config: &StorageConfig) -> Result<&'static Backend> {
    GLOBAL
        .get_or_try_init(|| async { Backend::from_config(config) })
        .await
}

/// The process-wide backend.
///
/// # Errors
/// - `InvalidConfiguration` if [`init_global`] has not run
pub fn global() -> Result<&'static Backend> {
    GLOBAL
        .get()
        .ok_or_else(|| Error::InvalidConfiguration("Storage backend not initialized".to_string()))
}

#[async_trait]
impl StorageBackend for Backend {
    async fn list(&self, prefix: &str) -> Result<ListResult> {
        dispatch!(self, b => b.list(prefix).await)
    }

    async fn stat(&self, key: &str) -> Result<Entry> {
        dispatch!(self, b => b.stat(key).await)
    }

    async fn read(&self, key: &str) -> Result<ObjectContent> {
        dispatch!(self, b => b.read(key).await)
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        dispatch!(self, b => b.presigned_url(key, ttl).await)
    }

    async fn public_url(&self, key: &str) -> Result<Option<String>> {
        dispatch!(self, b => b.public_url(key).await)
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        dispatch!(self, b => b.upload(key, data, content_type).await)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        dispatch!(self, b => b.delete(key).await)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        dispatch!(self, b => b.copy(src, dst).await)
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        dispatch!(self, b => b.create_folder(path).await)
    }

    fn presign_ttl(&self) -> Duration {
        dispatch!(self, b => b.presign_ttl())
    }

    fn thumbnail_edge(&self) -> u32 {
        dispatch!(self, b => b.thumbnail_edge())
    }

    fn destination_mapping(&self) -> DestinationMapping {
        dispatch!(self, b => b.destination_mapping())
    }

    async fn scan(&self, prefix: &str) -> Result<ListResult> {
        dispatch!(self, b => b.scan(prefix).await)
    }

    async fn delete_folder_node(&self, prefix: &str) -> Result<()> {
        dispatch!(self, b => b.delete_folder_node(prefix).await)
    }

    async fn download_response(&self, key: &str) -> Result<Option<DownloadResponse>> {
        dispatch!(self, b => b.download_response(key).await)
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> Result<()> {
        dispatch!(self, b => b.rename(old_key, new_key).await)
    }

    async fn delete_folder(&self, prefix: &str) -> Result<()> {
        dispatch!(self, b => b.delete_folder(prefix).await)
    }

    async fn copy_folder(&self, src: &str, dst: &str) -> Result<()> {
        dispatch!(self, b => b.copy_folder(src, dst).await)
    }

    async fn rename_folder(&self, src: &str, dst: &str) -> Result<()> {
        dispatch!(self, b => b.rename_folder(src, dst).await)
    }

    async fn thumbnail(&self, key: &str) -> Result<ThumbnailResponse> {
        dispatch!(self, b => b.thumbnail(key).await)
    }
}
