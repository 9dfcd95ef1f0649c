//! S3-compatible object store backend (Cloudflare R2) built on OpenDAL.
//!
//! Folders are emulated: a listing with a delimiter reports common prefixes
//! as subfolders and a zero-length object whose key ends in `/` marks an
//! empty folder.

use async_trait::async_trait;
use bytes::Bytes;
use opendal::layers::{LoggingLayer, TimeoutLayer};
use opendal::services::S3;
use opendal::{EntryMode, ErrorKind, Metadata, Operator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use cloudshelf_common::{
    encode_path, folder_prefix, is_folder_key, replace_prefix, trim_key, Error, Result, Secret,
};

use crate::backend::{default_presign_ttl_secs, Entry, ListResult, ObjectContent, StorageBackend};
use crate::download::{content_disposition, DownloadResponse};
use crate::folder::folder_pair;
use crate::mime;

/// Keys removed per batch delete request.
pub const DELETE_BATCH_LIMIT: usize = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Object store backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Cloudflare account id, used to derive the endpoint.
    pub account_id: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: Secret,
    /// Bucket name.
    pub bucket_name: String,
    /// Custom public domain serving the bucket, if any.
    #[serde(default)]
    pub public_domain: Option<String>,
    /// Endpoint override. Defaults to the account's R2 endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Region. R2 expects `auto`.
    #[serde(default = "default_region")]
    pub region: String,
    /// Presigned URL lifetime in seconds.
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
}

fn default_region() -> String {
    "auto".to_string()
}

impl ObjectStoreConfig {
    /// Names of required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.account_id.trim().is_empty() && self.endpoint.is_none() {
            missing.push("account_id");
        }
        if self.access_key_id.trim().is_empty() {
            missing.push("access_key_id");
        }
        if self.secret_access_key.is_blank() {
            missing.push("secret_access_key");
        }
        if self.bucket_name.trim().is_empty() {
            missing.push("bucket_name");
        }
        missing
    }

    /// Endpoint URL the S3 client talks to.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}.r2.cloudflarestorage.com", self.account_id),
        }
    }
}

/// Object store backend.
pub struct ObjectStoreBackend {
    operator: Operator,
    public_domain: Option<String>,
    presign_ttl: Duration,
    delete_batch_limit: usize,
}

impl ObjectStoreBackend {
    /// Build an S3 operator against the configured bucket.
    pub fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let builder = S3::default()
            .bucket(&config.bucket_name)
            .region(&config.region)
            .endpoint(&config.endpoint_url())
            .access_key_id(&config.access_key_id)
            .secret_access_key(config.secret_access_key.expose());

        let operator = Operator::new(builder)
            .map_err(|e| Error::InvalidConfiguration(format!("Object store: {}", e)))?
            .layer(LoggingLayer::default())
            .layer(TimeoutLayer::new().with_timeout(REQUEST_TIMEOUT))
            .finish();

        info!(bucket = %config.bucket_name, "Object store backend ready");
        Ok(Self::from_operator(
            operator,
            config.public_domain.clone(),
            Duration::from_secs(config.presign_ttl_secs),
        ))
    }

    /// Wrap an already built operator.
    pub fn from_operator(
        operator: Operator,
        public_domain: Option<String>,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            operator,
            public_domain: public_domain
                .map(|domain| domain.trim_end_matches('/').to_string())
                .filter(|domain| !domain.is_empty()),
            presign_ttl,
            delete_batch_limit: DELETE_BATCH_LIMIT,
        }
    }

    /// Cap the number of keys sent in one batch delete request.
    pub fn with_delete_batch_limit(mut self, limit: usize) -> Self {
        self.delete_batch_limit = limit.clamp(1, DELETE_BATCH_LIMIT);
        self
    }

    /// Round-trip to the bucket.
    pub async fn verify(&self) -> Result<()> {
        self.operator
            .check()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Object store check failed: {}", e)))
    }

    fn entry(key: &str, meta: &Metadata) -> Entry {
        if meta.mode() == EntryMode::DIR {
            return Entry::directory(key, meta.last_modified());
        }
        Entry::file(
            key,
            Some(meta.content_length()),
            meta.last_modified(),
            meta.etag().map(|etag| etag.trim_matches('"').to_string()),
        )
    }

    /// Every key under `prefix`, markers included.
    async fn keys_under(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = match self.operator.list_with(prefix).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(map_err(e, prefix)),
        };
        Ok(entries
            .into_iter()
            .map(|entry| entry.path().to_string())
            .filter(|path| path.starts_with(prefix))
            .collect())
    }
}

fn map_err(err: opendal::Error, key: &str) -> Error {
    match err.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("Object not found: {}", key)),
        ErrorKind::ConfigInvalid => Error::InvalidConfiguration(err.to_string()),
        ErrorKind::Unsupported
        | ErrorKind::IsADirectory
        | ErrorKind::NotADirectory
        | ErrorKind::AlreadyExists
        | ErrorKind::ConditionNotMatch => {
            Error::OperationFailed(format!("{}: {}", key, err))
        }
        _ => Error::BackendUnavailable(format!("{}: {}", key, err)),
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn list(&self, prefix: &str) -> Result<ListResult> {
        let prefix = folder_prefix(prefix);
        let path = if prefix.is_empty() { "/" } else { prefix.as_str() };

        let entries = match self.operator.list_with(path).recursive(false).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ListResult::default()),
            Err(e) => return Err(map_err(e, &prefix)),
        };

        let mut result = ListResult::default();
        for entry in entries {
            let key = entry.path();
            if key == prefix || key == "/" {
                continue;
            }
            if entry.metadata().mode() == EntryMode::DIR {
                result.prefixes.push(key.to_string());
            } else {
                result.entries.push(Self::entry(key, entry.metadata()));
            }
        }

        debug!(
            prefix = %prefix,
            files = result.entries.len(),
            folders = result.prefixes.len(),
            "Listed object store level"
        );
        Ok(result)
    }

    async fn stat(&self, key: &str) -> Result<Entry> {
        let meta = self
            .operator
            .stat(key)
            .await
            .map_err(|e| map_err(e, key))?;
        Ok(Self::entry(key, &meta))
    }

    async fn read(&self, key: &str) -> Result<ObjectContent> {
        let meta = self
            .operator
            .stat(key)
            .await
            .map_err(|e| map_err(e, key))?;
        let buffer = self
            .operator
            .read(key)
            .await
            .map_err(|e| map_err(e, key))?;

        let content_type = meta
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| mime::content_type_for(key).to_string());
        Ok(ObjectContent {
            bytes: buffer.to_bytes(),
            content_type,
        })
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        match self.operator.presign_read(key, ttl).await {
            Ok(request) => Ok(Some(request.uri().to_string())),
            Err(e) if e.kind() == ErrorKind::Unsupported => Ok(None),
            Err(e) => Err(map_err(e, key)),
        }
    }

    async fn public_url(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .public_domain
            .as_ref()
            .map(|domain| format!("{}/{}", domain, encode_path(key))))
    }

    fn presign_ttl(&self) -> Duration {
        self.presign_ttl
    }

    async fn download_response(&self, key: &str) -> Result<Option<DownloadResponse>> {
        let signed = self
            .operator
            .presign_read_with(key, self.presign_ttl)
            .override_content_disposition(&content_disposition(key))
            .await;

        match signed {
            Ok(request) => {
                return Ok(Some(DownloadResponse::Redirect {
                    url: request.uri().to_string(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::Unsupported => {}
            Err(e) => return Err(map_err(e, key)),
        }

        Ok(self
            .public_url(key)
            .await?
            .map(|url| DownloadResponse::Redirect { url }))
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        if trim_key(key).is_empty() || is_folder_key(key) {
            return Err(Error::InvalidInput(format!("Not a file key: {:?}", key)));
        }
        let content_type = content_type.unwrap_or_else(|| mime::content_type_for(key));
        info!(key = %key, size = data.len(), content_type = %content_type, "Uploading object");

        let result = if self
            .operator
            .info()
            .full_capability()
            .write_with_content_type
        {
            self.operator
                .write_with(key, data)
                .content_type(content_type)
                .await
        } else {
            self.operator.write(key, data).await
        };
        result.map(|_| ()).map_err(|e| map_err(e, key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        info!(key = %key, "Deleting object");
        self.operator
            .delete(key)
            .await
            .map_err(|e| map_err(e, key))
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        debug!(from = %src, to = %dst, "Copying object");
        self.operator
            .copy(src, dst)
            .await
            .map_err(|e| map_err(e, src))
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let prefix = folder_prefix(path);
        if prefix.is_empty() {
            return Err(Error::InvalidInput("Folder path is empty".to_string()));
        }
        info!(prefix = %prefix, "Creating folder marker");
        self.operator
            .create_dir(&prefix)
            .await
            .map_err(|e| map_err(e, &prefix))
    }

    /// Batch delete of every key under the prefix.
    async fn delete_folder(&self, prefix: &str) -> Result<()> {
        let prefix = folder_prefix(prefix);
        if prefix.is_empty() {
            return Err(Error::InvalidInput(
                "Refusing to delete the storage root".to_string(),
            ));
        }

        let mut keys = self.keys_under(&prefix).await?;
        if keys.is_empty() {
            debug!(prefix = %prefix, "Nothing to delete");
            return Ok(());
        }

        // Reverse lexical order puts children ahead of the marker that holds them.
        keys.sort_unstable_by(|a, b| b.cmp(a));
        info!(prefix = %prefix, count = keys.len(), "Deleting folder");

        for batch in keys.chunks(self.delete_batch_limit) {
            debug!(prefix = %prefix, size = batch.len(), "Deleting batch");
            self.operator
                .remove(batch.to_vec())
                .await
                .map_err(|e| map_err(e, &prefix))?;
        }
        Ok(())
    }

    /// Copy of the flat key listing under `src`.
    async fn copy_folder(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = folder_pair(src, dst)?;
        let keys = self.keys_under(&src).await?;
        info!(src = %src, dst = %dst, count = keys.len(), "Copying folder");

        for key in keys {
            let target = replace_prefix(&key, &src, &dst);
            if is_folder_key(&key) {
                self.operator
                    .create_dir(&target)
                    .await
                    .map_err(|e| map_err(e, &target))?;
            } else {
                self.copy(&key, &target).await?;
            }
        }
        Ok(())
    }

    /// Copy every key, then delete the source tree.
    async fn rename_folder(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = folder_pair(src, dst)?;
        self.copy_folder(&src, &dst).await?;
        self.delete_folder(&src).await
    }
}
