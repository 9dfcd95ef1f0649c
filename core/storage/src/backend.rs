//! Storage backend trait definition and the entry model it speaks.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use cloudshelf_common::{file_name, folder_prefix, Result};

use crate::download::DownloadResponse;
use crate::folder::{self, DestinationMapping};
use crate::thumbnail::{self, ThumbnailResponse, DEFAULT_THUMBNAIL_EDGE};

/// Presigned URL lifetime used when the configuration does not set one.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

pub(crate) fn default_presign_ttl_secs() -> u64 {
    DEFAULT_PRESIGN_TTL.as_secs()
}

/// A file or folder as reported by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Slash-separated key with no leading slash. Folders end with `/`.
    pub key: String,
    /// Size in bytes (None when the backend does not report it).
    pub size: Option<u64>,
    /// Last modification time, approximated when the backend has none.
    pub last_modified: DateTime<Utc>,
    /// Object hash, content SHA or drive item id, depending on the backend.
    pub etag: Option<String>,
    /// Whether this entry is a folder.
    pub is_directory: bool,
}

impl Entry {
    /// A file entry.
    pub fn file(
        key: impl Into<String>,
        size: Option<u64>,
        last_modified: Option<DateTime<Utc>>,
        etag: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: last_modified.unwrap_or_else(Utc::now),
            etag,
            is_directory: false,
        }
    }

    /// A folder entry for the given prefix.
    pub fn directory(prefix: &str, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            key: folder_prefix(prefix),
            size: None,
            last_modified: last_modified.unwrap_or_else(Utc::now),
            etag: None,
            is_directory: true,
        }
    }

    /// Display name (last key segment).
    pub fn name(&self) -> &str {
        file_name(&self.key)
    }
}

/// One level of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    /// Files directly under the listed prefix.
    pub entries: Vec<Entry>,
    /// Subfolder prefixes, each ending with `/`.
    pub prefixes: Vec<String>,
}

impl ListResult {
    /// Whether the level holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.prefixes.is_empty()
    }

    /// Flatten into display order: folders first, then files, each group
    /// sorted by name.
    pub fn into_items(self) -> Vec<Entry> {
        let mut prefixes = self.prefixes;
        prefixes.sort();
        prefixes.dedup();

        let mut entries = self.entries;
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        prefixes
            .iter()
            .map(|prefix| Entry::directory(prefix, None))
            .chain(entries)
            .collect()
    }
}

/// Object bytes together with the content type to serve them with.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectContent {
    pub bytes: Bytes,
    pub content_type: String,
}

impl ObjectContent {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Hierarchical file operations over a remote storage system.
///
/// Keys are slash-separated and never start with `/`. Folder prefixes end
/// with `/`; the empty prefix is the root. Side-effecting operations return
/// `Ok(())` on success; a refusal by the backend is
/// [`Error::OperationFailed`](cloudshelf_common::Error::OperationFailed),
/// a missing resource is `NotFound` and transport trouble is
/// `BackendUnavailable`.
///
/// Multi-step operations (rename by copy and delete, the folder variants)
/// are not atomic and are never rolled back.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List one level under `prefix`.
    ///
    /// A prefix that does not exist yields an empty listing.
    async fn list(&self, prefix: &str) -> Result<ListResult>;

    /// Metadata for a single key.
    ///
    /// # Errors
    /// - `NotFound` if nothing lives at the key
    async fn stat(&self, key: &str) -> Result<Entry>;

    /// Full object content.
    ///
    /// # Errors
    /// - `NotFound` if nothing lives at the key
    async fn read(&self, key: &str) -> Result<ObjectContent>;

    /// Time-limited direct URL, if the backend can produce one.
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<Option<String>>;

    /// Permanent public URL, if one is configured.
    async fn public_url(&self, key: &str) -> Result<Option<String>>;

    /// Store `data` at `key`, replacing anything already there.
    ///
    /// The content type is guessed from the extension when not given.
    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()>;

    /// Remove a single object.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Duplicate `src` at `dst`.
    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    /// Create a folder placeholder. Backends without folders treat this as
    /// a no-op.
    async fn create_folder(&self, path: &str) -> Result<()>;

    /// TTL used for presigned URLs handed out by `download_response`.
    fn presign_ttl(&self) -> Duration {
        DEFAULT_PRESIGN_TTL
    }

    /// Bounding box edge for generated thumbnails.
    fn thumbnail_edge(&self) -> u32 {
        DEFAULT_THUMBNAIL_EDGE
    }

    /// How folder operations map a source key onto the destination prefix.
    fn destination_mapping(&self) -> DestinationMapping {
        DestinationMapping::ReplacePrefix
    }

    /// Listing used while walking a tree in folder operations.
    ///
    /// Defaults to [`list`](Self::list). Backends whose `list` does extra
    /// per-entry work override this with the cheaper traversal listing.
    async fn scan(&self, prefix: &str) -> Result<ListResult> {
        self.list(prefix).await
    }

    /// Remove the placeholder of a folder whose contents are gone.
    async fn delete_folder_node(&self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    /// How a client should obtain the object: presigned URL, then public
    /// URL, else `None`.
    async fn download_response(&self, key: &str) -> Result<Option<DownloadResponse>> {
        if let Some(url) = self.presigned_url(key, self.presign_ttl()).await? {
            return Ok(Some(DownloadResponse::Redirect { url }));
        }
        if let Some(url) = self.public_url(key).await? {
            return Ok(Some(DownloadResponse::Redirect { url }));
        }
        Ok(None)
    }

    /// Move `old_key` to `new_key` by copying then deleting.
    ///
    /// If the delete fails both keys exist afterwards.
    async fn rename(&self, old_key: &str, new_key: &str) -> Result<()> {
        self.copy(old_key, new_key).await?;
        if let Err(err) = self.delete(old_key).await {
            warn!(from = %old_key, to = %new_key, error = %err, "Copied but could not remove source");
            return Err(err);
        }
        Ok(())
    }

    /// Delete everything under `prefix`, recursively.
    async fn delete_folder(&self, prefix: &str) -> Result<()> {
        folder::delete_folder(self, prefix).await
    }

    /// Copy everything under `src` to `dst`, recursively.
    async fn copy_folder(&self, src: &str, dst: &str) -> Result<()> {
        folder::copy_folder(self, src, dst).await
    }

    /// Move everything under `src` to `dst` item by item.
    async fn rename_folder(&self, src: &str, dst: &str) -> Result<()> {
        folder::rename_folder(self, src, dst).await
    }

    /// JPEG thumbnail of an image, or a redirect for oversized sources.
    async fn thumbnail(&self, key: &str) -> Result<ThumbnailResponse> {
        thumbnail::generate(self, key).await
    }
}
