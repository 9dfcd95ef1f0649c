//! Repository storage backend over the GitHub contents API.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use cloudshelf_common::{folder_prefix, is_folder_key, trim_key, Error, Result, Secret};

use crate::backend::{Entry, ListResult, ObjectContent, StorageBackend};
use crate::download::DownloadResponse;
use crate::mime;

use super::client::{ContentItem, Contents, GitHubClient};

/// Placeholder file that keeps otherwise empty directories in git.
pub const KEEP_MARKER: &str = ".gitkeep";

/// Thumbnail box edge for repository images.
pub const THUMBNAIL_EDGE: u32 = 200;

/// Parallel commit lookups while enriching a listing.
const COMMIT_LOOKUP_CONCURRENCY: usize = 8;

/// Repository backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Personal access token.
    pub token: Secret,
    /// Repository as `owner/name`.
    pub repo: String,
    /// Branch to read and commit to.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// API base URL override.
    #[serde(default)]
    pub api_base: Option<String>,
    /// Raw content base URL override.
    #[serde(default)]
    pub raw_base: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl RepositoryConfig {
    /// Names of required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.token.is_blank() {
            missing.push("token");
        }
        if self.repo.trim().is_empty() {
            missing.push("repo");
        }
        missing
    }

    /// Split `repo` into owner and name.
    pub fn owner_and_name(&self) -> Result<(&str, &str)> {
        match self.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((owner, name))
            }
            _ => Err(Error::InvalidConfiguration(format!(
                "Repository must be in format 'owner/repo', got: {}",
                self.repo
            ))),
        }
    }
}

/// Repository storage backend.
///
/// Folders exist only through the files inside them. Every write is a
/// commit on the configured branch and must carry the current blob SHA of
/// the file it replaces or deletes.
pub struct RepositoryBackend {
    client: GitHubClient,
}

impl RepositoryBackend {
    /// Create a backend from configuration.
    pub fn new(config: &RepositoryConfig) -> Result<Self> {
        let (owner, name) = config.owner_and_name()?;
        let client = GitHubClient::new(
            config.token.clone(),
            owner,
            name,
            &config.branch,
            config.api_base.as_deref(),
            config.raw_base.as_deref(),
        )?;
        info!(repo = %config.repo, branch = %config.branch, "Repository backend ready");
        Ok(Self { client })
    }

    /// Repository metadata lookup.
    pub async fn verify(&self) -> Result<()> {
        self.client.check_repository().await
    }

    /// Tree entries at `prefix`, keep markers included. One API call.
    pub async fn tree(&self, prefix: &str) -> Result<Vec<ContentItem>> {
        Ok(match self.client.contents(prefix).await? {
            None => Vec::new(),
            Some(Contents::Listing(items)) => items,
            // A file path was listed; there is nothing below it.
            Some(Contents::Single(_)) => Vec::new(),
        })
    }

    /// Tree entries at `prefix`, keep markers removed.
    pub async fn list_tree(&self, prefix: &str) -> Result<Vec<ContentItem>> {
        Ok(self
            .tree(prefix)
            .await?
            .into_iter()
            .filter(|item| !(item.is_file() && item.name == KEEP_MARKER))
            .collect())
    }

    /// Listing built from tree entries. With `enrich`, every file gets the
    /// time of the latest commit touching it (one extra call per file).
    async fn listing(&self, items: Vec<ContentItem>, enrich: bool) -> ListResult {
        let mut result = ListResult::default();
        let mut files = Vec::new();

        for item in items {
            if item.is_dir() {
                result.prefixes.push(folder_prefix(&item.path));
            } else if item.is_file() {
                files.push(item);
            }
        }

        if !enrich {
            result.entries = files
                .into_iter()
                .map(|item| Entry::file(item.path, Some(item.size), None, Some(item.sha)))
                .collect();
            return result;
        }

        result.entries = stream::iter(files)
            .map(|item| async move {
                let modified = match self.client.last_commit_time(&item.path).await {
                    Ok(time) => time,
                    Err(e) => {
                        debug!(path = %item.path, error = %e, "Commit time lookup failed");
                        None
                    }
                };
                Entry::file(item.path, Some(item.size), modified, Some(item.sha))
            })
            .buffered(COMMIT_LOOKUP_CONCURRENCY)
            .collect()
            .await;
        result
    }
}

#[async_trait]
impl StorageBackend for RepositoryBackend {
    async fn list(&self, prefix: &str) -> Result<ListResult> {
        let items = self.list_tree(prefix).await?;
        Ok(self.listing(items, true).await)
    }

    /// Tree listing without commit lookups. Keep markers stay in so
    /// folder operations move or delete them with the rest.
    async fn scan(&self, prefix: &str) -> Result<ListResult> {
        let items = self.tree(prefix).await?;
        Ok(self.listing(items, false).await)
    }

    async fn stat(&self, key: &str) -> Result<Entry> {
        match self.client.contents(key).await? {
            None => Err(Error::NotFound(format!("Object not found: {}", key))),
            Some(Contents::Listing(_)) => Ok(Entry::directory(key, None)),
            Some(Contents::Single(item)) => {
                let modified = self.client.last_commit_time(&item.path).await.ok().flatten();
                Ok(Entry::file(item.path, Some(item.size), modified, Some(item.sha)))
            }
        }
    }

    async fn read(&self, key: &str) -> Result<ObjectContent> {
        let (bytes, served_type) = self.client.raw(key).await?;
        let content_type = mime::guess(key)
            .map(str::to_string)
            .or(served_type)
            .unwrap_or_else(|| mime::DEFAULT_CONTENT_TYPE.to_string());
        Ok(ObjectContent {
            bytes,
            content_type,
        })
    }

    async fn presigned_url(&self, key: &str, _ttl: Duration) -> Result<Option<String>> {
        Ok(Some(self.client.raw_url(key)))
    }

    async fn public_url(&self, key: &str) -> Result<Option<String>> {
        Ok(Some(self.client.raw_url(key)))
    }

    /// Content is relayed so the attachment filename can be set.
    async fn download_response(&self, key: &str) -> Result<Option<DownloadResponse>> {
        let content = self.read(key).await?;
        Ok(Some(DownloadResponse::relay(
            key,
            content.bytes,
            &content.content_type,
        )))
    }

    async fn upload(&self, key: &str, data: Bytes, _content_type: Option<&str>) -> Result<()> {
        if trim_key(key).is_empty() || is_folder_key(key) {
            return Err(Error::InvalidInput(format!("Not a file key: {:?}", key)));
        }
        let sha = self.client.file_sha(key).await?;
        info!(key = %key, size = data.len(), replacing = sha.is_some(), "Committing file");
        self.client.put_file(key, &data, sha.as_deref()).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let sha = self
            .client
            .file_sha(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", key)))?;
        info!(key = %key, "Deleting file");
        self.client.delete_file(key, &sha).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let content = self.read(src).await?;
        self.upload(dst, content.bytes, Some(&content.content_type))
            .await
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        debug!(path = %path, "Repository folders appear with their first file");
        Ok(())
    }

    fn thumbnail_edge(&self) -> u32 {
        THUMBNAIL_EDGE
    }
}
