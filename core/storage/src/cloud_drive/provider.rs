//! Cloud drive storage backend over Microsoft Graph (OneDrive).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use cloudshelf_common::{
    file_name, folder_prefix, is_folder_key, parent_prefix, trim_key, Error, Result, Secret,
};

use crate::backend::{default_presign_ttl_secs, Entry, ListResult, ObjectContent, StorageBackend};
use crate::download::DownloadResponse;
use crate::folder::DestinationMapping;
use crate::mime;
use crate::thumbnail::{self, ThumbnailResponse};

use super::auth::{AuthConfig, CredentialStatus, OAuthExchange, TokenManager};
use super::client::{DriveItem, GraphClient, RootItem};

/// Thumbnail box edge for locally derived drive thumbnails.
pub const THUMBNAIL_EDGE: u32 = 300;

/// Cloud drive backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudDriveConfig {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: Secret,
    /// Long-lived refresh token.
    pub refresh_token: Secret,
    /// Item id of the folder used as root. Defaults to the drive root.
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Redirect URI registered with the application.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Scope requested when the scopeless refresh is rejected.
    #[serde(default)]
    pub scopes: Option<String>,
    /// Graph API base URL override.
    #[serde(default)]
    pub api_base: Option<String>,
    /// Token endpoint override.
    #[serde(default)]
    pub token_url: Option<String>,
    /// Share link lifetime in seconds.
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
}

impl CloudDriveConfig {
    /// Names of required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.trim().is_empty() {
            missing.push("client_id");
        }
        if self.client_secret.is_blank() {
            missing.push("client_secret");
        }
        if self.refresh_token.is_blank() {
            missing.push("refresh_token");
        }
        missing
    }

    fn root(&self) -> RootItem {
        match self.folder_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => RootItem::Folder(id.to_string()),
            _ => RootItem::DriveRoot,
        }
    }
}

/// Cloud drive storage backend.
///
/// Items are addressed by path below the configured root item. Folders are
/// real drive items; an access token is obtained lazily from the refresh
/// token and renewed when the API rejects it.
pub struct CloudDriveBackend {
    client: GraphClient,
    tokens: Arc<TokenManager>,
    presign_ttl: Duration,
}

impl CloudDriveBackend {
    /// Create a backend from configuration. No network call is made.
    pub fn new(config: &CloudDriveConfig) -> Result<Self> {
        let exchange = OAuthExchange::new(&AuthConfig {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: config.token_url.clone(),
        })?;
        let tokens = Arc::new(TokenManager::new(
            Box::new(exchange),
            config.refresh_token.clone(),
            config.scopes.as_deref(),
        ));
        let client = GraphClient::new(tokens.clone(), config.api_base.as_deref(), config.root())?;

        info!(root = ?config.root(), "Cloud drive backend ready");
        Ok(Self {
            client,
            tokens,
            presign_ttl: Duration::from_secs(config.presign_ttl_secs),
        })
    }

    /// Obtain an access token now instead of on the first call.
    pub async fn authenticate(&self) -> Result<()> {
        self.tokens.access_token().await.map(|_| ())
    }

    /// Where the credential stands.
    pub async fn credential_status(&self) -> CredentialStatus {
        self.tokens.status().await
    }

    /// Drive metadata lookup.
    pub async fn verify(&self) -> Result<()> {
        self.client.check_drive().await
    }

    /// Make sure every segment of `path` exists as a folder, creating the
    /// missing ones from the top down. Returns the id of the last one.
    pub async fn ensure_folder(&self, path: &str) -> Result<String> {
        let mut parent_id = self.client.root_item_id().await?;

        for segment in trim_key(path).split('/').filter(|s| !s.is_empty()) {
            parent_id = match self.client.child(&parent_id, segment).await? {
                Some(item) if item.is_folder() => item.id,
                Some(_) => {
                    return Err(Error::OperationFailed(format!(
                        "{} exists and is not a folder",
                        segment
                    )))
                }
                None => {
                    debug!(parent = %parent_id, name = %segment, "Creating folder");
                    self.client.create_child_folder(&parent_id, segment).await?.id
                }
            };
        }
        Ok(parent_id)
    }

    /// Id of the folder that holds (or will hold) `key`.
    async fn parent_id(&self, key: &str) -> Result<String> {
        let parent = parent_prefix(key);
        if parent.is_empty() {
            self.client.root_item_id().await
        } else {
            self.ensure_folder(&parent).await
        }
    }

    async fn item(&self, key: &str) -> Result<DriveItem> {
        self.client
            .get_item(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", key)))
    }

    /// One folder level. Dot-names are kept only when `hidden` is set.
    async fn level(&self, prefix: &str, hidden: bool) -> Result<ListResult> {
        let prefix = folder_prefix(prefix);
        let mut result = ListResult::default();

        let Some(items) = self.client.list_children(&prefix).await? else {
            return Ok(result);
        };

        for item in items
            .into_iter()
            .filter(|item| hidden || !item.name.starts_with('.'))
        {
            let key = format!("{}{}", prefix, item.name);
            if item.is_folder() {
                result.prefixes.push(folder_prefix(&key));
            } else {
                result.entries.push(Entry::file(
                    key,
                    item.size,
                    item.last_modified_date_time,
                    Some(item.id),
                ));
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl StorageBackend for CloudDriveBackend {
    async fn list(&self, prefix: &str) -> Result<ListResult> {
        self.level(prefix, false).await
    }

    // Keeps dot-names so folder operations carry them along.
    async fn scan(&self, prefix: &str) -> Result<ListResult> {
        self.level(prefix, true).await
    }

    async fn stat(&self, key: &str) -> Result<Entry> {
        let item = self.item(key).await?;
        if item.is_folder() {
            Ok(Entry::directory(key, item.last_modified_date_time))
        } else {
            Ok(Entry::file(
                trim_key(key),
                item.size,
                item.last_modified_date_time,
                Some(item.id),
            ))
        }
    }

    async fn read(&self, key: &str) -> Result<ObjectContent> {
        let (bytes, served_type) = self.client.download(key).await?;
        let content_type = served_type.unwrap_or_else(|| mime::content_type_for(key).to_string());
        Ok(ObjectContent {
            bytes,
            content_type,
        })
    }

    /// Anonymous share link; `None` when the drive refuses to create one.
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| Error::InvalidInput(format!("Link lifetime out of range: {:?}", ttl)))?;
        self.client.create_link(key, Utc::now() + ttl).await
    }

    /// The item's browser URL, which may require sign-in.
    async fn public_url(&self, key: &str) -> Result<Option<String>> {
        Ok(self.client.get_item(key).await?.and_then(|item| item.web_url))
    }

    async fn download_response(&self, key: &str) -> Result<Option<DownloadResponse>> {
        let item = self.item(key).await?;
        if let Some(url) = item.download_url {
            return Ok(Some(DownloadResponse::Redirect { url }));
        }
        if let Some(url) = self.presigned_url(key, self.presign_ttl).await? {
            return Ok(Some(DownloadResponse::Redirect { url }));
        }
        Ok(item.web_url.map(|url| DownloadResponse::Redirect { url }))
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        if trim_key(key).is_empty() || is_folder_key(key) {
            return Err(Error::InvalidInput(format!("Not a file key: {:?}", key)));
        }
        let content_type = content_type.unwrap_or_else(|| mime::content_type_for(key));
        info!(key = %key, size = data.len(), "Uploading file");
        self.client.upload(key, data, content_type).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        info!(key = %key, "Deleting item");
        if self.client.delete(key).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Object not found: {}", key)))
        }
    }

    /// Server-side copy; completes asynchronously on the drive.
    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let parent_id = self.parent_id(dst).await?;
        info!(from = %src, to = %dst, "Copying item");
        self.client.copy_item(src, &parent_id, file_name(dst)).await
    }

    /// Native move, no copy involved.
    async fn rename(&self, old_key: &str, new_key: &str) -> Result<()> {
        let parent_id = self.parent_id(new_key).await?;
        info!(from = %old_key, to = %new_key, "Moving item");
        self.client
            .move_item(old_key, &parent_id, file_name(new_key))
            .await
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        if trim_key(path).is_empty() {
            return Err(Error::InvalidInput("Folder path is empty".to_string()));
        }
        self.ensure_folder(path).await.map(|_| ())
    }

    fn presign_ttl(&self) -> Duration {
        self.presign_ttl
    }

    fn thumbnail_edge(&self) -> u32 {
        THUMBNAIL_EDGE
    }

    fn destination_mapping(&self) -> DestinationMapping {
        DestinationMapping::RelativeSlice
    }

    async fn delete_folder_node(&self, prefix: &str) -> Result<()> {
        if !self.client.delete(prefix).await? {
            debug!(prefix = %prefix, "Folder already gone");
        }
        Ok(())
    }

    /// The drive's own thumbnail when it has one, else the local pipeline.
    async fn thumbnail(&self, key: &str) -> Result<ThumbnailResponse> {
        match self.client.thumbnail_url(key).await {
            Ok(Some(url)) => match self.client.fetch(&url).await {
                Ok(bytes) => return Ok(ThumbnailResponse::Image(bytes)),
                Err(e) => warn!(key = %key, error = %e, "Drive thumbnail fetch failed"),
            },
            Ok(None) => debug!(key = %key, "Drive has no thumbnail"),
            Err(e) => debug!(key = %key, error = %e, "Drive thumbnail lookup failed"),
        }
        thumbnail::generate(self, key).await
    }
}
