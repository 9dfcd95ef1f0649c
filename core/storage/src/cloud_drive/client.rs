//! Microsoft Graph drive API client.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use cloudshelf_common::{encode_path, Error, Result};

use super::auth::TokenManager;
use crate::http;

/// Graph API base URL.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);
const LINK_TIMEOUT: Duration = Duration::from_secs(15);

const CHILD_FIELDS: &str = "name,size,lastModifiedDateTime,id,folder,file";

/// Drive item metadata from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    /// Item id.
    pub id: String,
    /// Item name.
    #[serde(default)]
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Modified time.
    #[serde(default)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
    /// Present on folders.
    #[serde(default)]
    pub folder: Option<serde_json::Value>,
    /// Browser URL, may require sign-in.
    #[serde(default)]
    pub web_url: Option<String>,
    /// Short-lived pre-authenticated content URL.
    #[serde(default, rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
}

impl DriveItem {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct ItemPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(default, rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ThumbnailSet {
    #[serde(default)]
    small: Option<Thumbnail>,
    #[serde(default)]
    medium: Option<Thumbnail>,
    #[serde(default)]
    large: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailPage {
    #[serde(default)]
    value: Vec<ThumbnailSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharingLink {
    #[serde(default)]
    web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Permission {
    #[serde(default)]
    link: Option<SharingLink>,
}

#[derive(Debug, Deserialize)]
struct Drive {
    id: String,
}

/// The item every key is resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootItem {
    /// The root of the signed-in user's drive.
    DriveRoot,
    /// A folder, by item id.
    Folder(String),
}

/// Graph API client.
pub struct GraphClient {
    http: Client,
    tokens: Arc<TokenManager>,
    api_base: String,
    root: RootItem,
    root_id: OnceCell<String>,
}

impl GraphClient {
    /// Create a new Graph client.
    pub fn new(tokens: Arc<TokenManager>, api_base: Option<&str>, root: RootItem) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("cloudshelf/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            tokens,
            api_base: api_base
                .unwrap_or(GRAPH_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            root,
            root_id: OnceCell::new(),
        })
    }

    /// Path-addressed item URL for `key`, with an optional action suffix.
    ///
    /// `a/b.txt` under the drive root becomes `/me/drive/root:/a/b.txt:`.
    pub fn item_url(&self, key: &str, action: Option<&str>) -> String {
        let path = encode_path(key);
        let base = match (&self.root, path.is_empty()) {
            (RootItem::DriveRoot, true) => format!("{}/me/drive/root", self.api_base),
            (RootItem::Folder(id), true) => format!("{}/me/drive/items/{}", self.api_base, id),
            (RootItem::DriveRoot, false) => format!("{}/me/drive/root:/{}:", self.api_base, path),
            (RootItem::Folder(id), false) => {
                format!("{}/me/drive/items/{}:/{}:", self.api_base, id, path)
            }
        };
        match action {
            Some(action) => format!("{}/{}", base, action),
            None => base,
        }
    }

    fn child_url(&self, parent_id: &str, name: &str) -> String {
        format!(
            "{}/me/drive/items/{}:/{}:",
            self.api_base,
            parent_id,
            encode_path(name)
        )
    }

    /// Send an authorized request, refreshing the token and retrying once
    /// when the API answers 401.
    ///
    /// `build` is called once per attempt.
    pub async fn send<F>(&self, context: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.tokens.access_token().await?;
        let response = build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| http::transport(context, e))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(context = %context, "Graph API answered 401, refreshing token once");
        let token = self.tokens.refresh_after(&token).await?;
        let response = build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| http::transport(context, e))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::BackendUnavailable(format!(
                "{}: unauthorized after token refresh",
                context
            )));
        }
        Ok(response)
    }

    /// Id of the configured root item, fetched once for the drive root.
    pub async fn root_item_id(&self) -> Result<String> {
        let id = self
            .root_id
            .get_or_try_init(|| async {
                match &self.root {
                    RootItem::Folder(id) => Ok::<_, Error>(id.clone()),
                    RootItem::DriveRoot => {
                        let url = format!("{}/me/drive/root", self.api_base);
                        let response = self
                            .send("drive root", |http| http.get(&url).query(&[("$select", "id")]))
                            .await?;
                        let item: DriveItem = http::json("drive root", response).await?;
                        Ok(item.id)
                    }
                }
            })
            .await?;
        Ok(id.clone())
    }

    /// Item metadata for `key`, `None` if nothing lives there.
    pub async fn get_item(&self, key: &str) -> Result<Option<DriveItem>> {
        let url = self.item_url(key, None);
        debug!(key = %key, "Fetching drive item");
        let response = self.send(key, |http| http.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        http::json(key, response).await.map(Some)
    }

    /// Every child of the folder at `prefix`, following pagination.
    /// `None` if the folder does not exist.
    pub async fn list_children(&self, prefix: &str) -> Result<Option<Vec<DriveItem>>> {
        let mut items = Vec::new();
        let mut url = self.item_url(prefix, Some("children"));
        let mut first = true;

        loop {
            let response = self
                .send(prefix, |http| {
                    let request = http.get(&url);
                    if first {
                        request.query(&[("$select", CHILD_FIELDS)])
                    } else {
                        request
                    }
                })
                .await?;
            if first && response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            let page: ItemPage = http::json(prefix, response).await?;
            items.extend(page.value);

            match page.next_link {
                Some(next) => {
                    url = next;
                    first = false;
                }
                None => break,
            }
        }

        debug!(prefix = %prefix, count = items.len(), "Listed drive folder");
        Ok(Some(items))
    }

    /// Child of `parent_id` named `name`, `None` if absent.
    pub async fn child(&self, parent_id: &str, name: &str) -> Result<Option<DriveItem>> {
        let url = self.child_url(parent_id, name);
        let response = self.send(name, |http| http.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        http::json(name, response).await.map(Some)
    }

    /// Create folder `name` under `parent_id`.
    pub async fn create_child_folder(&self, parent_id: &str, name: &str) -> Result<DriveItem> {
        let url = format!("{}/me/drive/items/{}/children", self.api_base, parent_id);
        let body = json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail"
        });
        let response = self.send(name, |http| http.post(&url).json(&body)).await?;
        http::json(name, response).await
    }

    /// Raw content of `key` and the served content type.
    pub async fn download(&self, key: &str) -> Result<(Bytes, Option<String>)> {
        let url = self.item_url(key, Some("content"));
        let response = self.send(key, |http| http.get(&url)).await?;
        if !response.status().is_success() {
            return Err(http::status_error(key, response).await);
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| http::transport(key, e))?;
        Ok((bytes, content_type))
    }

    /// Create or replace the file at `key`.
    pub async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<DriveItem> {
        let url = self.item_url(key, Some("content"));
        let response = self
            .send(key, |http| {
                http.put(&url)
                    .header(header::CONTENT_TYPE, content_type)
                    .body(data.clone())
            })
            .await?;
        http::json(key, response).await
    }

    /// Delete the item at `key`. Returns false if it did not exist.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let url = self.item_url(key, None);
        let response = self.send(key, |http| http.delete(&url)).await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(http::status_error(key, response).await),
        }
    }

    /// Start a server-side copy of `key` into `parent_id` as `name`.
    ///
    /// The drive accepts the copy and completes it later; acceptance is
    /// success and the job is not polled.
    pub async fn copy_item(&self, key: &str, parent_id: &str, name: &str) -> Result<()> {
        let url = self.item_url(key, Some("copy"));
        let body = json!({
            "parentReference": { "id": parent_id },
            "name": name
        });
        let response = self.send(key, |http| http.post(&url).json(&body)).await?;
        match response.status() {
            StatusCode::ACCEPTED | StatusCode::OK => Ok(()),
            _ => Err(http::status_error(key, response).await),
        }
    }

    /// Move `key` into `parent_id` under `name`.
    pub async fn move_item(&self, key: &str, parent_id: &str, name: &str) -> Result<()> {
        let url = self.item_url(key, None);
        let body = json!({
            "parentReference": { "id": parent_id },
            "name": name
        });
        let response = self.send(key, |http| http.patch(&url).json(&body)).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(Error::OperationFailed(format!(
                "{}: destination already exists",
                key
            ))),
            _ => Err(http::status_error(key, response).await),
        }
    }

    /// Anonymous view link for `key` expiring at `expires_at`, marked for
    /// download.
    pub async fn create_link(&self, key: &str, expires_at: DateTime<Utc>) -> Result<Option<String>> {
        let url = self.item_url(key, Some("createLink"));
        let body = json!({
            "type": "view",
            "scope": "anonymous",
            "expirationDateTime": expires_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        });
        let response = self
            .send(key, |http| http.post(&url).json(&body).timeout(LINK_TIMEOUT))
            .await?;
        if !response.status().is_success() {
            debug!(key = %key, status = %response.status(), "Share link not available");
            return Ok(None);
        }

        let permission: Permission = http::json(key, response).await?;
        Ok(permission
            .link
            .and_then(|link| link.web_url)
            .map(|web_url| {
                let separator = if web_url.contains('?') { '&' } else { '?' };
                format!("{}{}download=1", web_url, separator)
            }))
    }

    /// URL of the drive's own thumbnail for `key` (medium, else any size).
    pub async fn thumbnail_url(&self, key: &str) -> Result<Option<String>> {
        let url = self.item_url(key, Some("thumbnails"));
        let response = self.send(key, |http| http.get(&url)).await?;
        let page: ThumbnailPage = http::json(key, response).await?;
        Ok(page.value.into_iter().next().and_then(|set| {
            set.medium
                .or(set.large)
                .or(set.small)
                .map(|thumbnail| thumbnail.url)
        }))
    }

    /// Fetch a pre-authenticated URL handed out by the API.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| http::transport("thumbnail", e))?;
        if !response.status().is_success() {
            return Err(http::status_error("thumbnail", response).await);
        }
        response
            .bytes()
            .await
            .map_err(|e| http::transport("thumbnail", e))
    }

    /// Drive metadata lookup, used as a connectivity check.
    pub async fn check_drive(&self) -> Result<()> {
        let url = format!("{}/me/drive", self.api_base);
        let response = self
            .send("drive", |http| http.get(&url).timeout(VERIFY_TIMEOUT))
            .await?;
        let drive: Drive = http::json("drive", response).await?;
        debug!(drive = %drive.id, "Drive reachable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_drive::auth::{RefreshOutcome, TokenExchange};
    use async_trait::async_trait;
    use cloudshelf_common::Secret;

    struct NoExchange;

    #[async_trait]
    impl TokenExchange for NoExchange {
        async fn refresh(&self, _refresh_token: &str, _scope: Option<&str>) -> RefreshOutcome {
            RefreshOutcome::Rejected("unused".to_string())
        }
    }

    fn client(root: RootItem) -> GraphClient {
        let tokens = Arc::new(TokenManager::new(Box::new(NoExchange), Secret::new("r"), None));
        GraphClient::new(tokens, None, root).unwrap()
    }

    #[test]
    fn test_item_url_drive_root() {
        let client = client(RootItem::DriveRoot);
        assert_eq!(
            client.item_url("docs/my file.txt", None),
            "https://graph.microsoft.com/v1.0/me/drive/root:/docs/my%20file.txt:"
        );
        assert_eq!(
            client.item_url("/docs/", Some("children")),
            "https://graph.microsoft.com/v1.0/me/drive/root:/docs:/children"
        );
        assert_eq!(
            client.item_url("", Some("children")),
            "https://graph.microsoft.com/v1.0/me/drive/root/children"
        );
    }

    #[test]
    fn test_item_url_folder_root() {
        let client = client(RootItem::Folder("ABC!123".to_string()));
        assert_eq!(
            client.item_url("a/b.png", Some("thumbnails")),
            "https://graph.microsoft.com/v1.0/me/drive/items/ABC!123:/a/b.png:/thumbnails"
        );
        assert_eq!(
            client.item_url("", None),
            "https://graph.microsoft.com/v1.0/me/drive/items/ABC!123"
        );
    }

    #[test]
    fn test_drive_item_is_folder() {
        let folder: DriveItem = serde_json::from_value(json!({
            "id": "1", "name": "img", "folder": {"childCount": 2}
        }))
        .unwrap();
        assert!(folder.is_folder());

        let file: DriveItem = serde_json::from_value(json!({
            "id": "2",
            "name": "a.txt",
            "size": 10,
            "file": {"mimeType": "text/plain"},
            "lastModifiedDateTime": "2025-11-08T10:55:26Z",
            "@microsoft.graph.downloadUrl": "https://dl.example/a"
        }))
        .unwrap();
        assert!(!file.is_folder());
        assert_eq!(file.size, Some(10));
        assert_eq!(file.download_url.as_deref(), Some("https://dl.example/a"));
    }

    #[tokio::test]
    async fn test_root_item_id_for_folder_needs_no_request() {
        let client = client(RootItem::Folder("F1".to_string()));
        assert_eq!(client.root_item_id().await.unwrap(), "F1");
    }
}
