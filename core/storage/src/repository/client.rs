//! GitHub REST API client for the contents and commits endpoints.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use cloudshelf_common::{encode_path, trim_key, Error, Result, Secret};

use crate::http;

/// GitHub API base URL.
pub const GITHUB_API_BASE: &str = "https://api.github.com";
/// Raw content base URL.
pub const GITHUB_RAW_BASE: &str = "https://raw.githubusercontent.com";

const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of a contents listing (or a single file lookup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Base name.
    pub name: String,
    /// Path from the repository root.
    pub path: String,
    /// Blob SHA, required for updates and deletes.
    pub sha: String,
    /// Size in bytes (0 for directories).
    #[serde(default)]
    pub size: u64,
    /// `file`, `dir`, `symlink` or `submodule`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl ContentItem {
    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// The contents endpoint answers with an array for directories and an
/// object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Listing(Vec<ContentItem>),
    Single(ContentItem),
}

#[derive(Debug, Deserialize)]
struct CommitSummary {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    author: Option<Signature>,
    #[serde(default)]
    committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: DateTime<Utc>,
}

/// Body of a create/update/delete request on the contents endpoint.
#[derive(Debug, Serialize)]
struct ContentsWrite<'a> {
    message: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// GitHub API client bound to one repository and branch.
pub struct GitHubClient {
    http: Client,
    token: Secret,
    owner: String,
    repo: String,
    branch: String,
    api_base: String,
    raw_base: String,
}

impl GitHubClient {
    /// Create a client for `owner/repo` on `branch`.
    pub fn new(
        token: Secret,
        owner: &str,
        repo: &str,
        branch: &str,
        api_base: Option<&str>,
        raw_base: Option<&str>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("cloudshelf/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            api_base: api_base
                .unwrap_or(GITHUB_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            raw_base: raw_base
                .unwrap_or(GITHUB_RAW_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo)
    }

    fn contents_url(&self, path: &str) -> String {
        let path = encode_path(path);
        if path.is_empty() {
            format!("{}/contents", self.repo_url())
        } else {
            format!("{}/contents/{}", self.repo_url(), path)
        }
    }

    /// Direct URL of the file content on the branch.
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base,
            self.owner,
            self.repo,
            self.branch,
            encode_path(path)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(header::AUTHORIZATION, format!("token {}", self.token.expose()))
            .header(header::ACCEPT, ACCEPT_V3)
    }

    /// Contents at `path` on the branch, `None` if nothing lives there.
    pub async fn contents(&self, path: &str) -> Result<Option<Contents>> {
        let context = format!("contents of {:?}", trim_key(path));
        debug!(path = %path, "Fetching repository contents");

        let response = self
            .authorized(self.http.get(self.contents_url(path)))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| http::transport(&context, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        http::json(&context, response).await.map(Some)
    }

    /// Current blob SHA of the file at `path`.
    pub async fn file_sha(&self, path: &str) -> Result<Option<String>> {
        match self.contents(path).await? {
            Some(Contents::Single(item)) if item.is_file() => Ok(Some(item.sha)),
            _ => Ok(None),
        }
    }

    /// Author date of the latest commit touching `path` on the branch.
    pub async fn last_commit_time(&self, path: &str) -> Result<Option<DateTime<Utc>>> {
        let context = format!("commits for {:?}", path);
        let response = self
            .authorized(self.http.get(format!("{}/commits", self.repo_url())))
            .query(&[
                ("path", path),
                ("sha", self.branch.as_str()),
                ("per_page", "1"),
            ])
            .send()
            .await
            .map_err(|e| http::transport(&context, e))?;

        let commits: Vec<CommitSummary> = http::json(&context, response).await?;
        Ok(commits.into_iter().next().and_then(|c| {
            c.commit
                .author
                .or(c.commit.committer)
                .map(|signature| signature.date)
        }))
    }

    /// Create or replace the file at `path`.
    ///
    /// `sha` must be the current blob SHA when the file already exists.
    pub async fn put_file(&self, path: &str, data: &[u8], sha: Option<&str>) -> Result<()> {
        let context = format!("write of {:?}", path);
        let body = ContentsWrite {
            message: format!("Upload {}", path),
            branch: &self.branch,
            content: Some(STANDARD.encode(data)),
            sha,
        };

        let response = self
            .authorized(self.http.put(self.contents_url(path)))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(&context, e))?;

        Self::expect_write(&context, response).await
    }

    /// Delete the file at `path`, which must currently have blob `sha`.
    pub async fn delete_file(&self, path: &str, sha: &str) -> Result<()> {
        let context = format!("delete of {:?}", path);
        let body = ContentsWrite {
            message: format!("Delete {}", path),
            branch: &self.branch,
            content: None,
            sha: Some(sha),
        };

        let response = self
            .authorized(self.http.delete(self.contents_url(path)))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(&context, e))?;

        Self::expect_write(&context, response).await
    }

    async fn expect_write(context: &str, response: reqwest::Response) -> Result<()> {
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => Err(Error::OperationFailed(
                format!("{}: rejected by the repository ({})", context, response.status()),
            )),
            _ => Err(http::status_error(context, response).await),
        }
    }

    /// Raw file bytes and the content type the server reported.
    pub async fn raw(&self, path: &str) -> Result<(Bytes, Option<String>)> {
        let context = format!("raw content of {:?}", path);
        let response = self
            .http
            .get(self.raw_url(path))
            .header(header::AUTHORIZATION, format!("token {}", self.token.expose()))
            .send()
            .await
            .map_err(|e| http::transport(&context, e))?;

        if !response.status().is_success() {
            return Err(http::status_error(&context, response).await);
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| http::transport(&context, e))?;
        Ok((bytes, content_type))
    }

    /// Repository metadata lookup, used as a connectivity check.
    pub async fn check_repository(&self) -> Result<()> {
        let context = format!("repository {}/{}", self.owner, self.repo);
        let response = self
            .authorized(self.http.get(self.repo_url()))
            .send()
            .await
            .map_err(|e| http::transport(&context, e))?;

        if !response.status().is_success() {
            return Err(http::status_error(&context, response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubClient {
        GitHubClient::new(Secret::new("t"), "octo", "files", "main", None, None).unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.contents_url("docs/my file.txt"),
            "https://api.github.com/repos/octo/files/contents/docs/my%20file.txt"
        );
        assert_eq!(
            client.contents_url(""),
            "https://api.github.com/repos/octo/files/contents"
        );
        assert_eq!(
            client.raw_url("docs/a.png"),
            "https://raw.githubusercontent.com/octo/files/main/docs/a.png"
        );
    }

    #[test]
    fn test_contents_shapes() {
        let listing: Contents = serde_json::from_value(serde_json::json!([
            {"name": "a.txt", "path": "d/a.txt", "sha": "1", "size": 3, "type": "file"},
            {"name": "s", "path": "d/s", "sha": "2", "type": "dir"}
        ]))
        .unwrap();
        match listing {
            Contents::Listing(items) => {
                assert!(items[0].is_file());
                assert!(items[1].is_dir());
                assert_eq!(items[1].size, 0);
            }
            Contents::Single(_) => panic!("expected listing"),
        }

        let single: Contents = serde_json::from_value(serde_json::json!(
            {"name": "a.txt", "path": "d/a.txt", "sha": "1", "size": 3, "type": "file", "content": "YWJj"}
        ))
        .unwrap();
        assert!(matches!(single, Contents::Single(item) if item.sha == "1"));
    }

    #[test]
    fn test_write_body_omits_absent_sha() {
        let body = ContentsWrite {
            message: "Upload a".to_string(),
            branch: "main",
            content: Some("YQ==".to_string()),
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
        assert_eq!(json["branch"], "main");
    }
}
