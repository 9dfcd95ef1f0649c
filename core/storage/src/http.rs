//! Response handling shared by the HTTP backends.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use cloudshelf_common::{Error, Result};

/// Error bodies are cut to this many characters before landing in messages.
const BODY_EXCERPT: usize = 300;

/// Map a transport failure.
pub(crate) fn transport(context: &str, err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    Error::BackendUnavailable(format!("{}: {} ({})", context, kind, err.without_url()))
}

/// Map a non-success status to the error taxonomy.
pub(crate) async fn status_error(context: &str, response: Response) -> Error {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Error::NotFound(context.to_string());
    }
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(BODY_EXCERPT).collect();
    Error::BackendUnavailable(format!("{}: {} - {}", context, status, excerpt))
}

/// Parse a JSON body from a successful response, mapping failures.
pub(crate) async fn json<T: DeserializeOwned>(context: &str, response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(status_error(context, response).await);
    }
    response
        .json()
        .await
        .map_err(|e| Error::BackendUnavailable(format!("{}: unreadable response ({})", context, e)))
}
