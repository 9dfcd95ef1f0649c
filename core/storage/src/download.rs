//! Normalized download responses.

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;

use cloudshelf_common::file_name;

/// RFC 5987 `attr-char` complement: everything but unreserved characters.
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Cache policy for relayed content.
pub const RELAY_CACHE_CONTROL: &str = "public, max-age=86400";

/// How a client should obtain an object.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadResponse {
    /// Send the client to a URL that serves the bytes.
    Redirect { url: String },
    /// Serve these bytes directly with the given headers.
    Content {
        bytes: Bytes,
        headers: BTreeMap<String, String>,
        mimetype: String,
    },
}

impl DownloadResponse {
    /// Relay content as an attachment named after the key.
    pub fn relay(key: &str, bytes: Bytes, mimetype: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), mimetype.to_string());
        headers.insert("Content-Disposition".to_string(), content_disposition(key));
        headers.insert(
            "Cache-Control".to_string(),
            RELAY_CACHE_CONTROL.to_string(),
        );
        Self::Content {
            bytes,
            headers,
            mimetype: mimetype.to_string(),
        }
    }

    /// Redirect target, if this is a redirect.
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Self::Redirect { url } => Some(url),
            Self::Content { .. } => None,
        }
    }

    /// Header value, if this is relayed content.
    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            Self::Redirect { .. } => None,
            Self::Content { headers, .. } => headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
        }
    }
}

/// `attachment` disposition carrying both a plain and an RFC 5987 filename.
pub fn content_disposition(key: &str) -> String {
    let name = file_name(key);
    let plain: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || !c.is_ascii() { '_' } else { c })
        .collect();
    let encoded = utf8_percent_encode(name, FILENAME_ESCAPE);
    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", plain, encoded)
}
