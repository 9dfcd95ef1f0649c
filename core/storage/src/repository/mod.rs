//! GitHub repository storage backend.
//!
//! Files are blobs on a branch, read through the raw content host and
//! written as commits through the contents API.

mod client;
mod provider;

pub use client::{ContentItem, Contents, GitHubClient};
pub use provider::{RepositoryBackend, RepositoryConfig, KEEP_MARKER, THUMBNAIL_EDGE};
