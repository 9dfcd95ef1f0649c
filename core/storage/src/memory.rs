//! In-memory storage backend for testing and development.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use cloudshelf_common::{folder_prefix, is_folder_key, trim_key, Error, Result};

use crate::backend::{Entry, ListResult, ObjectContent, StorageBackend};
use crate::mime;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    modified: DateTime<Utc>,
    etag: String,
}

/// In-memory storage backend.
///
/// A flat key store with object-store folder semantics: folders exist as
/// zero-length marker keys ending in `/` or implicitly through the keys
/// below them. All data is lost on drop.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored key, markers included, in lexical order.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    fn entry(key: &str, object: &StoredObject) -> Entry {
        if is_folder_key(key) {
            return Entry::directory(key, Some(object.modified));
        }
        Entry::file(
            key,
            Some(object.data.len() as u64),
            Some(object.modified),
            Some(object.etag.clone()),
        )
    }

    fn check_file_key(key: &str) -> Result<()> {
        if trim_key(key).is_empty() || is_folder_key(key) {
            return Err(Error::InvalidInput(format!("Not a file key: {:?}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list(&self, prefix: &str) -> Result<ListResult> {
        let prefix = folder_prefix(prefix);
        let objects = self.objects.read().await;

        let mut result = ListResult::default();
        let mut prefixes = BTreeSet::new();

        for (key, object) in objects.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(prefix.as_str()) else {
                break;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(idx) => {
                    prefixes.insert(format!("{}{}", prefix, &rest[..=idx]));
                }
                None => result.entries.push(Self::entry(key, object)),
            }
        }

        result.prefixes = prefixes.into_iter().collect();
        Ok(result)
    }

    async fn stat(&self, key: &str) -> Result<Entry> {
        let objects = self.objects.read().await;
        if let Some(object) = objects.get(key) {
            return Ok(Self::entry(key, object));
        }

        // A folder without a marker still exists while keys live below it.
        let prefix = folder_prefix(key);
        let has_children = objects
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix));
        if !prefix.is_empty() && has_children {
            return Ok(Entry::directory(&prefix, None));
        }

        Err(Error::NotFound(format!("Object not found: {}", key)))
    }

    async fn read(&self, key: &str) -> Result<ObjectContent> {
        Self::check_file_key(key)?;
        let objects = self.objects.read().await;
        match objects.get(key) {
            Some(object) => Ok(ObjectContent {
                bytes: object.data.clone(),
                content_type: object.content_type.clone(),
            }),
            None => Err(Error::NotFound(format!("Object not found: {}", key))),
        }
    }

    async fn presigned_url(&self, _key: &str, _ttl: Duration) -> Result<Option<String>> {
        Ok(None)
    }

    async fn public_url(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        Self::check_file_key(key)?;
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| mime::content_type_for(key).to_string());

        debug!(key = %key, size = data.len(), "Storing object in memory");
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type,
                modified: Utc::now(),
                etag: Uuid::new_v4().to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        Self::check_file_key(dst)?;
        let mut objects = self.objects.write().await;
        let source = objects
            .get(src)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", src)))?;

        objects.insert(
            dst.to_string(),
            StoredObject {
                modified: Utc::now(),
                etag: Uuid::new_v4().to_string(),
                ..source
            },
        );
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let prefix = folder_prefix(path);
        if prefix.is_empty() {
            return Err(Error::InvalidInput("Folder path is empty".to_string()));
        }

        let mut objects = self.objects.write().await;
        objects.entry(prefix).or_insert_with(|| StoredObject {
            data: Bytes::new(),
            content_type: mime::DEFAULT_CONTENT_TYPE.to_string(),
            modified: Utc::now(),
            etag: Uuid::new_v4().to_string(),
        });
        Ok(())
    }

    async fn delete_folder_node(&self, prefix: &str) -> Result<()> {
        self.objects.write().await.remove(&folder_prefix(prefix));
        Ok(())
    }
}
