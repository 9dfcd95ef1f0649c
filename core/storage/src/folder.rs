//! Recursive folder operations built from per-item primitives.
//!
//! Each level is listed with [`StorageBackend::scan`], its files are handled
//! one by one and its subfolders are recursed into. The first failure aborts
//! the walk; whatever was already done stays done.

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use cloudshelf_common::{folder_prefix, replace_prefix, Error, Result};

use crate::backend::StorageBackend;

/// How a key under the source prefix becomes a key under the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationMapping {
    /// Replace the first occurrence of the source prefix in the key.
    ReplacePrefix,
    /// Append the part of the key after the source prefix to the destination.
    RelativeSlice,
}

impl DestinationMapping {
    /// Destination key for `key`, listed under `src`, when moving to `dst`.
    pub fn destination(&self, key: &str, src: &str, dst: &str) -> String {
        match self {
            Self::ReplacePrefix => replace_prefix(key, src, dst),
            Self::RelativeSlice => {
                format!("{}{}", dst, key.get(src.len()..).unwrap_or_default())
            }
        }
    }
}

/// Normalize a source/destination pair and refuse walks that cannot end.
pub(crate) fn folder_pair(src: &str, dst: &str) -> Result<(String, String)> {
    let src = folder_prefix(src);
    let dst = folder_prefix(dst);
    if src.is_empty() {
        return Err(Error::InvalidInput(
            "Refusing to operate on the storage root".to_string(),
        ));
    }
    if dst.starts_with(&src) {
        return Err(Error::InvalidInput(format!(
            "Destination {} lies inside source {}",
            dst, src
        )));
    }
    Ok((src, dst))
}

/// Delete every file under `prefix`, then every subfolder, recursively.
///
/// A prefix with nothing under it is a success.
pub fn delete_folder<'a, B>(backend: &'a B, prefix: &'a str) -> BoxFuture<'a, Result<()>>
where
    B: StorageBackend + ?Sized,
{
    async move {
        let prefix = folder_prefix(prefix);
        if prefix.is_empty() {
            return Err(Error::InvalidInput(
                "Refusing to delete the storage root".to_string(),
            ));
        }

        let listing = backend.scan(&prefix).await?;
        info!(
            prefix = %prefix,
            files = listing.entries.len(),
            folders = listing.prefixes.len(),
            "Deleting folder level"
        );

        for entry in &listing.entries {
            debug!(key = %entry.key, "Deleting");
            backend.delete(&entry.key).await?;
        }
        for sub in &listing.prefixes {
            delete_folder(backend, sub).await?;
        }

        backend.delete_folder_node(&prefix).await
    }
    .boxed()
}

/// Copy every file under `src` to the matching key under `dst`.
pub fn copy_folder<'a, B>(backend: &'a B, src: &'a str, dst: &'a str) -> BoxFuture<'a, Result<()>>
where
    B: StorageBackend + ?Sized,
{
    async move {
        let (src, dst) = folder_pair(src, dst)?;
        let mapping = backend.destination_mapping();

        backend.create_folder(&dst).await?;
        let listing = backend.scan(&src).await?;
        info!(src = %src, dst = %dst, files = listing.entries.len(), "Copying folder level");

        for entry in &listing.entries {
            let target = mapping.destination(&entry.key, &src, &dst);
            debug!(from = %entry.key, to = %target, "Copying");
            backend.copy(&entry.key, &target).await?;
        }
        for sub in &listing.prefixes {
            let target = mapping.destination(sub, &src, &dst);
            copy_folder(backend, sub, &target).await?;
        }
        Ok(())
    }
    .boxed()
}

/// Move every file under `src` to the matching key under `dst`, one item at
/// a time, then drop the emptied source folders.
pub fn rename_folder<'a, B>(
    backend: &'a B,
    src: &'a str,
    dst: &'a str,
) -> BoxFuture<'a, Result<()>>
where
    B: StorageBackend + ?Sized,
{
    async move {
        let (src, dst) = folder_pair(src, dst)?;
        let mapping = backend.destination_mapping();

        backend.create_folder(&dst).await?;
        let listing = backend.scan(&src).await?;
        info!(src = %src, dst = %dst, files = listing.entries.len(), "Moving folder level");

        for entry in &listing.entries {
            let target = mapping.destination(&entry.key, &src, &dst);
            debug!(from = %entry.key, to = %target, "Moving");
            backend.rename(&entry.key, &target).await?;
        }
        for sub in &listing.prefixes {
            let target = mapping.destination(sub, &src, &dst);
            rename_folder(backend, sub, &target).await?;
        }

        backend.delete_folder_node(&src).await
    }
    .boxed()
}
