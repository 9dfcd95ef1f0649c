//! Storage abstraction for cloudshelf.
//!
//! One hierarchical file interface over three remote systems: an
//! S3-compatible object store, a GitHub repository and a Microsoft Graph
//! cloud drive, plus an in-process store for development.
//!
//! # Design Principles
//! - Backend isolation: callers only see [`StorageBackend`]
//! - Folders are emulated where the remote system has none
//! - Multi-step operations are composed from per-item primitives and are
//!   never rolled back
//! - One error taxonomy across backends

pub mod backend;
pub mod cloud_drive;
pub mod config;
pub mod download;
pub mod factory;
pub mod folder;
mod http;
pub mod memory;
pub mod mime;
pub mod object_store;
pub mod repository;
pub mod thumbnail;

pub use backend::{Entry, ListResult, ObjectContent, StorageBackend, DEFAULT_PRESIGN_TTL};
pub use cloud_drive::{CloudDriveBackend, CloudDriveConfig, CredentialStatus};
pub use config::StorageConfig;
pub use download::DownloadResponse;
pub use factory::{global, init_global, Backend};
pub use folder::DestinationMapping;
pub use memory::MemoryBackend;
pub use object_store::{ObjectStoreBackend, ObjectStoreConfig};
pub use repository::{RepositoryBackend, RepositoryConfig};
pub use thumbnail::ThumbnailResponse;
