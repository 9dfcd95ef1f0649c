//! Backend selection and configuration.
//!
//! The backend is chosen once at startup, either from a JSON value or from
//! the process environment, and validated before anything is constructed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cloudshelf_common::{Error, Result};

use crate::backend::default_presign_ttl_secs;
use crate::cloud_drive::CloudDriveConfig;
use crate::object_store::ObjectStoreConfig;
use crate::repository::RepositoryConfig;

/// Supported `storage_type` values.
pub const STORAGE_TYPES: &[&str] = &["r2", "github", "onedrive", "memory"];

const R2_REQUIRED: &[&str] = &[
    "R2_ACCOUNT_ID",
    "R2_ACCESS_KEY_ID",
    "R2_SECRET_ACCESS_KEY",
    "R2_BUCKET_NAME",
];
const GITHUB_REQUIRED: &[&str] = &["GITHUB_TOKEN", "GITHUB_REPO"];
const ONEDRIVE_REQUIRED: &[&str] = &[
    "ONEDRIVE_REFRESH_TOKEN",
    "ONEDRIVE_CLIENT_ID",
    "ONEDRIVE_CLIENT_SECRET",
];

/// Configuration of the selected backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "storage_type")]
pub enum StorageConfig {
    /// S3-compatible object store (Cloudflare R2).
    #[serde(rename = "r2")]
    ObjectStore(ObjectStoreConfig),
    /// GitHub repository.
    #[serde(rename = "github")]
    Repository(RepositoryConfig),
    /// Microsoft Graph cloud drive (OneDrive).
    #[serde(rename = "onedrive")]
    CloudDrive(CloudDriveConfig),
    /// In-process store.
    #[serde(rename = "memory")]
    Memory,
}

impl StorageConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration from any name lookup (the environment, a
    /// dotenv map, a test fixture).
    ///
    /// # Errors
    /// - `InvalidConfiguration` naming every missing variable, an unknown
    ///   `STORAGE_TYPE` or an unparsable `PRESIGNED_URL_EXPIRES`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let storage_type = get("STORAGE_TYPE")
            .map(|value| value.to_lowercase())
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "STORAGE_TYPE is not set. Supported types: {}",
                    STORAGE_TYPES.join(", ")
                ))
            })?;

        let presign_ttl_secs = match get("PRESIGNED_URL_EXPIRES") {
            Some(value) => value.parse().map_err(|_| {
                Error::InvalidConfiguration(format!(
                    "PRESIGNED_URL_EXPIRES must be a number of seconds, got: {}",
                    value
                ))
            })?,
            None => default_presign_ttl_secs(),
        };

        let require = |label: &str, names: &[&str]| -> Result<()> {
            let missing: Vec<&str> = names
                .iter()
                .copied()
                .filter(|name| get(*name).is_none())
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(Error::InvalidConfiguration(format!(
                    "Missing required {} configuration: {}",
                    label,
                    missing.join(", ")
                )))
            }
        };
        let value = |name: &str| get(name).unwrap_or_default();

        let config = match storage_type.as_str() {
            "r2" => {
                require("R2", R2_REQUIRED)?;
                Self::ObjectStore(ObjectStoreConfig {
                    account_id: value("R2_ACCOUNT_ID"),
                    access_key_id: value("R2_ACCESS_KEY_ID"),
                    secret_access_key: value("R2_SECRET_ACCESS_KEY").into(),
                    bucket_name: value("R2_BUCKET_NAME"),
                    public_domain: get("R2_PUBLIC_DOMAIN"),
                    endpoint: None,
                    region: "auto".to_string(),
                    presign_ttl_secs,
                })
            }
            "github" => {
                require("GitHub", GITHUB_REQUIRED)?;
                Self::Repository(RepositoryConfig {
                    token: value("GITHUB_TOKEN").into(),
                    repo: value("GITHUB_REPO"),
                    branch: get("GITHUB_BRANCH").unwrap_or_else(|| "main".to_string()),
                    api_base: None,
                    raw_base: None,
                })
            }
            "onedrive" => {
                require("OneDrive", ONEDRIVE_REQUIRED)?;
                Self::CloudDrive(CloudDriveConfig {
                    client_id: value("ONEDRIVE_CLIENT_ID"),
                    client_secret: value("ONEDRIVE_CLIENT_SECRET").into(),
                    refresh_token: value("ONEDRIVE_REFRESH_TOKEN").into(),
                    folder_id: get("ONEDRIVE_FOLDER_ID"),
                    redirect_uri: get("ONEDRIVE_REDIRECT_URI"),
                    scopes: get("ONEDRIVE_SCOPES"),
                    api_base: None,
                    token_url: None,
                    presign_ttl_secs,
                })
            }
            "memory" => Self::Memory,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "Unsupported storage type: {}. Supported types: {}",
                    other,
                    STORAGE_TYPES.join(", ")
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::InvalidConfiguration(format!("Storage configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// The `storage_type` tag of this configuration.
    pub fn storage_type(&self) -> &'static str {
        match self {
            Self::ObjectStore(_) => "r2",
            Self::Repository(_) => "github",
            Self::CloudDrive(_) => "onedrive",
            Self::Memory => "memory",
        }
    }

    /// Check that every required value of the selected backend is present.
    pub fn validate(&self) -> Result<()> {
        let (label, missing, presign_ttl_secs) = match self {
            Self::ObjectStore(config) => ("R2", config.missing_fields(), Some(config.presign_ttl_secs)),
            Self::Repository(config) => {
                let missing = config.missing_fields();
                if missing.is_empty() {
                    config.owner_and_name()?;
                }
                ("GitHub", missing, None)
            }
            Self::CloudDrive(config) => (
                "OneDrive",
                config.missing_fields(),
                Some(config.presign_ttl_secs),
            ),
            Self::Memory => return Ok(()),
        };

        if !missing.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "Missing required {} configuration: {}",
                label,
                missing.join(", ")
            )));
        }
        if presign_ttl_secs == Some(0) {
            return Err(Error::InvalidConfiguration(
                "Presigned URL lifetime must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
