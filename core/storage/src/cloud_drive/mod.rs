//! Cloud drive backend (Microsoft Graph / OneDrive).
//!
//! - `auth`: refresh-token exchange and the credential state machine
//! - `client`: Graph API calls with one refresh-and-retry on 401
//! - `provider`: the [`StorageBackend`](crate::StorageBackend) implementation

mod auth;
mod client;
mod provider;

pub use auth::{
    scope_candidates, AuthConfig, CredentialStatus, OAuthExchange, RefreshOutcome, TokenExchange,
    TokenGrant, TokenManager, Tokens, FALLBACK_SCOPE, MICROSOFT_TOKEN_URL,
};
pub use client::{DriveItem, GraphClient, RootItem, GRAPH_API_BASE};
pub use provider::{CloudDriveBackend, CloudDriveConfig, THUMBNAIL_EDGE};
