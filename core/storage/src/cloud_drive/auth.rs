//! OAuth2 refresh-token handling for the cloud drive.
//!
//! The credential starts from a long-lived refresh token. Every refresh
//! walks an ordered list of scope candidates until one yields an access
//! token; a candidate the provider rejects falls through to the next one,
//! and exhausting the list leaves the credential unrecoverable for the
//! lifetime of the process. Server errors from the token endpoint are
//! transient and leave the credential as it was.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::{
    AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpRequest,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use cloudshelf_common::{Error, Result, Secret};

/// Microsoft identity platform token endpoint.
pub const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Scope tried last when everything before it was rejected.
pub const FALLBACK_SCOPE: &str = "Files.ReadWrite.All offline_access";

const REFRESH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);
const DEFAULT_EXPIRES_IN: std::time::Duration = std::time::Duration::from_secs(3600);

/// OAuth2 tokens with expiration tracking.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: String,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: String,
    /// When the access token expires.
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at < Utc::now() + Duration::minutes(5)
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A successful refresh response.
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: Option<std::time::Duration>,
}

/// Result of one refresh attempt with one scope candidate.
pub enum RefreshOutcome {
    /// The provider issued tokens.
    Granted(TokenGrant),
    /// The provider rejected this candidate; the next one may succeed.
    Rejected(String),
    /// Stop trying. The error decides whether the credential survives.
    Fatal(Error),
}

/// One refresh-token exchange against the provider.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange `refresh_token` for new tokens, requesting `scope` if given.
    async fn refresh(&self, refresh_token: &str, scope: Option<&str>) -> RefreshOutcome;
}

/// Configuration for the OAuth2 token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: Secret,
    /// Redirect URI registered with the application, sent on refresh.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Token endpoint override.
    #[serde(default)]
    pub token_url: Option<String>,
}

type RefreshClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// [`TokenExchange`] over the `oauth2` crate.
pub struct OAuthExchange {
    client: RefreshClient,
    http: oauth2::reqwest::Client,
    redirect_uri: Option<String>,
}

impl OAuthExchange {
    /// Create an exchange for the configured token endpoint.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let token_url = TokenUrl::new(
            config
                .token_url
                .clone()
                .unwrap_or_else(|| MICROSOFT_TOKEN_URL.to_string()),
        )
        .map_err(|e| Error::InvalidConfiguration(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.expose().to_string()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        // Following redirects from a token endpoint would leak the secret.
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .timeout(REFRESH_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http,
            redirect_uri: config.redirect_uri.clone(),
        })
    }
}

#[async_trait]
impl TokenExchange for OAuthExchange {
    async fn refresh(&self, refresh_token: &str, scope: Option<&str>) -> RefreshOutcome {
        let token = RefreshToken::new(refresh_token.to_string());
        let mut request = self.client.exchange_refresh_token(&token);
        if let Some(scope) = scope {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        if let Some(uri) = &self.redirect_uri {
            request = request.add_extra_param("redirect_uri", uri.clone());
        }

        // Remember the HTTP status: a body oauth2 cannot parse means a
        // missing token on 200 but an outage on anything else.
        let status = std::sync::Arc::new(AtomicU16::new(0));
        let status_ref = status.clone();
        let client = self.http.clone();
        let http = move |http_request: HttpRequest| {
            let status = status_ref.clone();
            let client = client.clone();
            async move {
                let response = client.call(http_request).await;
                if let Ok(response) = &response {
                    status.store(response.status().as_u16(), Ordering::Relaxed);
                }
                response
            }
        };

        let result = request.request_async(&http).await;
        classify(result, status.load(Ordering::Relaxed))
    }
}

/// Map one token endpoint reply onto a [`RefreshOutcome`].
fn classify<T, RE>(
    result: std::result::Result<T, RequestTokenError<RE, BasicErrorResponse>>,
    status: u16,
) -> RefreshOutcome
where
    T: TokenResponse,
    RE: std::error::Error + 'static,
{
    match result {
        Ok(response) => RefreshOutcome::Granted(TokenGrant {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in(),
        }),
        Err(_) if status >= 500 => RefreshOutcome::Fatal(Error::BackendUnavailable(format!(
            "Token endpoint returned {}",
            status
        ))),
        Err(RequestTokenError::ServerResponse(err)) => match err.error() {
            BasicErrorResponseType::InvalidGrant => {
                RefreshOutcome::Rejected("invalid_grant".to_string())
            }
            other => RefreshOutcome::Fatal(Error::AuthUnrecoverable(format!(
                "Token endpoint refused the refresh: {:?}",
                other
            ))),
        },
        Err(RequestTokenError::Parse(_, _)) if (200..300).contains(&status) => {
            RefreshOutcome::Rejected("response carried no access token".to_string())
        }
        Err(RequestTokenError::Parse(_, _)) => RefreshOutcome::Fatal(Error::BackendUnavailable(
            format!("Token endpoint returned {} with an unreadable body", status),
        )),
        Err(RequestTokenError::Request(e)) => RefreshOutcome::Fatal(Error::BackendUnavailable(
            format!("Token endpoint unreachable: {}", e),
        )),
        Err(RequestTokenError::Other(message)) => RefreshOutcome::Fatal(
            Error::BackendUnavailable(format!("Token endpoint error: {}", message)),
        ),
    }
}

/// Where the credential stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// No access token obtained yet.
    Unauthenticated,
    /// A usable access token is held.
    Authenticated,
    /// The access token is past (or near) its expiry.
    Expired,
    /// Every refresh candidate was rejected; no further calls are made.
    Unrecoverable,
}

enum CredentialState {
    Unauthenticated { refresh_token: Secret },
    Authenticated(Tokens),
    Unrecoverable,
}

/// Scope candidates in the order they are tried: none, the configured
/// scope, then [`FALLBACK_SCOPE`].
pub fn scope_candidates(configured: Option<&str>) -> Vec<Option<String>> {
    let mut candidates = vec![None];
    if let Some(scope) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        candidates.push(Some(scope.to_string()));
    }
    if !candidates.iter().any(|c| c.as_deref() == Some(FALLBACK_SCOPE)) {
        candidates.push(Some(FALLBACK_SCOPE.to_string()));
    }
    candidates
}

fn unrecoverable() -> Error {
    Error::AuthUnrecoverable(
        "Cloud drive credential was rejected; a new refresh token is required".to_string(),
    )
}

/// Token manager that refreshes the access token when it is missing,
/// expired or rejected.
///
/// Refreshes happen under the write lock, so concurrent callers wait for a
/// single refresh instead of racing with the same refresh token.
pub struct TokenManager {
    exchange: Box<dyn TokenExchange>,
    candidates: Vec<Option<String>>,
    state: RwLock<CredentialState>,
}

impl TokenManager {
    /// Create a manager holding only a refresh token.
    pub fn new(
        exchange: Box<dyn TokenExchange>,
        refresh_token: Secret,
        configured_scope: Option<&str>,
    ) -> Self {
        Self {
            exchange,
            candidates: scope_candidates(configured_scope),
            state: RwLock::new(CredentialState::Unauthenticated { refresh_token }),
        }
    }

    /// Current credential status.
    pub async fn status(&self) -> CredentialStatus {
        match &*self.state.read().await {
            CredentialState::Unauthenticated { .. } => CredentialStatus::Unauthenticated,
            CredentialState::Authenticated(tokens) if tokens.is_expired() => {
                CredentialStatus::Expired
            }
            CredentialState::Authenticated(_) => CredentialStatus::Authenticated,
            CredentialState::Unrecoverable => CredentialStatus::Unrecoverable,
        }
    }

    /// Get a valid access token, refreshing if necessary.
    ///
    /// # Errors
    /// - `AuthUnrecoverable` once every scope candidate has been rejected
    /// - `BackendUnavailable` if the token endpoint cannot be reached
    pub async fn access_token(&self) -> Result<String> {
        {
            let state = self.state.read().await;
            match &*state {
                CredentialState::Authenticated(tokens) if !tokens.is_expired() => {
                    return Ok(tokens.access_token.clone());
                }
                CredentialState::Unrecoverable => return Err(unrecoverable()),
                _ => {}
            }
        }

        let mut state = self.state.write().await;

        // Double-check after acquiring write lock
        match &*state {
            CredentialState::Authenticated(tokens) if !tokens.is_expired() => {
                return Ok(tokens.access_token.clone());
            }
            CredentialState::Unrecoverable => return Err(unrecoverable()),
            _ => {}
        }

        info!("Refreshing access token");
        self.refresh_locked(&mut state).await
    }

    /// Refresh after the API rejected `rejected`.
    ///
    /// If another caller already replaced that token, the current one is
    /// returned without a new refresh.
    pub async fn refresh_after(&self, rejected: &str) -> Result<String> {
        let mut state = self.state.write().await;
        match &*state {
            CredentialState::Authenticated(tokens)
                if tokens.access_token != rejected && !tokens.is_expired() =>
            {
                return Ok(tokens.access_token.clone());
            }
            CredentialState::Unrecoverable => return Err(unrecoverable()),
            _ => {}
        }

        warn!("Access token rejected by the API, refreshing");
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut CredentialState) -> Result<String> {
        let refresh_token = Zeroizing::new(match &*state {
            CredentialState::Unauthenticated { refresh_token } => {
                refresh_token.expose().to_string()
            }
            CredentialState::Authenticated(tokens) => tokens.refresh_token.clone(),
            CredentialState::Unrecoverable => return Err(unrecoverable()),
        });

        match self.run_candidates(&refresh_token).await {
            Ok(tokens) => {
                let access_token = tokens.access_token.clone();
                *state = CredentialState::Authenticated(tokens);
                Ok(access_token)
            }
            Err(err @ Error::AuthUnrecoverable(_)) => {
                *state = CredentialState::Unrecoverable;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn run_candidates(&self, refresh_token: &str) -> Result<Tokens> {
        let mut rejections = Vec::new();

        for (attempt, scope) in self.candidates.iter().enumerate() {
            match self.exchange.refresh(refresh_token, scope.as_deref()).await {
                RefreshOutcome::Granted(grant) => {
                    if grant.refresh_token.is_some() {
                        info!("Refresh token rotated");
                    }
                    let expires_in = grant.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
                    let expires_at = Utc::now()
                        + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));
                    return Ok(Tokens {
                        access_token: grant.access_token,
                        refresh_token: grant
                            .refresh_token
                            .unwrap_or_else(|| refresh_token.to_string()),
                        expires_at,
                    });
                }
                RefreshOutcome::Rejected(reason) => {
                    warn!(
                        attempt = attempt + 1,
                        scoped = scope.is_some(),
                        reason = %reason,
                        "Refresh candidate rejected"
                    );
                    rejections.push(format!("attempt {}: {}", attempt + 1, reason));
                }
                RefreshOutcome::Fatal(err) => return Err(err),
            }
        }

        Err(Error::AuthUnrecoverable(format!(
            "Failed to refresh cloud drive token: {}",
            rejections.join(" | ")
        )))
    }
}
