//! OAuth2 authorization-code flow and credential refresh
//!
//! Implements the Authorization Code flow with PKCE against the Microsoft
//! account endpoints. The desktop redirect URI lands the browser on a blank
//! page whose address carries the code, which the user pastes back.
//!
//! ## Components
//!
//! - [`Tokens`] - Access/refresh token pair with its expiry
//! - [`OAuthFlow`] - Authorization URL, code exchange and refresh
//! - [`TokenProvider`] - Shared source of a currently valid access token
//! - [`StaticTokenProvider`] / [`RefreshingTokenProvider`] - Implementations

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use drivemirror_core::config::AccountConfig;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Refresh the access token when it expires within this window
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Assumed lifetime when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 1;

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens received from the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for obtaining new access tokens without user interaction
    /// (requires the `offline_access` scope)
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

// ============================================================================
// OAuthFlow
// ============================================================================

/// Authorization request handed to the user
#[derive(Debug)]
pub struct AuthorizationRequest {
    /// URL to open in a browser
    pub url: String,
    /// CSRF state echoed back in the redirect
    pub csrf_token: CsrfToken,
    /// Must be kept until [`OAuthFlow::exchange_code`]
    pub pkce_verifier: PkceCodeVerifier,
}

/// OAuth2 code flow for one account, built on the `oauth2` crate
#[derive(Clone)]
pub struct OAuthFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for OAuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthFlow")
            .field("client_id", self.client.client_id())
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl OAuthFlow {
    /// Creates a flow from an account's application registration
    pub fn new(account: &AccountConfig) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(account.client_id.clone()));
        if let Some(secret) = account.client_secret.as_ref().filter(|s| !s.is_empty()) {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        let client = client
            .set_auth_uri(
                AuthUrl::new(account.auth_url.clone()).context("Invalid authorization URL")?,
            )
            .set_token_uri(TokenUrl::new(account.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(account.redirect_uri.clone()).context("Invalid redirect URI")?,
            );

        // Token endpoints must not be followed through redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            scopes: account.scopes.clone(),
            http,
        })
    }

    /// Generates an authorization URL with a PKCE challenge
    pub fn authorize_url(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

        debug!("Generated authorization URL");
        AuthorizationRequest {
            url: url.to_string(),
            csrf_token,
            pkce_verifier,
        }
    }

    /// Exchanges an authorization code for tokens
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<Tokens> {
        info!("Exchanging authorization code for tokens");

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        let tokens = Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expiry(token_result.expires_in()),
        };

        info!("Obtained OAuth tokens");
        Ok(tokens)
    }

    /// Obtains a fresh access token from a refresh token
    ///
    /// The previous refresh token is kept when the provider does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .context("Failed to refresh token")?;

        Ok(Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expiry(token_result.expires_in()),
        })
    }
}

fn expiry(expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    expires_in
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS))
}

/// Extracts the authorization code from what the user pasted
///
/// Accepts either the full redirect URL (`...?code=M.R3_BAY...&state=...`)
/// or the bare code.
pub fn parse_authorization_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if input.contains("://") {
        let url = url::Url::parse(input).ok()?;
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.to_string())
            .filter(|code| !code.is_empty());
    }

    Some(input.to_string())
}

// ============================================================================
// TokenProvider
// ============================================================================

/// Source of a valid access token, shared by every request of one account
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns an access token that is valid for at least a few minutes
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token that never refreshes
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Callback invoked with every newly refreshed token set
pub type RefreshHook = Box<dyn Fn(&Tokens) + Send + Sync>;

/// Token provider that refreshes shortly before expiry
///
/// The tokens live behind a `tokio::sync::Mutex`, so concurrent callers
/// wait for one in-flight refresh instead of starting their own.
pub struct RefreshingTokenProvider {
    flow: OAuthFlow,
    tokens: Mutex<Tokens>,
    on_refresh: Option<RefreshHook>,
}

impl RefreshingTokenProvider {
    pub fn new(flow: OAuthFlow, tokens: Tokens) -> Self {
        Self {
            flow,
            tokens: Mutex::new(tokens),
            on_refresh: None,
        }
    }

    /// Registers a callback that receives each refreshed token set
    /// (typically to persist it)
    pub fn with_refresh_hook(mut self, hook: RefreshHook) -> Self {
        self.on_refresh = Some(hook);
        self
    }
}

#[async_trait::async_trait]
impl TokenProvider for RefreshingTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;

        if !tokens.expires_within(Duration::minutes(REFRESH_MARGIN_MINUTES)) {
            return Ok(tokens.access_token.clone());
        }

        let refresh_token = tokens
            .refresh_token
            .clone()
            .context("Access token expired and no refresh token is available; run `drivemirror auth` again")?;

        let refreshed = self.flow.refresh(&refresh_token).await?;
        debug!(expires_at = %refreshed.expires_at, "Access token refreshed");

        if let Some(hook) = &self.on_refresh {
            hook(&refreshed);
        }

        *tokens = refreshed;
        Ok(tokens.access_token.clone())
    }
}
