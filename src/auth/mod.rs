//! Google OAuth2 authorization-code flow with PKCE.
//!
//! The flow: cached refresh token → browser consent via a loopback
//! redirect → code exchange → refresh token cached for the next run.

pub mod endpoints;
pub mod error;
pub mod pkce;
pub mod redirect;
pub mod responses;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use url::Url;

use self::endpoints::Endpoints;
use self::error::AuthError;
use self::pkce::Pkce;
use self::redirect::RedirectListener;
use self::responses::{TokenErrorResponse, TokenResponse};
use self::store::{StoredToken, TokenStore};

/// Bearer credential for the Photos APIs.
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    fn from_response(resp: &TokenResponse) -> Self {
        let lifetime = i64::try_from(resp.expires_in).unwrap_or(i64::MAX);
        Self {
            secret: resp.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime.min(86_400 * 365)),
        }
    }
}

/// Inputs to [`authenticate`]. Credentials come from configuration, never
/// from the binary.
pub struct AuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub redirect_port: u16,
    pub redirect_timeout: Duration,
    pub token_directory: PathBuf,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("redirect_port", &self.redirect_port)
            .field("token_directory", &self.token_directory)
            .finish_non_exhaustive()
    }
}

/// Token endpoint client for one OAuth application.
pub struct OAuthClient {
    http: Client,
    endpoints: Endpoints,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(http: Client, endpoints: Endpoints, client_id: &str, client_secret: &str) -> Self {
        Self {
            http,
            endpoints,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    pub fn authorize_url(&self, redirect_uri: &str, scope: &str, pkce: &Pkce) -> Result<Url> {
        let mut url = Url::parse(&self.endpoints.authorize)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", scope)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", Pkce::METHOD)
            .append_pair("access_type", "offline");
        Ok(url)
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        pkce: &Pkce,
    ) -> Result<TokenResponse, AuthError> {
        self.request_token(&[
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code_verifier", &pkce.verifier),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.request_token(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self.http.post(&self.endpoints.token).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let error = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(e) => {
                    if let Some(description) = &e.error_description {
                        tracing::debug!("Token endpoint said {}: {}", e.error, description);
                    }
                    e.error
                }
                Err(_) => body,
            };
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                error,
            });
        }

        serde_json::from_str(&body).map_err(|_| AuthError::UnexpectedResponse(body))
    }
}

/// Obtain an access token for `settings.scope`.
///
/// 1. Refreshes the cached refresh token if it was granted for this scope.
/// 2. Otherwise runs the browser flow: prints the consent URL, waits for
///    the loopback redirect, exchanges the code.
/// 3. Caches any newly issued refresh token.
pub async fn authenticate(
    http: &Client,
    settings: &AuthSettings,
    endpoints: Endpoints,
) -> Result<AccessToken> {
    let oauth = OAuthClient::new(
        http.clone(),
        endpoints,
        &settings.client_id,
        &settings.client_secret,
    );
    let store = TokenStore::new(&settings.token_directory);

    if let Some(cached) = store.load().await {
        if cached.scope == settings.scope {
            match oauth.refresh(&cached.refresh_token).await {
                Ok(resp) => {
                    tracing::debug!("Refreshed cached token");
                    return Ok(AccessToken::from_response(&resp));
                }
                Err(e) if e.is_invalid_grant() => {
                    tracing::info!("Cached token was revoked or expired, re-authorizing");
                    store.clear().await?;
                }
                Err(e) => {
                    tracing::warn!("Token refresh failed, re-authorizing: {}", e);
                }
            }
        } else {
            tracing::debug!("Cached token has a different scope, re-authorizing");
        }
    }

    let pkce = Pkce::generate();
    let listener = RedirectListener::bind(settings.redirect_port).await?;
    let redirect_uri = listener.redirect_uri();
    let url = oauth.authorize_url(&redirect_uri, &settings.scope, &pkce)?;

    println!("Visit to authorize: {}", url);

    let code = listener.wait_for_code(settings.redirect_timeout).await?;
    let resp = oauth.exchange_code(&code, &redirect_uri, &pkce).await?;

    // The consent screen lets the user untick scopes.
    if let Some(granted) = &resp.scope {
        if !granted.split_whitespace().any(|s| s == settings.scope) {
            tracing::warn!("Granted scopes do not include {}", settings.scope);
        }
    }

    match &resp.refresh_token {
        Some(refresh_token) => {
            let cached = StoredToken {
                refresh_token: refresh_token.clone(),
                scope: settings.scope.clone(),
                saved_at: Utc::now(),
            };
            if let Err(e) = store.save(&cached).await {
                tracing::warn!("Could not cache refresh token: {:#}", e);
            }
        }
        None => tracing::debug!("No refresh token issued; next run will prompt again"),
    }

    tracing::info!("Authorization completed successfully");
    Ok(AccessToken::from_response(&resp))
}
