use super::{AuthError, Authenticator};
use crate::async_ops::HttpVerb;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

pub const GOOGLE_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Client registration plus whatever tokens are currently held.
pub struct OAuth2Parameters {
    pub client_id: String,
    client_secret: SecretString,
    pub redirect_uri: String,
    pub token_endpoint: Url,
    access_code: Option<SecretString>,
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    pub token_type: String,
}

impl OAuth2Parameters {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            token_endpoint: Url::parse(GOOGLE_TOKEN_URL)?,
            access_code: None,
            access_token: None,
            refresh_token: None,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
        })
    }

    /// Parameters for a pre-issued access token with no way to refresh it.
    pub fn from_access_token(
        access_token: SecretString,
        token_type: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let mut params = Self::new(String::new(), SecretString::from(String::new()), String::new())?;
        params.access_token = Some(access_token);
        params.token_type = token_type.into();
        Ok(params)
    }

    pub fn with_token_endpoint(mut self, endpoint: Url) -> Self {
        self.token_endpoint = endpoint;
        self
    }

    /// Authorization code to exchange on first use.
    pub fn with_access_code(mut self, code: SecretString) -> Self {
        self.access_code = Some(code);
        self
    }

    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    pub fn with_refresh_token(mut self, token: SecretString) -> Self {
        self.refresh_token = Some(token);
        self
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for OAuth2Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Parameters")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth 2.0 authentication.
///
/// An access token is used as-is. Without one, a held authorization code is
/// exchanged (once), then a refresh token is used.
pub struct OAuth2 {
    params: Mutex<OAuth2Parameters>,
}

impl OAuth2 {
    pub fn new(params: OAuth2Parameters) -> Self {
        Self {
            params: Mutex::new(params),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OAuth2Parameters> {
        self.params.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exchanges the refresh token for a new access token.
    pub fn refresh(&self, client: &Client) -> Result<(), AuthError> {
        let mut params = self.lock();
        refresh_locked(client, &mut params)
    }

    /// Exchanges an authorization code for access and refresh tokens.
    pub fn exchange_code(&self, client: &Client, code: &SecretString) -> Result<(), AuthError> {
        let mut params = self.lock();
        exchange_locked(client, &mut params, code)
    }
}

impl fmt::Debug for OAuth2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2").field("params", &*self.lock()).finish()
    }
}

impl Authenticator for OAuth2 {
    fn scheme(&self) -> &'static str {
        "oauth2"
    }

    fn authorization(
        &self,
        client: &Client,
        _uri: &Url,
        _verb: HttpVerb,
    ) -> Result<Option<String>, AuthError> {
        let mut params = self.lock();
        if params.access_token.is_none() {
            if let Some(code) = params.access_code.take() {
                exchange_locked(client, &mut params, &code)?;
            } else if params.refresh_token.is_some() {
                refresh_locked(client, &mut params)?;
            } else {
                return Err(AuthError::NoCredentials);
            }
        }
        let token = params.access_token.as_ref().ok_or(AuthError::NoCredentials)?;
        Ok(Some(format!(
            "{} {}",
            params.token_type,
            token.expose_secret()
        )))
    }

    /// Drops the access token when it can be refreshed; a bare token is kept.
    fn reset(&self) {
        let mut params = self.lock();
        if params.refresh_token.is_some() {
            params.access_token = None;
            tracing::debug!(client_id = %params.client_id, "Cleared OAuth2 access token");
        }
    }
}

fn exchange_locked(
    client: &Client,
    params: &mut OAuth2Parameters,
    code: &SecretString,
) -> Result<(), AuthError> {
    tracing::debug!(client_id = %params.client_id, "Exchanging OAuth2 authorization code");
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("code", code.expose_secret())
        .append_pair("grant_type", "authorization_code")
        .append_pair("redirect_uri", &params.redirect_uri)
        .append_pair("client_id", &params.client_id)
        .append_pair("client_secret", params.client_secret.expose_secret())
        .finish();
    let response = request_token(client, &params.token_endpoint, form)?;
    apply_response(params, response);
    Ok(())
}

fn refresh_locked(client: &Client, params: &mut OAuth2Parameters) -> Result<(), AuthError> {
    let refresh = params
        .refresh_token
        .as_ref()
        .ok_or(AuthError::NoCredentials)?
        .expose_secret()
        .to_string();
    tracing::debug!(client_id = %params.client_id, "Refreshing OAuth2 access token");
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("refresh_token", &refresh)
        .append_pair("grant_type", "refresh_token")
        .append_pair("client_id", &params.client_id)
        .append_pair("client_secret", params.client_secret.expose_secret())
        .finish();
    let response = request_token(client, &params.token_endpoint, form)?;
    apply_response(params, response);
    Ok(())
}

fn request_token(client: &Client, endpoint: &Url, form: String) -> Result<TokenResponse, AuthError> {
    let response = client
        .post(endpoint.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form)
        .send()?;
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
            tracing::warn!(
                error = %error.error,
                description = ?error.error_description,
                "OAuth2 token request failed"
            );
            return Err(AuthError::Rejected(
                error.error_description.unwrap_or(error.error),
            ));
        }
        return Err(AuthError::HttpStatus(status.as_u16()));
    }

    serde_json::from_str(&body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
}

fn apply_response(params: &mut OAuth2Parameters, response: TokenResponse) {
    params.access_token = Some(SecretString::from(response.access_token));
    if let Some(token_type) = response.token_type {
        params.token_type = token_type;
    }
    // Google usually omits the refresh token on refresh; keep the old one
    if let Some(refresh) = response.refresh_token {
        params.refresh_token = Some(SecretString::from(refresh));
    }
    tracing::debug!(
        client_id = %params.client_id,
        expires_in = ?response.expires_in,
        "OAuth2 access token updated"
    );
}
